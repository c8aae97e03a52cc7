//! 投递跟踪中间件
//!
//! 管道末位阶段：对本平台的事件调用类型发送器并终结对应的待确认条目。
//! 一旦接受事件即为终态（吞掉事件），发送成败只通过完成 future 上报。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::client::PlatformApi;
use crate::error::{OutboundError, Result};
use crate::metrics::DispatchMetrics;
use crate::pending::PendingTable;

use super::event::{OutboundEvent, SendOutcome};
use super::pipeline::{OutboundStage, StageOutcome, StageRegistration};
use super::senders::SenderRegistry;

/// 投递跟踪阶段
pub struct DeliveryTrackerStage {
    platform: String,
    senders: Arc<SenderRegistry>,
    client: Arc<dyn PlatformApi>,
    pending: Arc<PendingTable>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl DeliveryTrackerStage {
    pub fn new(
        platform: impl Into<String>,
        senders: Arc<SenderRegistry>,
        client: Arc<dyn PlatformApi>,
        pending: Arc<PendingTable>,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform: platform.into(),
            senders,
            client,
            pending,
            metrics: None,
        })
    }

    pub fn with_metrics(
        platform: impl Into<String>,
        senders: Arc<SenderRegistry>,
        client: Arc<dyn PlatformApi>,
        pending: Arc<PendingTable>,
        metrics: Arc<DispatchMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            platform: platform.into(),
            senders,
            client,
            pending,
            metrics: Some(metrics),
        })
    }

    /// 该阶段的管道注册信息：排在最后，接受事件后即吞掉
    pub fn registration(self: &Arc<Self>) -> StageRegistration {
        StageRegistration {
            name: format!("{}.send_messages", self.platform),
            order: 100,
            description: format!(
                "Sends out messages that target platform = {}. \
                 This stage should be placed at the end as it swallows events once sent.",
                self.platform
            ),
            handler: Arc::clone(self) as Arc<dyn OutboundStage>,
        }
    }

    /// 发送结果落地：终结或延迟对应的待确认条目
    fn finalize(&self, event: &OutboundEvent, result: Result<SendOutcome>) {
        let Some(correlation_id) = event.correlation_id.as_deref() else {
            // 未经分发包装器打标的事件没有条目可终结
            return;
        };

        match result {
            Ok(outcome) => {
                if let Some(message_id) = outcome.message_id.as_deref() {
                    self.pending.record_acknowledgement(correlation_id, message_id);
                }
                if event.raw.wants_confirmation() {
                    // 延迟完成：条目留在表中，等外部投递/已读确认终结
                    tracing::debug!(
                        correlation_id = %correlation_id,
                        wait_delivery = event.raw.wait_delivery,
                        wait_read = event.raw.wait_read,
                        "send acknowledged, completion deferred"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.completions_deferred.inc();
                    }
                } else {
                    self.pending.resolve(correlation_id, outcome);
                }
                if let Some(metrics) = &self.metrics {
                    metrics.messages_sent.inc();
                }
            }
            Err(err) => {
                // 发送失败时无视等待标志立即拒绝：不存在能到达的确认
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %err,
                    "send failed, rejecting pending entry"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.send_failures.inc();
                }
                self.pending.reject(correlation_id, err);
            }
        }
    }
}

#[async_trait]
impl OutboundStage for DeliveryTrackerStage {
    async fn handle(&self, event: OutboundEvent) -> StageOutcome {
        if event.platform != self.platform {
            return StageOutcome::Continue(event);
        }

        let Some(sender) = self.senders.lookup(&event.event_type).await else {
            return StageOutcome::Rejected(OutboundError::UnsupportedEventType(
                event.event_type.clone(),
            ));
        };

        let started = Instant::now();
        let result = sender.send(&event, self.client.as_ref()).await;
        if let Some(metrics) = &self.metrics {
            metrics
                .send_duration_seconds
                .observe(started.elapsed().as_secs_f64());
        }

        self.finalize(&event, result);
        StageOutcome::Consumed
    }
}
