//! 待确认表：关联 ID 到待确认条目的进程内并发映射

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::config::SweepConfig;
use crate::error::OutboundError;
use crate::metrics::DispatchMetrics;
use crate::outbound::SendOutcome;

use super::entry::{ConfirmationKind, PendingEntry};

/// 待确认表
///
/// 结算即删除：resolve/reject/confirm 先把条目从表中移除再触发句柄，
/// 因此对同一关联 ID 的第二次结算找不到条目，静默为 no-op。
/// 表本身不做隐式过期，长期运行的服务可选启动清扫任务兜底。
#[derive(Default)]
pub struct PendingTable {
    entries: DashMap<String, PendingEntry>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_metrics(metrics: Arc<DispatchMetrics>) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            metrics: Some(metrics),
        })
    }

    /// 注册一条在途条目
    ///
    /// 关联 ID 由 ULID 生成，正常情况下不会重复；若重复说明上游生成器
    /// 被绕过，旧条目会被挤掉并记录告警。
    pub fn insert(&self, entry: PendingEntry) {
        let correlation_id = entry.correlation_id.clone();
        if self.entries.insert(correlation_id.clone(), entry).is_some() {
            tracing::warn!(correlation_id = %correlation_id, "duplicate pending entry replaced");
        }
        self.update_gauge();
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 查询条目上已回填的平台消息 ID
    pub fn platform_message_id(&self, correlation_id: &str) -> Option<String> {
        self.entries
            .get(correlation_id)
            .and_then(|entry| entry.platform_message_id.clone())
    }

    /// 原地记录平台发送确认（回填消息 ID 并回拨时间戳）
    pub fn record_acknowledgement(&self, correlation_id: &str, platform_message_id: &str) -> bool {
        match self.entries.get_mut(correlation_id) {
            Some(mut entry) => {
                entry.mark_acknowledged(platform_message_id);
                true
            }
            None => false,
        }
    }

    /// 以成功结果终结条目；条目不存在时返回 false（幂等 no-op）
    pub fn resolve(&self, correlation_id: &str, outcome: SendOutcome) -> bool {
        match self.entries.remove(correlation_id) {
            Some((_, entry)) => {
                entry.settle_ok(outcome);
                self.update_gauge();
                true
            }
            None => false,
        }
    }

    /// 以失败结果终结条目；条目不存在时返回 false（幂等 no-op）
    pub fn reject(&self, correlation_id: &str, err: OutboundError) -> bool {
        match self.entries.remove(correlation_id) {
            Some((_, entry)) => {
                entry.settle_err(err);
                self.update_gauge();
                true
            }
            None => false,
        }
    }

    /// 外部投递/已读确认入口：按关联 ID 终结延迟完成的条目
    ///
    /// 迟到或重复的确认（条目已不在表中）静默忽略，不是错误。
    pub fn confirm(&self, correlation_id: &str, kind: ConfirmationKind) -> bool {
        match self.entries.remove(correlation_id) {
            Some((_, entry)) => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    kind = kind.as_str(),
                    "pending entry confirmed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.confirmations_received.with_label_values(&[kind.as_str()]).inc();
                }
                let outcome = SendOutcome {
                    message_id: entry.platform_message_id.clone(),
                    recipient_id: None,
                };
                entry.settle_ok(outcome);
                self.update_gauge();
                true
            }
            None => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    kind = kind.as_str(),
                    "stale confirmation ignored"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.stale_confirmations.inc();
                }
                false
            }
        }
    }

    /// 按平台消息 ID 反查并确认
    pub fn confirm_by_message_id(&self, platform_message_id: &str, kind: ConfirmationKind) -> bool {
        let correlation_id = self
            .entries
            .iter()
            .find(|entry| entry.platform_message_id.as_deref() == Some(platform_message_id))
            .map(|entry| entry.key().clone());

        match correlation_id {
            Some(id) => self.confirm(&id, kind),
            None => {
                tracing::debug!(
                    platform_message_id = %platform_message_id,
                    kind = kind.as_str(),
                    "stale confirmation ignored"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.stale_confirmations.inc();
                }
                false
            }
        }
    }

    /// 按水位线批量确认：终结所有已收到发送确认且时间戳不晚于水位线的条目
    ///
    /// 条目时间戳在发送确认时已回拨宽限窗口，因此与发送确认几乎同时到达
    /// 的平台水位线也能命中。返回被终结的条目数。
    pub fn confirm_watermark(&self, watermark_ms: i64, kind: ConfirmationKind) -> usize {
        let matched: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.platform_message_id.is_some() && entry.timestamp <= watermark_ms
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut settled = 0;
        for correlation_id in matched {
            if self.confirm(&correlation_id, kind) {
                settled += 1;
            }
        }
        settled
    }

    /// 启动过期清扫任务（可选兜底，默认不启动）
    ///
    /// 平台始终不回确认时 awaiting-confirmation 的条目会永久滞留；
    /// 清扫以失败结果终结超龄条目，避免表无界增长。
    pub fn start_sweeper(
        self: &Arc<Self>,
        max_age: Duration,
        check_interval: Duration,
    ) -> SweeperHandle {
        let table = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval(check_interval);
            loop {
                ticker.tick().await;
                table.sweep_expired(max_age);
            }
        });
        SweeperHandle { task }
    }

    /// 按配置决定是否启动清扫任务
    pub fn start_sweeper_if_enabled(self: &Arc<Self>, config: &SweepConfig) -> Option<SweeperHandle> {
        if !config.enabled {
            return None;
        }
        Some(self.start_sweeper(
            Duration::from_secs(config.max_age_secs),
            Duration::from_secs(config.check_interval_secs),
        ))
    }

    fn sweep_expired(&self, max_age: Duration) {
        let cutoff = chrono::Utc::now().timestamp_millis() - max_age.as_millis() as i64;
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.timestamp < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        for correlation_id in expired {
            tracing::warn!(correlation_id = %correlation_id, "pending entry expired, rejecting");
            self.reject(
                &correlation_id,
                OutboundError::TrackingAborted(
                    "pending entry expired without confirmation".to_string(),
                ),
            );
        }
    }

    fn update_gauge(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.pending_entries.set(self.entries.len() as i64);
        }
    }
}

/// 清扫任务句柄
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
