//! 出站管道：具名阶段按 order 顺序处理出站事件
//!
//! 终结与透传是阶段的显式返回值而不是副作用：`Continue` 把事件交给
//! 下一阶段，`Consumed` 表示事件已被吞掉（完成信号走待确认 future），
//! `Rejected` 走管道错误通道。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{OutboundError, Result};

use super::event::OutboundEvent;

/// 阶段处理结果
#[derive(Debug)]
pub enum StageOutcome {
    /// 未消费，事件交给下一阶段
    Continue(OutboundEvent),
    /// 已消费（终态）；发送结果只通过完成 future 上报
    Consumed,
    /// 拒绝，走管道错误通道
    Rejected(OutboundError),
}

/// 管道分发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDisposition {
    /// 某个阶段消费了事件
    Consumed,
    /// 所有阶段都未消费
    Unhandled,
}

/// 出站管道阶段
#[async_trait]
pub trait OutboundStage: Send + Sync {
    async fn handle(&self, event: OutboundEvent) -> StageOutcome;
}

/// 阶段注册信息
pub struct StageRegistration {
    /// 阶段名（如 `messenger.send_messages`）
    pub name: String,
    /// 排序优先级，小的先执行
    pub order: i32,
    /// 行为说明，特别是该阶段是否吞掉事件
    pub description: String,
    pub handler: Arc<dyn OutboundStage>,
}

/// 出站管道
#[derive(Default)]
pub struct OutboundPipeline {
    stages: RwLock<Vec<StageRegistration>>,
}

impl OutboundPipeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 注册阶段并按 order 重排
    pub async fn register(&self, registration: StageRegistration) {
        tracing::info!(
            stage = %registration.name,
            order = registration.order,
            "outbound stage registered"
        );
        let mut guard = self.stages.write().await;
        guard.push(registration);
        guard.sort_by(|a, b| a.order.cmp(&b.order));
    }

    pub async fn stage_names(&self) -> Vec<String> {
        let guard = self.stages.read().await;
        guard.iter().map(|s| s.name.clone()).collect()
    }

    /// 分发一个出站事件
    ///
    /// 阶段返回 `Rejected` 时整个分发以 Err 结束（管道错误通道）；
    /// 没有任何阶段消费时返回 `Unhandled` 并记录告警。
    pub async fn dispatch(&self, event: OutboundEvent) -> Result<DispatchDisposition> {
        let handlers: Vec<(String, Arc<dyn OutboundStage>)> = {
            let guard = self.stages.read().await;
            guard
                .iter()
                .map(|s| (s.name.clone(), Arc::clone(&s.handler)))
                .collect()
        };

        let mut current = event;
        for (name, handler) in handlers {
            match handler.handle(current).await {
                StageOutcome::Continue(event) => current = event,
                StageOutcome::Consumed => return Ok(DispatchDisposition::Consumed),
                StageOutcome::Rejected(err) => {
                    tracing::debug!(stage = %name, error = %err, "outbound stage rejected event");
                    return Err(err);
                }
            }
        }

        tracing::warn!(
            platform = %current.platform,
            event_type = %current.event_type,
            "outbound event not consumed by any stage"
        );
        Ok(DispatchDisposition::Unhandled)
    }
}
