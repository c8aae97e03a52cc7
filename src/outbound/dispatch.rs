//! 分发包装器
//!
//! 把每个消息类型的构建函数包装成对外的两种调用形态：
//! - `build`：构建、打标并注册待确认条目，返回消息本身（不入队）
//! - `send`：同上并入队出站管道，返回调用方可见的完成 future
//!
//! 构建失败同步向调用方传播，不会为构建失败的消息注册条目。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tokio::sync::RwLock;

use crate::error::{OutboundError, Result};
use crate::pending::{CompletionHandle, DeliveryFuture, PendingEntry, PendingTable, next_correlation_id};

use super::event::{OutboundEvent, SendOptions};
use super::pipeline::OutboundPipeline;

/// 消息构建入参
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub recipient_id: String,
    /// 类型相关内容；text 类型也接受纯字符串
    pub content: JsonValue,
    pub options: SendOptions,
}

impl BuildRequest {
    pub fn new(recipient_id: impl Into<String>, content: JsonValue) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            content,
            options: SendOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }
}

/// 消息类型的构建函数
pub trait MessageBuilder: Send + Sync {
    fn build(&self, request: BuildRequest) -> Result<OutboundEvent>;
}

impl<F> MessageBuilder for F
where
    F: Fn(BuildRequest) -> Result<OutboundEvent> + Send + Sync,
{
    fn build(&self, request: BuildRequest) -> Result<OutboundEvent> {
        self(request)
    }
}

/// 分发包装器
pub struct Dispatcher {
    builders: RwLock<HashMap<String, Arc<dyn MessageBuilder>>>,
    pending: Arc<PendingTable>,
    pipeline: Arc<OutboundPipeline>,
}

impl Dispatcher {
    pub fn new(pending: Arc<PendingTable>, pipeline: Arc<OutboundPipeline>) -> Arc<Self> {
        Arc::new(Self {
            builders: RwLock::new(HashMap::new()),
            pending,
            pipeline,
        })
    }

    /// 带内置 text / attachment 构建器的分发包装器
    pub async fn with_default_builders(
        pending: Arc<PendingTable>,
        pipeline: Arc<OutboundPipeline>,
    ) -> Arc<Self> {
        let dispatcher = Self::new(pending, pipeline);
        dispatcher.register_builder("text", Arc::new(build_text)).await;
        dispatcher
            .register_builder("attachment", Arc::new(build_attachment))
            .await;
        dispatcher
    }

    pub async fn register_builder(
        &self,
        event_type: impl Into<String>,
        builder: Arc<dyn MessageBuilder>,
    ) {
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, "message builder registered");
        self.builders.write().await.insert(event_type, builder);
    }

    pub async fn registered_types(&self) -> Vec<String> {
        let guard = self.builders.read().await;
        let mut types: Vec<String> = guard.keys().cloned().collect();
        types.sort();
        types
    }

    /// 仅构建：打标并注册待确认条目，返回消息本身
    ///
    /// 调用方负责后续把消息交给出站管道；完成 future 被丢弃，
    /// 但条目上的旧回调路径仍会在终结时触发。
    pub async fn build(&self, event_type: &str, request: BuildRequest) -> Result<OutboundEvent> {
        let (event, _future) = self.prepare(event_type, request).await?;
        Ok(event)
    }

    /// 构建并发送：返回随终结结算的完成 future
    pub async fn send(&self, event_type: &str, request: BuildRequest) -> Result<DeliveryFuture> {
        let (event, future) = self.prepare(event_type, request).await?;
        let correlation_id = event.correlation_id.clone();

        match self.pipeline.dispatch(event).await {
            Ok(super::pipeline::DispatchDisposition::Consumed) => Ok(future),
            Ok(super::pipeline::DispatchDisposition::Unhandled) => {
                let err = OutboundError::TrackingAborted(
                    "no outbound stage consumed the event".to_string(),
                );
                if let Some(id) = correlation_id.as_deref() {
                    self.pending.reject(id, err.clone());
                }
                Err(err)
            }
            Err(err) => {
                // 管道拒绝（如类型无发送器）时撤销刚注册的条目，避免滞留
                if let Some(id) = correlation_id.as_deref() {
                    self.pending.reject(id, err.clone());
                }
                Err(err)
            }
        }
    }

    /// 构建、打标并注册条目；构建失败时不触碰待确认表
    async fn prepare(
        &self,
        event_type: &str,
        request: BuildRequest,
    ) -> Result<(OutboundEvent, DeliveryFuture)> {
        let builder = self
            .builders
            .read()
            .await
            .get(event_type)
            .cloned()
            .ok_or_else(|| OutboundError::UnsupportedEventType(event_type.to_string()))?;

        let mut event = builder.build(request)?;

        let correlation_id = next_correlation_id();
        let legacy = event.legacy.take();
        let (handle, future) = CompletionHandle::new(legacy);
        self.pending
            .insert(PendingEntry::new(correlation_id.clone(), handle));
        event.correlation_id = Some(correlation_id);

        Ok((event, future))
    }
}

/// 内置文本构建器
fn build_text(request: BuildRequest) -> Result<OutboundEvent> {
    let text = request
        .content
        .as_str()
        .or_else(|| request.content.get("text").and_then(|v| v.as_str()))
        .ok_or_else(|| OutboundError::MessageBuild("text builder requires 'text'".to_string()))?
        .to_string();

    Ok(
        OutboundEvent::new("text", request.recipient_id, json!({ "text": text }))
            .with_options(request.options),
    )
}

/// 内置附件构建器
fn build_attachment(request: BuildRequest) -> Result<OutboundEvent> {
    if request.content.get("url").and_then(|v| v.as_str()).is_none() {
        return Err(OutboundError::MessageBuild(
            "attachment builder requires 'url'".to_string(),
        ));
    }

    Ok(
        OutboundEvent::new("attachment", request.recipient_id, request.content)
            .with_options(request.options),
    )
}
