//! 发送器注册表与内置发送器
//!
//! 每个事件类型对应一个发送器：把事件载荷组装成平台报文并通过
//! 平台客户端发出。注册表可插拔，业务方可按类型替换或扩展。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::RwLock;

use crate::client::PlatformApi;
use crate::error::{OutboundError, Result};

use super::event::{OutboundEvent, SendOutcome};

/// 类型相关的发送器
#[async_trait]
pub trait EventSender: Send + Sync {
    async fn send(&self, event: &OutboundEvent, client: &dyn PlatformApi) -> Result<SendOutcome>;
}

/// 事件类型到发送器的注册表
#[derive(Default)]
pub struct SenderRegistry {
    senders: RwLock<HashMap<String, Arc<dyn EventSender>>>,
}

impl SenderRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 带内置 text / attachment 发送器的注册表
    pub async fn with_defaults() -> Arc<Self> {
        let registry = Self::new();
        registry.register("text", Arc::new(TextSender)).await;
        registry.register("attachment", Arc::new(AttachmentSender)).await;
        registry
    }

    pub async fn register(&self, event_type: impl Into<String>, sender: Arc<dyn EventSender>) {
        let event_type = event_type.into();
        tracing::debug!(event_type = %event_type, "event sender registered");
        self.senders.write().await.insert(event_type, sender);
    }

    pub async fn lookup(&self, event_type: &str) -> Option<Arc<dyn EventSender>> {
        self.senders.read().await.get(event_type).cloned()
    }

    pub async fn registered_types(&self) -> Vec<String> {
        let guard = self.senders.read().await;
        let mut types: Vec<String> = guard.keys().cloned().collect();
        types.sort();
        types
    }
}

/// 文本消息发送器
pub struct TextSender;

#[async_trait]
impl EventSender for TextSender {
    async fn send(&self, event: &OutboundEvent, client: &dyn PlatformApi) -> Result<SendOutcome> {
        let text = event
            .payload
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                OutboundError::SendFailed("text event payload missing 'text'".to_string())
            })?;

        let body = json!({
            "recipient": { "id": event.recipient_id },
            "message": { "text": text },
        });
        client.send_message(&body).await
    }
}

/// 附件消息发送器（图片、音频、文件等）
pub struct AttachmentSender;

#[async_trait]
impl EventSender for AttachmentSender {
    async fn send(&self, event: &OutboundEvent, client: &dyn PlatformApi) -> Result<SendOutcome> {
        let attachment_type = event
            .payload
            .get("attachment_type")
            .and_then(|v| v.as_str())
            .unwrap_or("file");
        let url = event.payload.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            OutboundError::SendFailed("attachment event payload missing 'url'".to_string())
        })?;

        let body = json!({
            "recipient": { "id": event.recipient_id },
            "message": {
                "attachment": {
                    "type": attachment_type,
                    "payload": { "url": url },
                }
            },
        });
        client.send_message(&body).await
    }
}
