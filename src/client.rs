//! 平台客户端：发送 API 的薄封装
//!
//! 发送器只依赖 `PlatformApi` trait，测试用 mock 注入；
//! `HttpPlatformClient` 是面向真实平台发送端点的 reqwest 实现。

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::MessengerConfig;
use crate::error::{OutboundError, Result};
use crate::outbound::SendOutcome;

/// 平台发送原语
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// 执行一次发送调用，成功时返回平台分配的消息 ID
    async fn send_message(&self, payload: &JsonValue) -> Result<SendOutcome>;
}

/// 基于 HTTP 的平台客户端
pub struct HttpPlatformClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpPlatformClient {
    pub fn new(config: &MessengerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OutboundError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.graph_api_base.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    message_id: Option<String>,
    recipient_id: Option<String>,
    error: Option<PlatformErrorBody>,
}

#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

#[async_trait]
impl PlatformApi for HttpPlatformClient {
    async fn send_message(&self, payload: &JsonValue) -> Result<SendOutcome> {
        // 原始发送请求对外可观测，供调试与审计订阅
        tracing::debug!(payload = %payload, "raw send request");

        let url = format!("{}/me/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("access_token", self.access_token.as_str())])
            .json(payload)
            .send()
            .await
            .map_err(|e| OutboundError::PlatformRequest(e.to_string()))?;

        let status = response.status();
        let body: SendResponse = response.json().await.unwrap_or_default();

        if let Some(err) = body.error {
            let code = err.code.map(|c| c.to_string()).unwrap_or_default();
            return Err(OutboundError::SendFailed(format!(
                "platform error {code}: {}",
                err.message
            )));
        }
        if !status.is_success() {
            return Err(OutboundError::SendFailed(format!(
                "platform returned status {status}"
            )));
        }

        Ok(SendOutcome {
            message_id: body.message_id,
            recipient_id: body.recipient_id,
        })
    }
}
