//! 统一异常处理模块

use thiserror::Error;

/// 出站核心统一 Result 类型
pub type Result<T> = std::result::Result<T, OutboundError>;

/// 出站核心错误类型
#[derive(Debug, Clone, Error)]
pub enum OutboundError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 事件类型没有注册对应的发送器
    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// 消息构建失败
    #[error("Message build error: {0}")]
    MessageBuild(String),

    /// 平台请求失败（网络层）
    #[error("Platform request failed: {0}")]
    PlatformRequest(String),

    /// 平台拒绝发送（业务层）
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// 在途跟踪被中止（条目在结算前被丢弃或过期）
    #[error("Delivery tracking aborted: {0}")]
    TrackingAborted(String),
}

impl From<anyhow::Error> for OutboundError {
    fn from(err: anyhow::Error) -> Self {
        OutboundError::Config(err.to_string())
    }
}
