//! 出站事件模型

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::pending::LegacyCallbacks;

/// 本集成的平台标签；其他平台的事件一律透传
pub const PLATFORM_MESSENGER: &str = "messenger";

/// 调用方传入的原始发送选项
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendOptions {
    /// 等平台投递确认后再结算完成 future
    #[serde(default)]
    pub wait_delivery: bool,
    /// 等对端已读确认后再结算完成 future
    #[serde(default)]
    pub wait_read: bool,
    /// 其余透传选项
    #[serde(default)]
    pub extra: HashMap<String, JsonValue>,
}

impl SendOptions {
    /// 是否要求延迟完成
    pub fn wants_confirmation(&self) -> bool {
        self.wait_delivery || self.wait_read
    }
}

/// 发送结果：平台确认后的消息 ID 及收件人
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub message_id: Option<String>,
    pub recipient_id: Option<String>,
}

/// 出站事件
///
/// 进入管道后除 finalize 的关联簿记外不再修改；关联 ID 只在进程内部
/// 流转，不会发给平台。
#[derive(Debug)]
pub struct OutboundEvent {
    /// 平台标签
    pub platform: String,
    /// 事件类型（text / attachment / ...）
    pub event_type: String,
    /// 收件人
    pub recipient_id: String,
    /// 原始发送选项
    pub raw: SendOptions,
    /// 类型相关的载荷字段
    pub payload: JsonValue,
    /// 关联 ID（分发包装器打标后填充）
    pub correlation_id: Option<String>,
    /// 旧回调路径（兼容保留；注册时被移入完成句柄）
    pub legacy: Option<LegacyCallbacks>,
}

impl OutboundEvent {
    pub fn new(
        event_type: impl Into<String>,
        recipient_id: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            platform: PLATFORM_MESSENGER.to_string(),
            event_type: event_type.into(),
            recipient_id: recipient_id.into(),
            raw: SendOptions::default(),
            payload,
            correlation_id: None,
            legacy: None,
        }
    }

    pub fn with_options(mut self, options: SendOptions) -> Self {
        self.raw = options;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_legacy_callbacks(mut self, legacy: LegacyCallbacks) -> Self {
        self.legacy = Some(legacy);
        self
    }
}
