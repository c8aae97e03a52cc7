//! 待确认条目与完成句柄定义

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::error::{OutboundError, Result};
use crate::outbound::SendOutcome;

/// 确认回写的宽限窗口：平台确认发送后，条目时间戳会回拨该毫秒数，
/// 使紧随其后到达的投递/已读确认（水位线比较）仍被接受。
pub const CONFIRM_GRACE_MS: i64 = 1_000;

/// 生成进程内唯一的关联 ID
///
/// ULID 按时间有序且携带随机位，同一毫秒内的并发构建也不会碰撞。
pub fn next_correlation_id() -> String {
    Ulid::new().to_string()
}

/// 外部确认类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfirmationKind {
    /// 平台投递确认
    Delivered,
    /// 对端已读确认
    Read,
}

impl ConfirmationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationKind::Delivered => "delivered",
            ConfirmationKind::Read => "read",
        }
    }
}

/// 兼容旧回调路径的结算回调对
///
/// 旧消息构建器会在消息上挂 resolve/reject 回调；结算完成句柄时必须
/// 同步触发这对回调。仅作为边界兼容适配器保留，新代码不应依赖。
pub struct LegacyCallbacks {
    on_resolve: Box<dyn FnOnce(&SendOutcome) + Send + Sync>,
    on_reject: Box<dyn FnOnce(&OutboundError) + Send + Sync>,
}

impl LegacyCallbacks {
    pub fn new<R, E>(on_resolve: R, on_reject: E) -> Self
    where
        R: FnOnce(&SendOutcome) + Send + Sync + 'static,
        E: FnOnce(&OutboundError) + Send + Sync + 'static,
    {
        Self {
            on_resolve: Box::new(on_resolve),
            on_reject: Box::new(on_reject),
        }
    }
}

impl fmt::Debug for LegacyCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LegacyCallbacks")
    }
}

/// 完成句柄：绑定调用方可见 future 的 resolve/reject 对
///
/// 结算会消费句柄本身，天然保证一个句柄只能结算一次；若消息携带旧回调，
/// 两条路径在同一次结算中同步触发。
#[derive(Debug)]
pub struct CompletionHandle {
    tx: oneshot::Sender<Result<SendOutcome>>,
    legacy: Option<LegacyCallbacks>,
}

impl CompletionHandle {
    /// 创建完成句柄及其对应的调用方可见 future
    pub fn new(legacy: Option<LegacyCallbacks>) -> (Self, DeliveryFuture) {
        let (tx, rx) = oneshot::channel();
        (Self { tx, legacy }, DeliveryFuture { rx })
    }

    /// 以成功结果结算
    pub fn resolve(self, outcome: SendOutcome) {
        if let Some(legacy) = self.legacy {
            (legacy.on_resolve)(&outcome);
        }
        // 调用方可能已丢弃 future（仅构建未发送的场景），丢弃发送结果即可
        let _ = self.tx.send(Ok(outcome));
    }

    /// 以失败结果结算
    pub fn reject(self, err: OutboundError) {
        if let Some(legacy) = self.legacy {
            (legacy.on_reject)(&err);
        }
        let _ = self.tx.send(Err(err));
    }
}

/// 调用方可见的完成 future
///
/// 在对应待确认条目被终结（立即或延迟）时以发送结果结算。
#[derive(Debug)]
pub struct DeliveryFuture {
    rx: oneshot::Receiver<Result<SendOutcome>>,
}

impl Future for DeliveryFuture {
    type Output = Result<SendOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(OutboundError::TrackingAborted(
                "pending entry dropped before settlement".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// 在途消息的待确认条目
#[derive(Debug)]
pub struct PendingEntry {
    /// 关联 ID
    pub correlation_id: String,
    /// 完成句柄
    handle: CompletionHandle,
    /// 最近触达时间（Unix 毫秒）
    pub timestamp: i64,
    /// 平台确认发送后回填的平台消息 ID
    pub platform_message_id: Option<String>,
}

impl PendingEntry {
    pub fn new(correlation_id: impl Into<String>, handle: CompletionHandle) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            handle,
            timestamp: chrono::Utc::now().timestamp_millis(),
            platform_message_id: None,
        }
    }

    /// 记录平台发送确认：回填平台消息 ID 并把时间戳回拨宽限窗口
    pub fn mark_acknowledged(&mut self, platform_message_id: impl Into<String>) {
        self.platform_message_id = Some(platform_message_id.into());
        self.timestamp = chrono::Utc::now().timestamp_millis() - CONFIRM_GRACE_MS;
    }

    /// 消费条目并以成功结果结算其句柄
    pub(crate) fn settle_ok(self, outcome: SendOutcome) {
        self.handle.resolve(outcome);
    }

    /// 消费条目并以失败结果结算其句柄
    pub(crate) fn settle_err(self, err: OutboundError) {
        self.handle.reject(err);
    }
}
