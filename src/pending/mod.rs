//! 待确认表模块
//!
//! 维护在途出站消息的关联记录：每条消息在构建时分配关联 ID 并注册一条
//! 待确认条目，发送结果或外部投递/已读确认到达后对条目做一次性终结。

mod entry;
mod table;

pub use entry::{
    CONFIRM_GRACE_MS, CompletionHandle, ConfirmationKind, DeliveryFuture, LegacyCallbacks,
    PendingEntry, next_correlation_id,
};
pub use table::{PendingTable, SweeperHandle};
