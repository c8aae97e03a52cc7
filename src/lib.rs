//! Relay Messenger 出站核心库
//!
//! 提供出站消息的分发、发送确认关联与完成信号解析能力：
//! - 待确认表：进程内在途消息的关联与终结
//! - 分发包装器：按消息类型构建、打标并注册出站事件
//! - 出站管道与投递跟踪中间件：发送并按等待标志延迟完成

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod outbound;
pub mod pending;

pub use client::{HttpPlatformClient, PlatformApi};
pub use config::{MessengerConfig, SweepConfig, load_config};
pub use error::{OutboundError, Result};
pub use metrics::DispatchMetrics;
pub use outbound::{
    BuildRequest, DeliveryTrackerStage, DispatchDisposition, Dispatcher, EventSender,
    MessageBuilder, OutboundEvent, OutboundPipeline, OutboundStage, PLATFORM_MESSENGER,
    SendOptions, SendOutcome, SenderRegistry, StageOutcome, StageRegistration,
};
pub use pending::{
    CompletionHandle, ConfirmationKind, DeliveryFuture, LegacyCallbacks, PendingEntry,
    PendingTable, SweeperHandle, next_correlation_id,
};
