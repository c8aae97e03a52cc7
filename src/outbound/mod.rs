//! 出站消息模块
//!
//! - 事件模型：带平台标签、等待标志与关联 ID 的出站事件
//! - 出站管道：按 order 排序的具名阶段，终结/透传以返回值显式表达
//! - 投递跟踪中间件：发送事件并按等待标志终结或延迟对应的待确认条目
//! - 分发包装器：按消息类型构建、打标、注册并入队

mod dispatch;
mod event;
mod middleware;
mod pipeline;
mod senders;

pub use dispatch::{BuildRequest, Dispatcher, MessageBuilder};
pub use event::{OutboundEvent, PLATFORM_MESSENGER, SendOptions, SendOutcome};
pub use middleware::DeliveryTrackerStage;
pub use pipeline::{
    DispatchDisposition, OutboundPipeline, OutboundStage, StageOutcome, StageRegistration,
};
pub use senders::{AttachmentSender, EventSender, SenderRegistry, TextSender};
