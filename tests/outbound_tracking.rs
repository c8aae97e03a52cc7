// 出站投递跟踪集成测试：用脚本化的平台客户端走完整分发链路

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Value as JsonValue, json};

use relay_messenger_core::{
    BuildRequest, ConfirmationKind, DeliveryTrackerStage, DispatchDisposition, DispatchMetrics,
    Dispatcher, LegacyCallbacks, OutboundError, OutboundEvent, OutboundPipeline,
    PLATFORM_MESSENGER, PendingTable, PlatformApi, Result, SendOptions, SendOutcome,
    SenderRegistry,
};

/// 按脚本回应发送调用的平台客户端
struct ScriptedPlatform {
    responses: Mutex<VecDeque<Result<SendOutcome>>>,
    requests: Mutex<Vec<JsonValue>>,
}

impl ScriptedPlatform {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn script_ok(self: &Arc<Self>, message_id: &str) -> Arc<Self> {
        self.responses.lock().unwrap().push_back(Ok(SendOutcome {
            message_id: Some(message_id.to_string()),
            recipient_id: None,
        }));
        Arc::clone(self)
    }

    fn script_err(self: &Arc<Self>, err: OutboundError) -> Arc<Self> {
        self.responses.lock().unwrap().push_back(Err(err));
        Arc::clone(self)
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn send_message(&self, payload: &JsonValue) -> Result<SendOutcome> {
        self.requests.lock().unwrap().push(payload.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(SendOutcome {
                    message_id: Some("mid.default".to_string()),
                    recipient_id: None,
                })
            })
    }
}

async fn setup(
    client: Arc<ScriptedPlatform>,
) -> (Arc<Dispatcher>, Arc<PendingTable>, Arc<OutboundPipeline>) {
    let _ = tracing_subscriber::fmt::try_init();

    let pending = PendingTable::new();
    let pipeline = OutboundPipeline::new();
    let senders = SenderRegistry::with_defaults().await;
    let stage = DeliveryTrackerStage::new(
        PLATFORM_MESSENGER,
        senders,
        client,
        Arc::clone(&pending),
    );
    pipeline.register(stage.registration()).await;

    let dispatcher =
        Dispatcher::with_default_builders(Arc::clone(&pending), Arc::clone(&pipeline)).await;
    (dispatcher, pending, pipeline)
}

fn wait_read() -> SendOptions {
    SendOptions {
        wait_read: true,
        ..SendOptions::default()
    }
}

#[tokio::test]
async fn plain_send_resolves_with_platform_outcome() {
    let client = ScriptedPlatform::new().script_ok("m1");
    let (dispatcher, pending, _pipeline) = setup(Arc::clone(&client)).await;
    let before = pending.len();

    let future = dispatcher
        .send("text", BuildRequest::new("user-1", json!("hello")))
        .await
        .unwrap();

    let outcome = future.await.unwrap();
    assert_eq!(outcome.message_id.as_deref(), Some("m1"));
    assert_eq!(pending.len(), before);
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn wait_read_defers_completion_until_confirmation() {
    let client = ScriptedPlatform::new().script_ok("m2");
    let (dispatcher, pending, _pipeline) = setup(client).await;

    let mut future = dispatcher
        .send(
            "text",
            BuildRequest::new("user-1", json!("hello")).with_options(wait_read()),
        )
        .await
        .unwrap();

    // 发送器已结算，但完成 future 仍在等外部确认
    assert!((&mut future).now_or_never().is_none());
    assert_eq!(pending.len(), 1);

    // 已读确认按平台消息 ID 反查并终结
    assert!(pending.confirm_by_message_id("m2", ConfirmationKind::Read));
    let outcome = future.await.unwrap();
    assert_eq!(outcome.message_id.as_deref(), Some("m2"));
    assert!(pending.is_empty());

    // 重复确认静默忽略
    assert!(!pending.confirm_by_message_id("m2", ConfirmationKind::Read));
}

#[tokio::test]
async fn send_failure_rejects_with_sender_error() {
    let client =
        ScriptedPlatform::new().script_err(OutboundError::SendFailed("network down".to_string()));
    let (dispatcher, pending, _pipeline) = setup(client).await;

    let future = dispatcher
        .send("text", BuildRequest::new("user-1", json!("hello")))
        .await
        .unwrap();

    match future.await {
        Err(OutboundError::SendFailed(msg)) => assert_eq!(msg, "network down"),
        other => panic!("expected SendFailed, got {other:?}"),
    }
    assert!(pending.is_empty());
}

#[tokio::test]
async fn foreign_platform_event_passes_through() {
    let client = ScriptedPlatform::new();
    let (_dispatcher, pending, pipeline) = setup(Arc::clone(&client)).await;

    let event = OutboundEvent::new("text", "user-1", json!({"text": "hi"}))
        .with_platform("telegram");
    let disposition = pipeline.dispatch(event).await.unwrap();

    assert_eq!(disposition, DispatchDisposition::Unhandled);
    assert!(pending.is_empty());
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn unregistered_type_routes_to_error_channel() {
    let client = ScriptedPlatform::new();
    let (_dispatcher, pending, pipeline) = setup(Arc::clone(&client)).await;

    let event = OutboundEvent::new("carousel", "user-1", json!({}));
    match pipeline.dispatch(event).await {
        Err(OutboundError::UnsupportedEventType(ty)) => assert_eq!(ty, "carousel"),
        other => panic!("expected UnsupportedEventType, got {other:?}"),
    }
    assert!(pending.is_empty());
    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn concurrent_sends_settle_independently() {
    let client = ScriptedPlatform::new().script_ok("m-a").script_ok("m-b");
    let (dispatcher, pending, _pipeline) = setup(Arc::clone(&client)).await;

    let (first, second) = tokio::join!(
        dispatcher.send("text", BuildRequest::new("user-1", json!("a"))),
        dispatcher.send("text", BuildRequest::new("user-2", json!("b"))),
    );

    let (first, second) = tokio::join!(first.unwrap(), second.unwrap());
    let mut ids = vec![
        first.unwrap().message_id.unwrap(),
        second.unwrap().message_id.unwrap(),
    ];
    ids.sort();
    assert_eq!(ids, vec!["m-a", "m-b"]);
    assert!(pending.is_empty());
    assert_eq!(client.request_count(), 2);
}

#[tokio::test]
async fn legacy_callbacks_fire_alongside_future() {
    let client = ScriptedPlatform::new().script_ok("m3");
    let (dispatcher, pending, _pipeline) = setup(client).await;

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = Arc::clone(&hits);

    // 旧式构建器：在消息上挂自己的 resolve/reject 回调
    dispatcher
        .register_builder(
            "legacy_text",
            Arc::new(move |request: BuildRequest| -> relay_messenger_core::Result<OutboundEvent> {
                let hits = Arc::clone(&hits_clone);
                Ok(OutboundEvent::new("text", request.recipient_id, request.content)
                    .with_options(request.options)
                    .with_legacy_callbacks(LegacyCallbacks::new(
                        move |_outcome: &SendOutcome| {
                            hits.fetch_add(1, Ordering::SeqCst);
                        },
                        |_err: &OutboundError| panic!("reject path must not fire"),
                    )))
            }),
        )
        .await;

    let future = dispatcher
        .send("legacy_text", BuildRequest::new("user-1", json!({"text": "hi"})))
        .await
        .unwrap();

    let outcome = future.await.unwrap();
    assert_eq!(outcome.message_id.as_deref(), Some("m3"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(pending.is_empty());
}

#[tokio::test]
async fn metrics_track_pending_and_sent_counts() {
    let _ = tracing_subscriber::fmt::try_init();

    let registry = prometheus::Registry::new();
    let metrics = Arc::new(DispatchMetrics::new(&registry).unwrap());

    let client = ScriptedPlatform::new().script_ok("m4");
    let pending = PendingTable::with_metrics(Arc::clone(&metrics));
    let pipeline = OutboundPipeline::new();
    let stage = DeliveryTrackerStage::with_metrics(
        PLATFORM_MESSENGER,
        SenderRegistry::with_defaults().await,
        client,
        Arc::clone(&pending),
        Arc::clone(&metrics),
    );
    pipeline.register(stage.registration()).await;
    let dispatcher =
        Dispatcher::with_default_builders(Arc::clone(&pending), Arc::clone(&pipeline)).await;

    let future = dispatcher
        .send("text", BuildRequest::new("user-1", json!("hello")))
        .await
        .unwrap();
    future.await.unwrap();

    assert_eq!(metrics.messages_sent.get(), 1);
    assert_eq!(metrics.pending_entries.get(), 0);
    assert_eq!(metrics.send_failures.get(), 0);
}
