//! 出站分发监控指标

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// 出站分发指标
#[derive(Clone)]
pub struct DispatchMetrics {
    /// 成功发出的消息数
    pub messages_sent: IntCounter,
    /// 发送失败数
    pub send_failures: IntCounter,
    /// 延迟完成（等待投递/已读确认）的发送数
    pub completions_deferred: IntCounter,
    /// 收到的外部确认数（按类型）
    pub confirmations_received: IntCounterVec,
    /// 迟到/重复而被忽略的确认数
    pub stale_confirmations: IntCounter,
    /// 当前待确认条目数
    pub pending_entries: IntGauge,
    /// 单次发送耗时分布
    pub send_duration_seconds: Histogram,
}

impl DispatchMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let messages_sent = IntCounter::new(
            "outbound_messages_sent_total",
            "Total number of messages successfully sent to the platform",
        )?;
        let send_failures = IntCounter::new(
            "outbound_send_failures_total",
            "Total number of failed send attempts",
        )?;
        let completions_deferred = IntCounter::new(
            "outbound_completions_deferred_total",
            "Number of sends whose completion waits for a delivery/read confirmation",
        )?;
        let confirmations_received = IntCounterVec::new(
            Opts::new(
                "outbound_confirmations_received_total",
                "Number of external confirmations applied to pending entries",
            ),
            &["kind"],
        )?;
        let stale_confirmations = IntCounter::new(
            "outbound_stale_confirmations_total",
            "Number of confirmations ignored because the entry was already settled",
        )?;
        let pending_entries = IntGauge::new(
            "outbound_pending_entries",
            "Current number of in-flight pending entries",
        )?;
        let send_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "outbound_send_duration_seconds",
            "Send call latency in seconds",
        ))?;

        registry.register(Box::new(messages_sent.clone()))?;
        registry.register(Box::new(send_failures.clone()))?;
        registry.register(Box::new(completions_deferred.clone()))?;
        registry.register(Box::new(confirmations_received.clone()))?;
        registry.register(Box::new(stale_confirmations.clone()))?;
        registry.register(Box::new(pending_entries.clone()))?;
        registry.register(Box::new(send_duration_seconds.clone()))?;

        Ok(Self {
            messages_sent,
            send_failures,
            completions_deferred,
            confirmations_received,
            stale_confirmations,
            pending_entries,
            send_duration_seconds,
        })
    }
}
