//! 监控事件与输出端（Monitoring Sink）
//!
//! 每次状态转换发出一个 MonitorEvent；发送是尽力而为的，sink 出错或无人订阅都不影响执行。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::core::RunId;
use crate::plan::StepId;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Planned,
    Ready,
    Started,
    Completed,
    Failed,
    Skipped,
    Replanned,
    RunCompleted,
    RunAborted,
}

/// 单条监控事件（可序列化为 JSON 供外部消费）
#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
    pub run_id: RunId,
    pub step_id: Option<StepId>,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl MonitorEvent {
    pub fn new(run_id: &str, step_id: Option<&str>, event_type: EventType, payload: Value) -> Self {
        Self {
            run_id: run_id.to_string(),
            step_id: step_id.map(str::to_string),
            event_type,
            timestamp: Utc::now(),
            payload,
        }
    }
}

pub trait MonitoringSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// 丢弃所有事件
pub struct NoopSink;

impl MonitoringSink for NoopSink {
    fn emit(&self, _event: MonitorEvent) {}
}

/// 以结构化日志输出事件
pub struct TracingSink;

impl MonitoringSink for TracingSink {
    fn emit(&self, event: MonitorEvent) {
        tracing::info!(
            run_id = %event.run_id,
            step_id = event.step_id.as_deref().unwrap_or("-"),
            event = ?event.event_type,
            payload = %event.payload,
            "monitor"
        );
    }
}

/// 通过 tokio broadcast 转发给任意数量的订阅者；无订阅者时静默丢弃
pub struct BroadcastSink {
    tx: broadcast::Sender<MonitorEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl MonitoringSink for BroadcastSink {
    fn emit(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }
}

/// 依次转发给多个 sink
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MonitoringSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MonitoringSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MonitoringSink for FanoutSink {
    fn emit(&self, event: MonitorEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = Arc::new(BroadcastSink::new(8));
        let mut rx = sink.subscribe();
        let fanout = FanoutSink::new().with(Arc::new(NoopSink)).with(sink.clone());

        fanout.emit(MonitorEvent::new("run-1", Some("step-0"), EventType::Started, Value::Null));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::Started);
        assert_eq!(event.step_id.as_deref(), Some("step-0"));
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        BroadcastSink::new(1).emit(MonitorEvent::new("run-1", None, EventType::RunCompleted, Value::Null));
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let e = MonitorEvent::new("r", None, EventType::RunAborted, serde_json::json!({"k": 1}));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event_type"], "run_aborted");
        assert_eq!(json["payload"]["k"], 1);
    }
}
