//! 执行层：Forward Executor、监控事件、执行记录

pub mod events;
pub mod executor;
pub mod record;

pub use events::{BroadcastSink, EventType, FanoutSink, MonitorEvent, MonitoringSink, NoopSink, TracingSink};
pub use executor::{CompletedRun, ExecutionSummary, ForwardExecutor, PartialResult, RunOutcome};
pub use record::{ExecutionRecord, RecordEntry};
