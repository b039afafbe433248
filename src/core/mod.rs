//! 核心层：错误与恢复、运行状态、运行监管、调度、编排

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod task_scheduler;

pub use error::{AgentError, RecoveryAction, ToolError};
pub use orchestrator::{RunConfig, RunManager};
pub use recovery::{FailureContext, RecoveryEngine};
pub use session_supervisor::RunSupervisor;
pub use state::{RunId, RunState, RunStatus};
pub use task_scheduler::RunScheduler;
