//! 运行状态：RunState 与对外投影的 RunStatus
//!
//! 执行器内部持有完整 Plan，只把轻量的 RunStatus 通过 watch 通道投影给 get_status。

use serde::Serialize;

use crate::plan::StepId;

pub type RunId = String;

/// 运行阶段：PLANNING → QUEUED → EXECUTING → {COMPLETED, ABORTED}
///
/// PLANNING 在 start_run 内完成，run_id 返回时已进入 QUEUED（等待并发许可）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Planning,
    Queued,
    Executing,
    Completed,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Aborted)
    }
}

/// get_status 返回的投影
#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub run_id: RunId,
    pub state: RunState,
    pub completed_steps: Vec<StepId>,
    pub current_step: Option<StepId>,
    pub total_steps: usize,
}

impl RunStatus {
    /// 规划完成、尚未开始执行
    pub fn queued(run_id: impl Into<RunId>, total_steps: usize) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Queued,
            completed_steps: Vec::new(),
            current_step: None,
            total_steps,
        }
    }
}
