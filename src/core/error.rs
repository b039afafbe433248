//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 Retry / Replan / Abort。

use serde::Serialize;
use thiserror::Error;

/// 工具调用错误（Tool 契约的一部分，执行器只看到这三类）
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ToolError {
    #[error("Tool timed out")]
    Timeout,

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// 引擎运行过程中可能出现的错误（规划、重排、工具、重规划、取消等）
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// step-back 分解失败：不重试，直接返回给调用方
    #[error("Planning failure: {0}")]
    PlanningFailure(String),

    /// 重排结果含环或悬空依赖：说明规划器不变量被破坏
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Tool '{tool}' failed: {source}")]
    ToolInvocation {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Replanning exhausted for step {step_id} after {attempts} attempts: {reason}")]
    ReplanningExhausted {
        step_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run still in progress: {0}")]
    RunInProgress(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 错误类别名（写入 partial result 与事件 payload）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::PlanningFailure(_) => "planning_failure",
            AgentError::InvalidPlan(_) => "invalid_plan",
            AgentError::ToolInvocation { .. } => "tool_invocation",
            AgentError::ReplanningExhausted { .. } => "replanning_exhausted",
            AgentError::Cancelled => "cancelled",
            AgentError::RunNotFound(_) => "run_not_found",
            AgentError::RunInProgress(_) => "run_in_progress",
            AgentError::LlmError(_) => "llm_error",
            AgentError::ConfigError(_) => "config_error",
        }
    }
}

/// 恢复引擎根据错误与尝试次数给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 以相同描述再执行一次
    Retry,
    /// 以失败步骤为子目标重新倒推
    Replan,
    /// 终止当前运行
    Abort,
}
