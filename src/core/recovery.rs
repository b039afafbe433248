//! 错误恢复引擎
//!
//! 根据 AgentError 与步骤的尝试次数返回 RecoveryAction，供执行器决定是重试、重规划还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 步骤失败时的上下文：已尝试次数、是否还有重规划额度
#[derive(Debug, Clone, Copy)]
pub struct FailureContext {
    pub attempts: u32,
    pub can_replan: bool,
}

/// 重试上限 + 重规划开关
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    allow_replanning: bool,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2, true)
    }
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, allow_replanning: bool) -> Self {
        Self {
            max_retries,
            allow_replanning,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// 单个步骤最多执行 max_retries + 1 次
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn handle(&self, err: &AgentError, ctx: FailureContext) -> RecoveryAction {
        match err {
            AgentError::ToolInvocation { .. } => {
                if ctx.attempts < self.max_attempts() {
                    RecoveryAction::Retry
                } else if self.allow_replanning && ctx.can_replan {
                    RecoveryAction::Replan
                } else {
                    RecoveryAction::Abort
                }
            }
            AgentError::PlanningFailure(_)
            | AgentError::InvalidPlan(_)
            | AgentError::ReplanningExhausted { .. }
            | AgentError::Cancelled => RecoveryAction::Abort,
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolError;

    fn tool_err() -> AgentError {
        AgentError::ToolInvocation {
            tool: "shell".to_string(),
            source: ToolError::Timeout,
        }
    }

    #[test]
    fn test_retry_until_bound() {
        let engine = RecoveryEngine::new(2, true);
        let ctx = |attempts| FailureContext {
            attempts,
            can_replan: true,
        };
        assert_eq!(engine.handle(&tool_err(), ctx(1)), RecoveryAction::Retry);
        assert_eq!(engine.handle(&tool_err(), ctx(2)), RecoveryAction::Retry);
        assert_eq!(engine.handle(&tool_err(), ctx(3)), RecoveryAction::Replan);
    }

    #[test]
    fn test_no_replan_budget_aborts() {
        let engine = RecoveryEngine::new(0, true);
        let action = engine.handle(
            &tool_err(),
            FailureContext {
                attempts: 1,
                can_replan: false,
            },
        );
        assert_eq!(action, RecoveryAction::Abort);
    }

    #[test]
    fn test_replanning_disabled() {
        let engine = RecoveryEngine::new(1, false);
        let action = engine.handle(
            &tool_err(),
            FailureContext {
                attempts: 2,
                can_replan: true,
            },
        );
        assert_eq!(action, RecoveryAction::Abort);
    }

    #[test]
    fn test_planning_failure_aborts() {
        let engine = RecoveryEngine::default();
        let err = AgentError::PlanningFailure("no decomposition".to_string());
        let ctx = FailureContext {
            attempts: 0,
            can_replan: true,
        };
        assert_eq!(engine.handle(&err, ctx), RecoveryAction::Abort);
        assert_eq!(engine.handle(&AgentError::Cancelled, ctx), RecoveryAction::Abort);
    }
}
