//! 工具执行器
//!
//! 持有 ToolRegistry 与按工具的超时表，invoke 在超时内调用 Tool::invoke，同时监听运行级 CancellationToken。
//! 取消时直接丢弃调用 future（子进程 kill_on_drop），超时 / 失败 / 判定不通过都转为 AgentError::ToolInvocation；
//! 每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ToolError};
use crate::tools::{Tool, ToolInput, ToolRegistry};

/// 未单独配置时的默认超时（秒）
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// 内置工具的默认超时
pub fn default_tool_timeouts() -> HashMap<String, u64> {
    HashMap::from([
        ("shell".to_string(), 60),
        ("code_exec".to_string(), 60),
        ("web_search".to_string(), 15),
    ])
}

/// 工具执行器：对每次调用施加超时与取消，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
    timeouts: HashMap<String, Duration>,
}

impl ToolExecutor {
    /// 以内置工具的默认超时为底，未列出的工具用 default_timeout_secs
    pub fn new(registry: Arc<ToolRegistry>, default_timeout_secs: u64) -> Self {
        let timeouts = default_tool_timeouts()
            .into_iter()
            .map(|(name, secs)| (name, Duration::from_secs(secs)))
            .collect();
        Self {
            registry,
            default_timeout: Duration::from_secs(default_timeout_secs),
            timeouts,
        }
    }

    /// 逐项覆盖工具超时（秒），未列出的工具保留原值
    pub fn with_timeouts(mut self, timeouts: &HashMap<String, u64>) -> Self {
        for (name, secs) in timeouts {
            self.timeouts.insert(name.clone(), Duration::from_secs(*secs));
        }
        self
    }

    pub fn timeout_for(&self, tool_name: &str) -> Duration {
        self.timeouts.get(tool_name).copied().unwrap_or(self.default_timeout)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn resolve(&self, description: &str) -> Arc<dyn Tool> {
        self.registry.resolve(description)
    }

    /// 调用工具；取消返回 Cancelled，其余失败返回 ToolInvocation
    pub async fn invoke(
        &self,
        tool: &dyn Tool,
        input: ToolInput,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let tool_name = tool.name().to_string();
        let limit = self.timeout_for(&tool_name);
        let step_id = input.step_id.clone();
        let input_preview = preview(input.payload_or_description());
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = timeout(limit, tool.invoke(input)) => Some(match r {
                Ok(inner) => inner,
                Err(_) => Err(ToolError::Timeout),
            }),
        };

        let result = match result {
            Some(Ok(output)) => match self.registry.check(tool, &output) {
                Ok(()) => Some(Ok(output)),
                Err(reason) => Some(Err(ToolError::ExecutionError(format!("result rejected: {}", reason)))),
            },
            other => other,
        };

        let outcome = match &result {
            None => "cancelled",
            Some(Ok(_)) => "ok",
            Some(Err(ToolError::Timeout)) => "timeout",
            Some(Err(_)) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "step_id": step_id,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "input_preview": input_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            None => Err(AgentError::Cancelled),
            Some(Ok(output)) => Ok(output),
            Some(Err(source)) => Err(AgentError::ToolInvocation {
                tool: tool_name,
                source,
            }),
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn invoke(&self, _input: ToolInput) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".into())
        }
    }

    struct EmptyTool;

    #[async_trait]
    impl Tool for EmptyTool {
        fn name(&self) -> &str {
            "empty"
        }

        fn description(&self) -> &str {
            "returns nothing"
        }

        async fn invoke(&self, _input: ToolInput) -> Result<String, ToolError> {
            Ok(String::new())
        }

        fn check(&self, output: &str) -> Result<(), String> {
            if output.is_empty() {
                Err("empty output".into())
            } else {
                Ok(())
            }
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        registry.register(EmptyTool);
        ToolExecutor::new(Arc::new(registry), 30).with_timeouts(&HashMap::from([("slow".to_string(), 0)]))
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_invocation() {
        let exec = executor();
        let err = exec
            .invoke(&SlowTool, ToolInput::new("step-0", "wait"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ToolInvocation { ref tool, source: ToolError::Timeout } if tool == "slow"
        ));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_invocation() {
        let exec = ToolExecutor::new(Arc::new(ToolRegistry::new()), 30);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec
            .invoke(&SlowTool, ToolInput::new("step-0", "wait"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_rejected_result_is_execution_error() {
        let exec = executor();
        let err = exec
            .invoke(&EmptyTool, ToolInput::new("step-0", "x"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::ToolInvocation { source: ToolError::ExecutionError(ref m), .. } if m.contains("empty output")
        ));
    }

    #[test]
    fn test_timeout_lookup() {
        let exec = ToolExecutor::new(Arc::new(ToolRegistry::new()), 30).with_timeouts(&default_tool_timeouts());
        assert_eq!(exec.timeout_for("web_search"), Duration::from_secs(15));
        assert_eq!(exec.timeout_for("terminate"), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_override_keeps_builtin_timeouts() {
        let exec = ToolExecutor::new(Arc::new(ToolRegistry::new()), 30)
            .with_timeouts(&HashMap::from([("web_search".to_string(), 7)]));
        assert_eq!(exec.timeout_for("web_search"), Duration::from_secs(7));
        assert_eq!(exec.timeout_for("shell"), Duration::from_secs(60));
        assert_eq!(exec.timeout_for("code_exec"), Duration::from_secs(60));
        assert_eq!(exec.timeout_for("my_tool"), Duration::from_secs(30));
    }
}
