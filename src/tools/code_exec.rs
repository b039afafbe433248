//! 代码执行工具：把步骤中的代码片段交给配置的解释器运行（默认 python3 -c）

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::ToolError;
use crate::tools::{Tool, ToolInput};

pub struct CodeExecTool {
    interpreter: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
}

impl Default for CodeExecTool {
    fn default() -> Self {
        Self::new("python3", vec!["-c".to_string()])
    }
}

impl CodeExecTool {
    /// 代码作为最后一个参数追加在 args 之后
    pub fn new(interpreter: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "code_exec"
    }

    fn description(&self) -> &str {
        "Execute a code snippet (fenced or in backticks) with the configured interpreter and return stdout."
    }

    fn keywords(&self) -> Vec<String> {
        ["python", "code", "script", "compute", "calculate", "program"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        let code = input
            .payload
            .as_deref()
            .ok_or_else(|| ToolError::InvalidInput("no code snippet in step description".to_string()))?;

        tracing::info!(step_id = %input.step_id, interpreter = %self.interpreter, "code_exec tool execute");

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args).arg(code).kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("{} not runnable: {}", self.interpreter, e)))?;

        if !output.status.success() {
            return Err(ToolError::ExecutionError(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runs_with_sh_interpreter() {
        let tool = CodeExecTool::new("sh", vec!["-c".into()]);
        let out = tool
            .invoke(ToolInput::new("step-0", "compute `echo $((2 + 3))`"))
            .await
            .unwrap();
        assert_eq!(out.trim(), "5");
    }

    #[tokio::test]
    async fn test_failure_carries_stderr() {
        let tool = CodeExecTool::new("sh", vec!["-c".into()]);
        let err = tool
            .invoke(ToolInput::new("step-0", "run `echo boom >&2; exit 3`"))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::ExecutionError("boom".into()));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let tool = CodeExecTool::new("definitely-not-an-interpreter", vec![]);
        let err = tool.invoke(ToolInput::new("step-0", "`1`")).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionError(_)));
    }
}
