//! Shell 工具：白名单命令，禁止危险操作
//!
//! 仅允许配置中的命令名（首词，如 ls、grep、cargo）；禁止 rm -rf、wget、chmod 777 等子串；
//! 命令取自步骤描述中的反引号片段，通过 sh -c 在工作目录内执行，子进程 kill_on_drop。

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::core::ToolError;
use crate::tools::{Tool, ToolInput};

/// 禁止的命令/子串（即使白名单中有同名，也不允许带这些参数）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "wget ",
    "curl | sh",
    "chmod 777",
    "chmod +s",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:",
];

pub struct ShellTool {
    allowed_commands: HashSet<String>,
    workdir: Option<PathBuf>,
}

impl ShellTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self {
            allowed_commands: allowed_commands.into_iter().map(|s| s.to_lowercase()).collect(),
            workdir: None,
        }
    }

    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    fn is_allowed(&self, raw: &str) -> Result<(), ToolError> {
        let lower = raw.to_lowercase();
        if let Some(forbidden) = FORBIDDEN_SUBSTR.iter().find(|f| lower.contains(*f)) {
            return Err(ToolError::InvalidInput(format!("Forbidden pattern: {}", forbidden)));
        }
        let name = lower.split_whitespace().next().unwrap_or("");
        if name.is_empty() {
            return Err(ToolError::InvalidInput("Empty command".to_string()));
        }
        if self.allowed_commands.contains(name) {
            Ok(())
        } else {
            Err(ToolError::InvalidInput(format!("Command '{}' not in allowlist", name)))
        }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run an allowlisted shell command given in backticks, e.g. run `ls -la`."
    }

    fn keywords(&self) -> Vec<String> {
        ["shell", "bash", "command", "terminal"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        let command = input
            .payload
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| ToolError::InvalidInput("no command in backticks".to_string()))?;
        self.is_allowed(command)?;

        tracing::info!(step_id = %input.step_id, command = %command, "shell tool execute");

        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]).kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("spawn failed: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(ToolError::ExecutionError(format!(
                "Exit {:?}\nstderr: {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(if stderr.trim().is_empty() {
            stdout
        } else {
            format!("{}\nstderr: {}", stdout.trim(), stderr.trim())
        })
    }
}
