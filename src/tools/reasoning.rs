//! reasoning-only 工具：没有匹配的工具时使用，不产生外部副作用
//!
//! 输出 "Assumed: <描述>"，执行器据此把该步骤记为假设事实。

use async_trait::async_trait;

use crate::core::ToolError;
use crate::tools::{Tool, ToolInput};

pub const REASONING_TOOL: &str = "reasoning";

pub struct ReasoningTool;

impl ReasoningTool {
    pub fn assumption(description: &str) -> String {
        format!("Assumed: {}", description)
    }
}

#[async_trait]
impl Tool for ReasoningTool {
    fn name(&self) -> &str {
        REASONING_TOOL
    }

    fn description(&self) -> &str {
        "Reason about the step without external action and record the outcome as an assumption."
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        Ok(Self::assumption(&input.description))
    }
}
