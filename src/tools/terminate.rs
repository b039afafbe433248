//! 终止工具：步骤要求结束任务时，返回最终说明作为输出

use async_trait::async_trait;

use crate::core::ToolError;
use crate::tools::{Tool, ToolInput};

pub struct TerminateTool;

#[async_trait]
impl Tool for TerminateTool {
    fn name(&self) -> &str {
        "terminate"
    }

    fn description(&self) -> &str {
        "Finish the task and report the final answer given in the step."
    }

    fn keywords(&self) -> Vec<String> {
        vec!["terminate".into(), "finish".into(), "report".into(), "final answer".into()]
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        let mut out = format!("Finished: {}", input.payload_or_description());
        for (step, output) in &input.context {
            out.push_str(&format!("\n[{}] {}", step, output.trim()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_includes_context() {
        let mut input = ToolInput::new("step-2", "report the answer");
        input.context.insert("step-1".into(), "42\n".into());
        let out = TerminateTool.invoke(input).await.unwrap();
        assert_eq!(out, "Finished: report the answer\n[step-1] 42");
    }
}
