//! 工具输入结构与 JSON Schema（schemars 自动生成）
//!
//! 执行器从步骤描述与工作记忆构造 ToolInput；描述中第一个反引号片段（`cmd` 或 ```code```）作为 payload。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::memory::WorkingMemory;
use crate::plan::Step;

/// 传给 Tool::invoke 的结构化输入
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolInput {
    /// 步骤 ID
    pub step_id: String,
    /// 步骤的自然语言描述
    pub description: String,
    /// 描述中内联的命令/代码/查询（反引号包裹的部分）
    pub payload: Option<String>,
    /// 前置步骤的输出，按步骤 ID
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl ToolInput {
    pub fn new(step_id: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        Self {
            step_id: step_id.into(),
            payload: extract_payload(&description),
            description,
            context: BTreeMap::new(),
        }
    }

    /// 以步骤描述构造，并附上其前置步骤在工作记忆中的输出
    pub fn from_step(step: &Step, memory: &WorkingMemory) -> Self {
        let mut input = Self::new(step.id.clone(), step.description.clone());
        for dep in &step.dependencies {
            if let Some(out) = memory.step_output(dep) {
                input.context.insert(dep.clone(), out.to_string());
            }
        }
        input
    }

    /// payload 优先，否则用描述本身
    pub fn payload_or_description(&self) -> &str {
        self.payload.as_deref().unwrap_or(&self.description)
    }
}

/// 提取第一个代码片段：优先 ``` 围栏，其次行内 `...`
pub fn extract_payload(description: &str) -> Option<String> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    static INLINE: OnceLock<Option<Regex>> = OnceLock::new();
    let fenced = FENCED
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n?(.*?)```").ok())
        .as_ref();
    let inline = INLINE.get_or_init(|| Regex::new(r"`([^`]+)`").ok()).as_ref();

    let found = fenced
        .and_then(|re| re.captures(description))
        .or_else(|| inline.and_then(|re| re.captures(description)))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());
    found.filter(|s| !s.is_empty())
}

/// 返回 ToolInput 的 JSON Schema 字符串，可拼入 prompt 或文档
pub fn tool_input_schema_json() -> String {
    let schema = schema_for!(ToolInput);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::WorkingMemory;
    use crate::plan::Goal;

    #[test]
    fn test_extract_inline_payload() {
        assert_eq!(extract_payload("Run `ls -la` in the workspace"), Some("ls -la".to_string()));
        assert_eq!(extract_payload("no code here"), None);
        assert_eq!(extract_payload("empty `  `"), None);
    }

    #[test]
    fn test_extract_fenced_payload() {
        let d = "Compute it:\n```python\nprint(1 + 1)\n```";
        assert_eq!(extract_payload(d), Some("print(1 + 1)".to_string()));
    }

    #[test]
    fn test_from_step_collects_dependency_outputs() {
        let mut memory = WorkingMemory::new(Goal::new("g"), Vec::<String>::new());
        memory.record_step_output(&"step-0".to_string(), "fetch data", "42");
        let mut step = Step::new("step-1", "echo result with `echo done`");
        step.dependencies.push("step-0".into());

        let input = ToolInput::from_step(&step, &memory);
        assert_eq!(input.payload.as_deref(), Some("echo done"));
        assert_eq!(input.context.get("step-0").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = tool_input_schema_json();
        assert!(schema.contains("payload"));
        assert!(schema.contains("step_id"));
    }
}
