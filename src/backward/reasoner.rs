//! Reasoner：step-back 能力的抽象与实现
//!
//! 给定一个节点描述与已知事实，回答「尝试它之前必须已经成立什么？」。
//! - ScriptedReasoner：从 TOML 分解表读取（CLI 与测试用）
//! - LlmReasoner：拼 prompt 调用任意 LlmClient，解析编号/列表行；回复 NONE 表示无前置条件

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::{LlmClient, Message};
use crate::plan::normalize;

/// step-back 能力；返回的前置条件按生成顺序排列
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn step_back(&self, description: &str, known_facts: &[String]) -> Result<Vec<String>, String>;
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    step: Vec<ScriptEntry>,
}

#[derive(Debug, Deserialize)]
struct ScriptEntry {
    description: String,
    #[serde(default)]
    requires: Vec<String>,
}

/// 分解表：描述（归一化）-> 前置条件；表中没有的描述视为无前置条件
///
/// ```toml
/// [[step]]
/// description = "publish file X"
/// requires = ["file X exists"]
/// ```
#[derive(Debug, Default, Clone)]
pub struct ScriptedReasoner {
    table: HashMap<String, Vec<String>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, description: &str, requires: &[&str]) -> Self {
        self.table.insert(
            normalize(description),
            requires.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        let file: ScriptFile = toml::from_str(s).map_err(|e| format!("Invalid step-back script: {}", e))?;
        let table = file
            .step
            .into_iter()
            .map(|e| (normalize(&e.description), e.requires))
            .collect();
        Ok(Self { table })
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn step_back(&self, description: &str, _known_facts: &[String]) -> Result<Vec<String>, String> {
        Ok(self.table.get(&normalize(description)).cloned().unwrap_or_default())
    }
}

const DEFAULT_STEP_BACK_PROMPT: &str = r#"You are planning by working backwards from a goal.

Step to attempt: {description}

Facts already true:
{facts}

What must already be true immediately before this step can be attempted?
List each independent prerequisite on its own numbered line, most important first.
If a prerequisite is one of the facts above, repeat that fact verbatim.
If nothing else is required, answer exactly: NONE"#;

/// 基于 LLM 的 step-back
pub struct LlmReasoner {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
}

impl LlmReasoner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            prompt_template: DEFAULT_STEP_BACK_PROMPT.to_string(),
        }
    }

    /// 模板占位符：{description}、{facts}
    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    fn render(&self, description: &str, known_facts: &[String]) -> String {
        let facts = if known_facts.is_empty() {
            "(none)".to_string()
        } else {
            known_facts
                .iter()
                .map(|f| format!("- {}", f))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.prompt_template
            .replace("{description}", description)
            .replace("{facts}", &facts)
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn step_back(&self, description: &str, known_facts: &[String]) -> Result<Vec<String>, String> {
        let prompt = self.render(description, known_facts);
        let response = self.llm.complete(&[Message::user(prompt)]).await?;
        Ok(parse_prerequisites(&response))
    }
}

/// 解析 LLM 回复：编号行（1. / 1)）或列表行（- / *）；NONE 表示没有前置条件
pub fn parse_prerequisites(response: &str) -> Vec<String> {
    let trimmed = response.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut items = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        let is_item = line.starts_with(|c: char| c.is_ascii_digit())
            || line.starts_with("- ")
            || line.starts_with("* ");
        if !is_item {
            continue;
        }
        let item = line
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c == '*')
            .trim();
        if !item.is_empty() && !item.eq_ignore_ascii_case("none") {
            items.push(item.to_string());
        }
    }

    // 没有列表格式时整段当作单个前置条件
    if items.is_empty() {
        items.push(trimmed.to_string());
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_parse_numbered_list() {
        let parsed = parse_prerequisites("Sure:\n1. file X exists\n2) network is up\n\n- credentials loaded");
        assert_eq!(parsed, vec!["file X exists", "network is up", "credentials loaded"]);
    }

    #[test]
    fn test_parse_none() {
        assert!(parse_prerequisites("NONE").is_empty());
        assert!(parse_prerequisites("  none \n").is_empty());
    }

    #[test]
    fn test_parse_plain_sentence() {
        assert_eq!(parse_prerequisites("the repo is cloned"), vec!["the repo is cloned"]);
    }

    #[tokio::test]
    async fn test_scripted_reasoner_normalizes_lookup() {
        let reasoner = ScriptedReasoner::new().with("Publish file X", &["file X exists"]);
        let prereqs = reasoner.step_back("publish  file x.", &[]).await.unwrap();
        assert_eq!(prereqs, vec!["file X exists"]);
        assert!(reasoner.step_back("unknown", &[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_scripted_reasoner_from_toml() {
        let reasoner = ScriptedReasoner::from_toml_str(
            r#"
[[step]]
description = "deploy"
requires = ["build passes", "config present"]

[[step]]
description = "build passes"
"#,
        )
        .unwrap();
        assert_eq!(reasoner.len(), 2);
        assert!(ScriptedReasoner::from_toml_str("step = 3").is_err());
    }

    #[tokio::test]
    async fn test_llm_reasoner_renders_facts() {
        let llm = Arc::new(MockLlmClient::with_responses(["1. file X exists"]));
        let reasoner = LlmReasoner::new(llm);
        let prompt = reasoner.render("publish file X", &["file X exists".to_string()]);
        assert!(prompt.contains("publish file X"));
        assert!(prompt.contains("- file X exists"));

        let prereqs = reasoner.step_back("publish file X", &[]).await.unwrap();
        assert_eq!(prereqs, vec!["file X exists"]);
        // 脚本用完后 Mock 返回 NONE
        assert!(reasoner.step_back("anything", &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_reasoner_propagates_error() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error("rate limited");
        let reasoner = LlmReasoner::new(llm);
        assert_eq!(reasoner.step_back("x", &[]).await.unwrap_err(), "rate limited");
    }
}
