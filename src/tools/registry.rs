//! 工具注册表（能力注册表）
//!
//! 所有工具实现 Tool trait（name / description / keywords / invoke / check），由 ToolRegistry 按注册顺序保存。
//! 执行时 resolve(描述) 在已注册集合内做有界的关键词匹配：
//! 唯一最高分者胜出，无匹配或并列时回退到 reasoning-only 工具。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;
use crate::plan::normalize;
use crate::tools::{ReasoningTool, ToolInput, REASONING_TOOL};

/// 工具自述：供匹配与展示
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
}

/// 工具 trait：描述、调用、成功判定
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称
    fn name(&self) -> &str;

    /// 工具描述
    fn description(&self) -> &str;

    /// 匹配步骤描述用的关键词（可含多词短语）
    fn keywords(&self) -> Vec<String> {
        Vec::new()
    }

    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            keywords: self.keywords(),
        }
    }

    /// 参数 JSON Schema，默认即 ToolInput 的 schema
    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schemars::schema_for!(ToolInput)).unwrap_or(Value::Null)
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError>;

    /// 成功判定：Err 表示结果不满足预期（如搜索结果为空）
    fn check(&self, _output: &str) -> Result<(), String> {
        Ok(())
    }
}

/// 注册时可覆盖工具自带的成功判定
pub type SuccessPredicate = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// 工具注册表：按名称存储 Arc<dyn Tool>，reasoning 工具始终存在且不参与匹配
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    predicates: HashMap<String, SuccessPredicate>,
    fallback: Arc<dyn Tool>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            predicates: HashMap::new(),
            fallback: Arc::new(ReasoningTool),
        }
    }

    /// 同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn register_with_predicate(&mut self, tool: impl Tool + 'static, predicate: SuccessPredicate) {
        let name = tool.name().to_string();
        self.register(tool);
        self.predicates.insert(name, predicate);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if name == REASONING_TOOL {
            return Some(self.fallback.clone());
        }
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.describe()).collect()
    }

    /// 动态生成工具清单 JSON（含参数 schema）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "keywords": tool.keywords(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }

    /// 按步骤描述选择工具；描述中 "use tool: <name>" 显式指定时直接使用
    pub fn resolve(&self, description: &str) -> Arc<dyn Tool> {
        let text = normalize(description);

        if let Some(rest) = text.split("use tool:").nth(1) {
            let name = rest.split_whitespace().next().unwrap_or("");
            if let Some(tool) = self.get(name) {
                return tool;
            }
        }

        let words: HashSet<&str> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        let mut best: Option<(usize, usize)> = None;
        let mut tied = false;
        for (i, tool) in self.tools.iter().enumerate() {
            let score = tool
                .keywords()
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| {
                    if k.contains(' ') {
                        text.contains(k.as_str())
                    } else {
                        words.contains(k.as_str())
                    }
                })
                .count();
            if score == 0 {
                continue;
            }
            match best {
                Some((_, s)) if score < s => {}
                Some((_, s)) if score == s => tied = true,
                _ => {
                    best = Some((i, score));
                    tied = false;
                }
            }
        }

        match best {
            Some((i, _)) if !tied => self.tools[i].clone(),
            _ => self.fallback.clone(),
        }
    }

    /// 注册时覆盖的判定优先，否则用工具自带的 check
    pub fn check(&self, tool: &dyn Tool, output: &str) -> Result<(), String> {
        match self.predicates.get(tool.name()) {
            Some(predicate) => predicate(output),
            None => tool.check(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KeywordTool {
        name: &'static str,
        keywords: &'static [&'static str],
    }

    #[async_trait]
    impl Tool for KeywordTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn keywords(&self) -> Vec<String> {
            self.keywords.iter().map(|s| s.to_string()).collect()
        }

        async fn invoke(&self, _input: ToolInput) -> Result<String, ToolError> {
            Ok(self.name.to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(KeywordTool {
            name: "shell",
            keywords: &["shell", "run", "command"],
        });
        r.register(KeywordTool {
            name: "web_search",
            keywords: &["search", "look up", "web"],
        });
        r
    }

    #[test]
    fn test_resolve_best_match() {
        let r = registry();
        assert_eq!(r.resolve("Run the shell command `ls`").name(), "shell");
        assert_eq!(r.resolve("Look up the release date on the web").name(), "web_search");
    }

    #[test]
    fn test_resolve_no_match_falls_back() {
        let r = registry();
        assert_eq!(r.resolve("Decide on a file name").name(), REASONING_TOOL);
    }

    #[test]
    fn test_resolve_tie_falls_back() {
        let r = registry();
        assert_eq!(r.resolve("run a search").name(), REASONING_TOOL);
    }

    #[test]
    fn test_explicit_tool_marker() {
        let r = registry();
        assert_eq!(r.resolve("Use tool: web_search rust 2024 edition").name(), "web_search");
    }

    #[test]
    fn test_predicate_overrides_tool_check() {
        let mut r = ToolRegistry::new();
        r.register_with_predicate(
            KeywordTool {
                name: "shell",
                keywords: &["shell"],
            },
            Arc::new(|out: &str| if out.contains("ok") { Ok(()) } else { Err("missing ok".into()) }),
        );
        let tool = r.get("shell").unwrap();
        assert!(r.check(tool.as_ref(), "all ok").is_ok());
        assert!(r.check(tool.as_ref(), "bad").is_err());
    }

    #[test]
    fn test_schema_json_lists_tools() {
        let json = registry().to_schema_json();
        assert!(json.contains("web_search"));
        assert!(json.contains("payload"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut r = registry();
        r.register(KeywordTool {
            name: "shell",
            keywords: &["bash"],
        });
        assert_eq!(r.tool_names(), vec!["shell", "web_search"]);
        assert!(r.get(REASONING_TOOL).is_some());
    }
}
