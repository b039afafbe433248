//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BACKPLAN__*` 覆盖（双下划线表示嵌套，如 `BACKPLAN__ENGINE__MAX_RETRIES_PER_STEP=3`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::RunConfig;
use crate::tools::DEFAULT_SEARCH_ENDPOINT;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    /// 每个 run 的默认配置
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub reasoner: ReasonerSection,
    #[serde(default)]
    pub log: LogSection,
}

/// [app] 段：应用名、工具工作目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// shell / code_exec 的工作目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

impl AppSection {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// [engine] 段：run 配置 + 并发上限
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(flatten)]
    pub run: RunConfig,
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_max_concurrent_runs() -> usize {
    4
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    #[serde(default)]
    pub shell: ShellSection,
    #[serde(default)]
    pub code: CodeSection,
    #[serde(default)]
    pub search: SearchSection,
}

/// [tools.shell] 段：允许执行的命令名（仅首词）
#[derive(Debug, Clone, Deserialize)]
pub struct ShellSection {
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
        }
    }
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "echo", "grep", "head", "tail", "wc", "find", "mkdir", "touch", "cp", "mv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// [tools.code] 段：代码执行解释器
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_interpreter_args(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-c".to_string()]
}

/// [tools.search] 段：搜索端点、URL 域名白名单、结果最大字符数
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            allowed_domains: default_allowed_domains(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

fn default_search_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.to_string()
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        "en.wikipedia.org".into(),
        "github.com".into(),
        "raw.githubusercontent.com".into(),
        "stackoverflow.com".into(),
        "docs.rs".into(),
        "crates.io".into(),
        "doc.rust-lang.org".into(),
        "docs.python.org".into(),
        "pypi.org".into(),
        "developer.mozilla.org".into(),
        "arxiv.org".into(),
    ]
}

/// [reasoner] 段：step-back 分解表（TOML）路径
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReasonerSection {
    pub script: Option<PathBuf>,
}

/// [log] 段：RUST_LOG 未设置时的默认级别
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 从 config 目录加载配置，环境变量 BACKPLAN__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BACKPLAN__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if !path.exists() {
            return Err(config::ConfigError::NotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path.clone()));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BACKPLAN")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
max_retries_per_step = 5
allow_replanning = false

[engine.tool_timeout_seconds]
web_search = 7

[tools.shell]
allowed_commands = ["ls"]

[reasoner]
script = "plans/release.toml"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.engine.run.max_retries_per_step, 5);
        assert!(!cfg.engine.run.allow_replanning);
        assert_eq!(cfg.engine.run.max_planning_depth, 10);
        assert_eq!(cfg.engine.run.tool_timeout_seconds.get("web_search"), Some(&7));
        assert_eq!(cfg.engine.max_concurrent_runs, 4);
        assert_eq!(cfg.tools.shell.allowed_commands, vec!["ls"]);
        assert_eq!(cfg.tools.code.interpreter, "python3");
        assert_eq!(cfg.reasoner.script, Some(PathBuf::from("plans/release.toml")));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(load_config(Some(PathBuf::from("/nonexistent/backplan.toml"))).is_err());
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.run.default_tool_timeout_secs, 30);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.app.workspace_root(), PathBuf::from("workspace"));
        assert!(cfg.tools.search.allowed_domains.iter().any(|d| d == "docs.rs"));
    }
}
