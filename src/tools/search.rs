//! Web 搜索工具：查询搜索端点或抓取白名单 URL
//!
//! payload 为 http(s) URL 时直接抓取（域名须在白名单内），否则把 payload（或整段描述）作为查询词
//! 拼到搜索端点上。HTML 响应用 html2text 提取可读文本，超过 max_result_chars 截断并追加 ...[truncated]。
//! 结果为空视为不满足（check 返回 Err），交给执行器按失败处理。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::{Client, Url};

use crate::core::ToolError;
use crate::tools::{Tool, ToolInput};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.to_ascii_lowercase().starts_with("<html")
        || (s.contains('<') && (s.contains("</") || s.contains("<head") || s.contains("<title")))
}

fn truncate(body: String, max: usize) -> String {
    if body.chars().count() > max {
        body.chars().take(max).collect::<String>() + "\n...[truncated]"
    } else {
        body
    }
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, allowed_domains: Vec<String>, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            allowed_domains: allowed_domains.into_iter().map(|s| s.to_lowercase()).collect(),
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &Url) -> Result<(), ToolError> {
        let host = url
            .host_str()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| ToolError::InvalidInput(format!("URL without host: {}", url)))?;
        let allowed = self
            .allowed_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{}", d)));
        if allowed {
            Ok(())
        } else {
            Err(ToolError::InvalidInput(format!("Domain not in allowlist: {}", host)))
        }
    }

    /// 构造请求 URL：URL payload 原样使用，否则作为查询参数 q
    fn target(&self, query: &str) -> Result<Url, ToolError> {
        if query.starts_with("http://") || query.starts_with("https://") {
            let url = Url::parse(query).map_err(|e| ToolError::InvalidInput(format!("Invalid URL: {}", e)))?;
            self.is_allowed(&url)?;
            return Ok(url);
        }
        Url::parse_with_params(&self.endpoint, &[("q", query)])
            .map_err(|e| ToolError::InvalidInput(format!("Invalid search endpoint: {}", e)))
    }

    async fn fetch(&self, url: Url) -> Result<String, ToolError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(ToolError::ExecutionError(format!("HTTP {}", resp.status())));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Read body: {}", e)))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let text = if looks_like_html(body) {
            match from_read(body.as_bytes(), 120) {
                Ok(text) => text,
                Err(e) => return Err(ToolError::ExecutionError(format!("HTML decode: {}", e))),
            }
        } else {
            body.to_string()
        };
        Ok(truncate(text, self.max_result_chars))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query, or fetch an allowlisted URL, and return readable text."
    }

    fn keywords(&self) -> Vec<String> {
        ["search", "web", "google", "find out", "look up", "research", "url"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        let query = input.payload_or_description().trim();
        if query.is_empty() {
            return Err(ToolError::InvalidInput("Missing query".to_string()));
        }
        let url = self.target(query)?;
        tracing::info!(step_id = %input.step_id, url = %url, "web_search tool fetch");
        self.fetch(url).await
    }

    fn check(&self, output: &str) -> Result<(), String> {
        if output.trim().is_empty() {
            Err("no search results".to_string())
        } else {
            Ok(())
        }
    }
}
