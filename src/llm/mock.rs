//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 依次返回预置的回复；用完后返回 "NONE"，即「没有未满足的前置条件」。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, String>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
        }
    }

    /// 追加一次失败回复
    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(error.into()));
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        let next = self
            .responses
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        next.unwrap_or_else(|| Ok("NONE".to_string()))
    }
}
