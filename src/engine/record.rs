//! 执行记录：每次工具调用一条，只追加

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plan::StepId;

#[derive(Debug, Clone, Serialize)]
pub struct RecordEntry {
    pub step_id: StepId,
    pub attempt: u32,
    pub tool: String,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionRecord {
    entries: Vec<RecordEntry>,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RecordEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn for_step<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a RecordEntry> + 'a {
        self.entries.iter().filter(move |e| e.step_id == step_id)
    }
}
