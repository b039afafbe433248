//! 工作记忆：目标、事实、步骤输出
//!
//! 作用域为单次运行；事实只追加不删除，被新事实推翻时标记为 stale。
//! 步骤完成后输出按 step id 写入，同时把步骤描述作为新事实追加，供后续步骤与重规划使用。

use std::collections::BTreeMap;

use serde::Serialize;

use crate::plan::{normalize, Goal, StepId};

/// 事实来源
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "step_id", rename_all = "snake_case")]
pub enum FactSource {
    /// 初始状态给定
    Initial,
    /// 某步骤完成后产生
    Step(StepId),
    /// reasoning-only 工具记录的假设
    Assumption(StepId),
}

#[derive(Clone, Debug, Serialize)]
pub struct Fact {
    /// 归一化后的键，同键新事实会使旧事实 stale
    pub key: String,
    pub text: String,
    pub source: FactSource,
    pub stale: bool,
}

/// 单次运行的工作记忆
#[derive(Clone, Debug)]
pub struct WorkingMemory {
    goal: Goal,
    facts: Vec<Fact>,
    outputs: BTreeMap<StepId, String>,
}

/// 运行结束时随结果一起返回的快照
#[derive(Clone, Debug, Serialize)]
pub struct MemorySnapshot {
    pub goal: Goal,
    pub facts: Vec<Fact>,
    pub outputs: BTreeMap<StepId, String>,
}

impl WorkingMemory {
    pub fn new<I, S>(goal: Goal, initial_facts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut memory = Self {
            goal,
            facts: Vec::new(),
            outputs: BTreeMap::new(),
        };
        for fact in initial_facts {
            memory.add_fact(fact, FactSource::Initial);
        }
        memory
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    /// 以归一化文本为键追加事实；已存在相同的有效事实时不重复追加
    pub fn add_fact(&mut self, text: impl Into<String>, source: FactSource) -> bool {
        let text = text.into();
        let key = normalize(&text);
        if key.is_empty() || self.knows(&text) {
            return false;
        }
        self.facts.push(Fact {
            key,
            text,
            source,
            stale: false,
        });
        true
    }

    /// 以显式键写入事实：同键且内容不同的旧事实被标记为 stale
    pub fn assert_fact(&mut self, key: &str, text: impl Into<String>, source: FactSource) {
        let text = text.into();
        let key = normalize(key);
        let mut same = false;
        for fact in self.facts.iter_mut().filter(|f| f.key == key && !f.stale) {
            if fact.text == text {
                same = true;
            } else {
                fact.stale = true;
            }
        }
        if !same {
            self.facts.push(Fact {
                key,
                text,
                source,
                stale: false,
            });
        }
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn active_facts(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter().filter(|f| !f.stale)
    }

    /// 有效事实文本（重规划时作为新的初始状态）
    pub fn fact_texts(&self) -> Vec<String> {
        self.active_facts().map(|f| f.text.clone()).collect()
    }

    pub fn knows(&self, text: &str) -> bool {
        let key = normalize(text);
        self.active_facts().any(|f| f.key == key || normalize(&f.text) == key)
    }

    /// 记录步骤输出，并把步骤描述作为已成立的事实追加
    pub fn record_step_output(
        &mut self,
        step_id: &StepId,
        description: &str,
        output: impl Into<String>,
    ) {
        self.outputs.insert(step_id.clone(), output.into());
        self.add_fact(description, FactSource::Step(step_id.clone()));
    }

    pub fn step_output(&self, step_id: &str) -> Option<&str> {
        self.outputs.get(step_id).map(String::as_str)
    }

    pub fn outputs(&self) -> &BTreeMap<StepId, String> {
        &self.outputs
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            goal: self.goal.clone(),
            facts: self.facts.clone(),
            outputs: self.outputs.clone(),
        }
    }
}
