//! 计划类型定义
//!
//! 定义目标、倒推链、步骤、计划等核心数据类型

use serde::{Deserialize, Serialize};

pub type StepId = String;

/// 描述归一化：小写、合并空白、去掉末尾标点；用于事实匹配与环检测
pub fn normalize(text: &str) -> String {
    const TRAILING: &[char] = &['.', '!', '?', ';', ':', ',', '。', '！', '？', '；', '：', '，'];
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(|c: char| c.is_whitespace() || TRAILING.contains(&c))
        .to_string()
}

/// 运行目标：创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub description: String,
    /// 可选的结构化约束
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }
}

/// 倒推链中的一个节点
#[derive(Debug, Clone, Serialize)]
pub struct ChainNode {
    /// 生成顺序（0 为目标本身）
    pub index: usize,
    pub description: String,
    /// 前置节点下标，按生成顺序
    pub prerequisites: Vec<usize>,
    pub depth: usize,
    /// 前置条件已全部由已知事实满足（或因环检测截断）
    pub grounded: bool,
    /// 由哪些已知事实满足
    pub satisfied_by: Vec<String>,
    /// 因重复祖先描述而截断
    pub cycle_cut: bool,
}

/// 倒推链：nodes[0] 为目标，其余按生成顺序排列
#[derive(Debug, Clone, Serialize)]
pub struct BackwardChain {
    pub goal: Goal,
    pub nodes: Vec<ChainNode>,
    /// 达到最大深度仍未落到初始事实
    pub ungrounded: bool,
}

impl BackwardChain {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 每个节点至多一个前置节点时为线性链
    pub fn is_linear(&self) -> bool {
        self.nodes.iter().all(|n| n.prerequisites.len() <= 1)
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.description.as_str()).collect()
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 等待前置步骤
    Pending,
    /// 前置步骤均已完成
    Ready,
    /// 正在执行
    Running,
    /// 已完成
    Done,
    /// 失败
    Failed,
    /// 被替换或不再需要
    Skipped,
}

/// 计划中的单个步骤
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: StepId,
    pub description: String,
    pub dependencies: Vec<StepId>,
    pub status: StepStatus,
    /// 执行时才解析
    pub tool: Option<String>,
    pub result: Option<String>,
    pub attempts: u32,
    /// 重规划拼接进来的步骤所替换的原步骤
    pub origin: Option<StepId>,
    /// 失败后由哪个子计划目标步骤替换
    pub replaced_by: Option<StepId>,
    /// 未落地计划的最早步骤，前置条件不保证成立
    pub best_effort: bool,
    /// 对应倒推链节点
    pub chain_index: usize,
}

impl Step {
    pub fn new(id: impl Into<StepId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            status: StepStatus::Pending,
            tool: None,
            result: None,
            attempts: 0,
            origin: None,
            replaced_by: None,
            best_effort: false,
            chain_index: 0,
        }
    }
}

/// 正向计划：steps 为拓扑序
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub goal: Goal,
    pub steps: Vec<Step>,
    pub goal_step: StepId,
    pub ungrounded: bool,
    pub trace: BackwardChain,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    pub fn goal_step(&self) -> Option<&Step> {
        self.step(&self.goal_step)
    }

    /// 前置步骤都已 done；被跳过的尽力步骤视为已满足
    pub fn deps_done(&self, step: &Step) -> bool {
        step.dependencies.iter().all(|d| match self.step(d) {
            Some(s) => s.status == StepStatus::Done || (s.status == StepStatus::Skipped && s.best_effort),
            None => false,
        })
    }

    pub fn done_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.status == StepStatus::Done)
    }

    /// 检查正向顺序：任何步骤都不早于其前置步骤
    pub fn validate_order(&self) -> Result<(), String> {
        for (pos, step) in self.steps.iter().enumerate() {
            for dep in &step.dependencies {
                match self.position(dep) {
                    Some(p) if p < pos => {}
                    Some(_) => return Err(format!("{} precedes its prerequisite {}", step.id, dep)),
                    None => return Err(format!("{} depends on unknown step {}", step.id, dep)),
                }
            }
        }
        Ok(())
    }

    /// 执行状态概览（已完成 / 当前 / 待执行）
    pub fn render_status(&self, current: Option<&str>) -> String {
        let mut s = format!("## Goal\n{}\n\n## Plan\n", self.goal.description);
        for (i, step) in self.steps.iter().enumerate() {
            let mark = match step.status {
                StepStatus::Done => "[x]",
                StepStatus::Failed => "[!]",
                StepStatus::Skipped => "[-]",
                StepStatus::Running => "[>]",
                StepStatus::Pending | StepStatus::Ready => "[ ]",
            };
            let here = if current == Some(step.id.as_str()) { " <- current" } else { "" };
            s.push_str(&format!("{} {}. {} ({}){}\n", mark, i + 1, step.description, step.id, here));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  File X   Exists. "), "file x exists");
        assert_eq!(normalize("Is it ready?!"), "is it ready");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("发布文件。"), "发布文件");
        assert_eq!(normalize("wait . . ."), "wait");
    }

    #[test]
    fn test_validate_order_rejects_forward_reference() {
        let mut a = Step::new("a", "A");
        a.dependencies.push("b".into());
        let b = Step::new("b", "B");
        let plan = Plan {
            goal: Goal::new("A"),
            steps: vec![a, b],
            goal_step: "a".into(),
            ungrounded: false,
            trace: BackwardChain {
                goal: Goal::new("A"),
                nodes: Vec::new(),
                ungrounded: false,
            },
        };
        assert!(plan.validate_order().is_err());
    }
}
