//! 计划重排：把倒推链（目标 → … → 初始）转为可正向执行的计划
//!
//! 线性链即反转；分支链按 DependencyGraph 拓扑排序，同层按生成顺序。
//! 结果含环或悬空依赖时返回 InvalidPlan。

use crate::core::AgentError;
use crate::plan::graph::DependencyGraph;
use crate::plan::types::*;

/// 默认步骤 ID 前缀
pub const STEP_PREFIX: &str = "step-";

#[derive(Debug, Clone, Default)]
pub struct Reorderer;

impl Reorderer {
    pub fn new() -> Self {
        Self
    }

    pub fn reorder(&self, chain: &BackwardChain) -> Result<Plan, AgentError> {
        self.reorder_with_prefix(chain, STEP_PREFIX)
    }

    /// 步骤 ID 为 `{prefix}{正向位置}`；重规划时用不同前缀避免冲突
    pub fn reorder_with_prefix(&self, chain: &BackwardChain, prefix: &str) -> Result<Plan, AgentError> {
        if chain.is_empty() {
            return Err(AgentError::InvalidPlan("backward chain is empty".to_string()));
        }

        let prerequisites: Vec<Vec<usize>> =
            chain.nodes.iter().map(|n| n.prerequisites.clone()).collect();
        let graph = DependencyGraph::from_prerequisites(&prerequisites).map_err(AgentError::InvalidPlan)?;
        let order = graph.topological_order().map_err(|stuck| {
            AgentError::InvalidPlan(format!("cycle among chain nodes {:?}", stuck))
        })?;

        // 链下标 -> 步骤 ID
        let mut ids = vec![String::new(); chain.len()];
        for (pos, &node) in order.iter().enumerate() {
            ids[node] = format!("{}{}", prefix, pos);
        }

        let steps: Vec<Step> = order
            .iter()
            .map(|&node| {
                let n = &chain.nodes[node];
                let mut step = Step::new(ids[node].clone(), n.description.clone());
                step.dependencies = n.prerequisites.iter().map(|&p| ids[p].clone()).collect();
                step.chain_index = n.index;
                step.best_effort = chain.ungrounded && !n.grounded && n.prerequisites.is_empty();
                step
            })
            .collect();

        let plan = Plan {
            goal: chain.goal.clone(),
            goal_step: ids[0].clone(),
            steps,
            ungrounded: chain.ungrounded,
            trace: chain.clone(),
        };
        plan.validate_order().map_err(AgentError::InvalidPlan)?;

        tracing::debug!(
            steps = plan.len(),
            ungrounded = plan.ungrounded,
            "forward plan ordered"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: usize, description: &str, prerequisites: Vec<usize>) -> ChainNode {
        ChainNode {
            index,
            description: description.to_string(),
            grounded: prerequisites.is_empty(),
            prerequisites,
            depth: 0,
            satisfied_by: Vec::new(),
            cycle_cut: false,
        }
    }

    fn chain(nodes: Vec<ChainNode>) -> BackwardChain {
        BackwardChain {
            goal: Goal::new(nodes[0].description.clone()),
            nodes,
            ungrounded: false,
        }
    }

    #[test]
    fn test_linear_chain_reversed() {
        let c = chain(vec![
            node(0, "goal", vec![1]),
            node(1, "q2", vec![2]),
            node(2, "q1", vec![3]),
            node(3, "q0", vec![]),
        ]);
        let plan = Reorderer::new().reorder(&c).unwrap();
        let descriptions: Vec<&str> = plan.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["q0", "q1", "q2", "goal"]);
        assert_eq!(plan.goal_step, "step-3");
        assert_eq!(plan.steps[1].dependencies, vec!["step-0".to_string()]);
        assert!(plan.validate_order().is_ok());
    }

    #[test]
    fn test_single_node_plan() {
        let plan = Reorderer::new().reorder(&chain(vec![node(0, "publish file X", vec![])])).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.goal_step, "step-0");
    }

    #[test]
    fn test_branching_generation_order() {
        let c = chain(vec![
            node(0, "G", vec![1, 2]),
            node(1, "P1", vec![]),
            node(2, "P2", vec![]),
        ]);
        let plan = Reorderer::new().reorder(&c).unwrap();
        let descriptions: Vec<&str> = plan.steps.iter().map(|s| s.description.as_str()).collect();
        assert_eq!(descriptions, vec!["P1", "P2", "G"]);
        assert_eq!(plan.steps[2].dependencies, vec!["step-0".to_string(), "step-1".to_string()]);
    }

    #[test]
    fn test_cycle_rejected() {
        let c = chain(vec![node(0, "G", vec![1]), node(1, "A", vec![2]), node(2, "B", vec![1])]);
        let err = Reorderer::new().reorder(&c).unwrap_err();
        assert!(matches!(err, AgentError::InvalidPlan(_)));
    }

    #[test]
    fn test_dangling_prerequisite_rejected() {
        let c = chain(vec![node(0, "G", vec![5])]);
        assert!(matches!(Reorderer::new().reorder(&c), Err(AgentError::InvalidPlan(_))));
    }

    #[test]
    fn test_ungrounded_marks_leaves_best_effort() {
        let mut leaf = node(1, "Q0", vec![]);
        leaf.grounded = false;
        let mut c = chain(vec![node(0, "G", vec![1]), leaf]);
        c.ungrounded = true;
        let plan = Reorderer::new().reorder(&c).unwrap();
        assert!(plan.steps[0].best_effort);
        assert!(!plan.steps[1].best_effort);
    }

    #[test]
    fn test_prefix() {
        let plan = Reorderer::new()
            .reorder_with_prefix(&chain(vec![node(0, "G", vec![])]), "step-2.r")
            .unwrap();
        assert_eq!(plan.steps[0].id, "step-2.r0");
    }
}
