//! Backward Planner：从目标倒推前置条件
//!
//! 从目标开始反复询问 Reasoner「尝试它之前必须成立什么」，已知事实满足的前置条件不再展开，
//! 其余作为新节点深度优先继续倒推，直到全部落到已知事实或达到 max_depth。
//! - 达到最大深度：链标记 ungrounded
//! - 前置条件重复了（传递）依赖当前节点的节点：建一个截断节点并视为 grounded，保证终止
//! - 前置条件重复了非祖先节点：复用该节点（DAG 共享）

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backward::Reasoner;
use crate::core::AgentError;
use crate::plan::{normalize, BackwardChain, ChainNode, DependencyGraph, Goal};

/// 单条链的节点上限，防止分支爆炸
const MAX_CHAIN_NODES: usize = 128;

pub struct BackwardPlanner {
    reasoner: Arc<dyn Reasoner>,
    max_depth: usize,
}

impl BackwardPlanner {
    pub fn new(reasoner: Arc<dyn Reasoner>, max_depth: usize) -> Self {
        Self { reasoner, max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub async fn decompose(&self, goal: &Goal, initial_facts: &[String]) -> Result<BackwardChain, AgentError> {
        if normalize(&goal.description).is_empty() {
            return Err(AgentError::PlanningFailure("goal description is empty".to_string()));
        }

        let known: HashSet<String> = initial_facts.iter().map(|f| normalize(f)).collect();
        let mut nodes = vec![new_node(0, &goal.description, 0)];
        let mut graph = DependencyGraph::new();
        graph.add_node();
        let mut by_key: HashMap<String, usize> = HashMap::new();
        by_key.insert(normalize(&goal.description), 0);

        let mut ungrounded = false;
        let mut stack = vec![0usize];

        while let Some(current) = stack.pop() {
            let depth = nodes[current].depth;
            if depth >= self.max_depth || nodes.len() >= MAX_CHAIN_NODES {
                tracing::debug!(node = current, depth, "decomposition cut at depth limit");
                ungrounded = true;
                continue;
            }

            let description = nodes[current].description.clone();
            let prerequisites = self
                .reasoner
                .step_back(&description, initial_facts)
                .await
                .map_err(|e| AgentError::PlanningFailure(format!("step-back failed for '{}': {}", description, e)))?;

            let mut children = Vec::new();
            for prerequisite in prerequisites {
                let key = normalize(&prerequisite);
                if key.is_empty() {
                    continue;
                }
                if known.contains(&key) {
                    nodes[current].satisfied_by.push(prerequisite);
                    continue;
                }
                match by_key.get(&key).copied() {
                    Some(existing) if existing == current || graph.reaches(current, existing) => {
                        let idx = nodes.len();
                        let mut cut = new_node(idx, &prerequisite, depth + 1);
                        cut.grounded = true;
                        cut.cycle_cut = true;
                        nodes.push(cut);
                        graph.add_node();
                        graph.add_edge(idx, current);
                        nodes[current].prerequisites.push(idx);
                        tracing::debug!(node = idx, repeats = existing, "cycle cut in backward chain");
                    }
                    Some(existing) => {
                        if !nodes[current].prerequisites.contains(&existing) {
                            graph.add_edge(existing, current);
                            nodes[current].prerequisites.push(existing);
                        }
                    }
                    None => {
                        let idx = nodes.len();
                        nodes.push(new_node(idx, &prerequisite, depth + 1));
                        graph.add_node();
                        graph.add_edge(idx, current);
                        by_key.insert(key, idx);
                        nodes[current].prerequisites.push(idx);
                        children.push(idx);
                    }
                }
            }

            if nodes[current].prerequisites.is_empty() {
                nodes[current].grounded = true;
            }
            // 逆序入栈，使先生成的兄弟节点先展开
            stack.extend(children.into_iter().rev());
        }

        tracing::info!(
            goal = %goal.description,
            nodes = nodes.len(),
            ungrounded,
            "backward chain built"
        );

        Ok(BackwardChain {
            goal: goal.clone(),
            nodes,
            ungrounded,
        })
    }
}

fn new_node(index: usize, description: &str, depth: usize) -> ChainNode {
    ChainNode {
        index,
        description: description.to_string(),
        prerequisites: Vec::new(),
        depth,
        grounded: false,
        satisfied_by: Vec::new(),
        cycle_cut: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::ScriptedReasoner;
    use async_trait::async_trait;

    fn planner(reasoner: ScriptedReasoner, depth: usize) -> BackwardPlanner {
        BackwardPlanner::new(Arc::new(reasoner), depth)
    }

    #[tokio::test]
    async fn test_grounds_in_initial_fact() {
        let p = planner(ScriptedReasoner::new().with("publish file X", &["file X exists"]), 10);
        let chain = p
            .decompose(&Goal::new("publish file X"), &["file X exists".to_string()])
            .await
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert!(chain.nodes[0].grounded);
        assert!(!chain.ungrounded);
        assert_eq!(chain.nodes[0].satisfied_by, vec!["file X exists"]);
    }

    #[tokio::test]
    async fn test_linear_chain_generation_order() {
        let reasoner = ScriptedReasoner::new()
            .with("ship release", &["tests pass"])
            .with("tests pass", &["code compiles"])
            .with("code compiles", &["repo cloned"]);
        let chain = planner(reasoner, 10)
            .decompose(&Goal::new("ship release"), &["repo cloned".to_string()])
            .await
            .unwrap();
        assert_eq!(chain.descriptions(), vec!["ship release", "tests pass", "code compiles"]);
        assert!(chain.is_linear());
        assert!(chain.nodes[2].grounded);
    }

    #[tokio::test]
    async fn test_depth_limit_flags_ungrounded() {
        let reasoner = ScriptedReasoner::new()
            .with("g", &["a"])
            .with("a", &["b"])
            .with("b", &["c"]);
        let chain = planner(reasoner, 2).decompose(&Goal::new("g"), &[]).await.unwrap();
        assert_eq!(chain.descriptions(), vec!["g", "a", "b"]);
        assert!(chain.ungrounded);
        assert!(!chain.nodes[2].grounded);
    }

    #[tokio::test]
    async fn test_cycle_to_ancestor_is_cut() {
        let reasoner = ScriptedReasoner::new().with("g", &["a"]).with("a", &["G."]);
        let chain = planner(reasoner, 10).decompose(&Goal::new("g"), &[]).await.unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.nodes[2].cycle_cut);
        assert!(chain.nodes[2].grounded);
        assert!(!chain.ungrounded);
    }

    #[tokio::test]
    async fn test_shared_prerequisite_reused() {
        let reasoner = ScriptedReasoner::new()
            .with("g", &["p1", "p2"])
            .with("p1", &["base"])
            .with("p2", &["base"]);
        let chain = planner(reasoner, 10).decompose(&Goal::new("g"), &[]).await.unwrap();
        assert_eq!(chain.descriptions(), vec!["g", "p1", "p2", "base"]);
        assert_eq!(chain.nodes[1].prerequisites, vec![3]);
        assert_eq!(chain.nodes[2].prerequisites, vec![3]);
    }

    #[tokio::test]
    async fn test_branching_siblings_explored_depth_first() {
        let reasoner = ScriptedReasoner::new()
            .with("g", &["a", "b"])
            .with("a", &["a1"]);
        let chain = planner(reasoner, 10).decompose(&Goal::new("g"), &[]).await.unwrap();
        assert_eq!(chain.descriptions(), vec!["g", "a", "b", "a1"]);
        assert_eq!(chain.nodes[0].prerequisites, vec![1, 2]);
    }

    struct FailingReasoner;

    #[async_trait]
    impl Reasoner for FailingReasoner {
        async fn step_back(&self, _d: &str, _f: &[String]) -> Result<Vec<String>, String> {
            Err("capability offline".to_string())
        }
    }

    #[tokio::test]
    async fn test_reasoner_failure_is_planning_failure() {
        let p = BackwardPlanner::new(Arc::new(FailingReasoner), 10);
        let err = p.decompose(&Goal::new("g"), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::PlanningFailure(msg) if msg.contains("capability offline")));
    }

    #[tokio::test]
    async fn test_empty_goal_rejected() {
        let p = planner(ScriptedReasoner::new(), 10);
        assert!(matches!(
            p.decompose(&Goal::new("  "), &[]).await,
            Err(AgentError::PlanningFailure(_))
        ));
    }
}
