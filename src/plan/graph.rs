//! 计划依赖图
//!
//! 使用邻接表和入度表实现 DAG 拓扑排序；同入度时按生成顺序（下标小者优先）出队

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// 依赖图：节点为倒推链下标
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 邻接表：前置节点 -> 依赖它的节点
    pub adjacency: Vec<Vec<usize>>,
    /// 入度表：节点 -> 前置节点数
    pub in_degree: Vec<usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由每个节点的前置列表构建；越界下标返回 Err
    pub fn from_prerequisites(prerequisites: &[Vec<usize>]) -> Result<Self, String> {
        let mut graph = Self::new();
        for _ in prerequisites {
            graph.add_node();
        }
        for (node, prereqs) in prerequisites.iter().enumerate() {
            for &p in prereqs {
                if p >= prerequisites.len() {
                    return Err(format!("node {} references missing prerequisite {}", node, p));
                }
                graph.add_edge(p, node);
            }
        }
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.in_degree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_degree.is_empty()
    }

    pub fn add_node(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.in_degree.push(0);
        self.in_degree.len() - 1
    }

    /// dependent 依赖 prerequisite
    pub fn add_edge(&mut self, prerequisite: usize, dependent: usize) {
        self.adjacency[prerequisite].push(dependent);
        self.in_degree[dependent] += 1;
    }

    /// 从 from 沿「被依赖」方向能否到达 to（即 to 传递依赖于 from）
    pub fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![from];
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            stack.extend(self.adjacency[n].iter().copied());
        }
        false
    }

    /// Kahn 拓扑排序；存在环时返回未能出队的节点
    pub fn topological_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degree = self.in_degree.clone();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &self.adjacency[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == self.len() {
            Ok(order)
        } else {
            let placed: HashSet<usize> = order.into_iter().collect();
            Err((0..self.len()).filter(|i| !placed.contains(i)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_construction() {
        // 0 依赖 1，1 依赖 2
        let graph = DependencyGraph::from_prerequisites(&[vec![1], vec![2], vec![]]).unwrap();
        assert_eq!(graph.in_degree, vec![1, 1, 0]);
        assert_eq!(graph.adjacency[2], vec![1]);
    }

    #[test]
    fn test_linear_order_is_reversed() {
        let graph = DependencyGraph::from_prerequisites(&[vec![1], vec![2], vec![]]).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_siblings_in_generation_order() {
        let graph = DependencyGraph::from_prerequisites(&[vec![1, 2], vec![], vec![]]).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_cycle_detected() {
        let graph = DependencyGraph::from_prerequisites(&[vec![1], vec![2], vec![1]]).unwrap();
        let stuck = graph.topological_order().unwrap_err();
        assert_eq!(stuck, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_prerequisite() {
        assert!(DependencyGraph::from_prerequisites(&[vec![3]]).is_err());
    }

    #[test]
    fn test_reaches() {
        let graph = DependencyGraph::from_prerequisites(&[vec![1], vec![2], vec![]]).unwrap();
        assert!(graph.reaches(2, 0));
        assert!(!graph.reaches(0, 2));
    }
}
