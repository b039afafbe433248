//! 倒推规划层：Reasoner（step-back 能力）与 BackwardPlanner

pub mod planner;
pub mod reasoner;

pub use planner::BackwardPlanner;
pub use reasoner::{parse_prerequisites, LlmReasoner, Reasoner, ScriptedReasoner};
