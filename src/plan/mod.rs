pub mod types;
pub mod graph;
pub mod reorder;

pub use types::*;
pub use graph::DependencyGraph;
pub use reorder::{Reorderer, STEP_PREFIX};
