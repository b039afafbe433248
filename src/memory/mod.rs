//! 记忆层：单次运行的工作记忆（目标、事实、步骤输出）

pub mod working;

pub use working::{Fact, FactSource, MemorySnapshot, WorkingMemory};
