//! Backplan - Working Backwards 规划与执行引擎
//!
//! 模块划分：
//! - **backward**: Reasoner（step-back 能力）与倒推规划器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、运行状态、监管与调度、run 编排
//! - **engine**: Forward Executor、监控事件、执行记录
//! - **llm**: LLM 客户端抽象与 Mock
//! - **memory**: 单次运行的工作记忆
//! - **plan**: 计划类型、依赖图、重排
//! - **tools**: 工具契约、注册表、执行器与内置工具

pub mod backward;
pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod tools;

pub use crate::core::{AgentError, RunConfig, RunManager, RunState, RunStatus};
pub use crate::engine::RunOutcome;
pub use crate::plan::Goal;
