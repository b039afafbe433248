//! 工具层：Tool 契约、注册表与关键词解析、带超时/取消的执行器，以及内置工具

pub mod code_exec;
pub mod executor;
pub mod reasoning;
pub mod registry;
pub mod schema;
pub mod search;
pub mod shell;
pub mod terminate;

pub use code_exec::CodeExecTool;
pub use executor::{default_tool_timeouts, ToolExecutor, DEFAULT_TOOL_TIMEOUT_SECS};
pub use reasoning::{ReasoningTool, REASONING_TOOL};
pub use registry::{SuccessPredicate, Tool, ToolDescriptor, ToolRegistry};
pub use schema::{extract_payload, tool_input_schema_json, ToolInput};
pub use search::{WebSearchTool, DEFAULT_SEARCH_ENDPOINT};
pub use shell::ShellTool;
pub use terminate::TerminateTool;
