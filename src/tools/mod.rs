//! 工具层：注册表（schema 提取）、调用校验、批量执行器

pub mod echo;
pub mod executor;
pub mod registry;
pub mod validator;

pub use echo::EchoTool;
pub use executor::{NoopObserver, ToolCallResult, ToolCallStatus, ToolExecutor, ToolObserver};
pub use registry::{extract_descriptor, Tool, ToolDescriptor, ToolRegistry};
