//! 核心层：错误类型与单轮执行状态

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{TurnContext, TurnState};
