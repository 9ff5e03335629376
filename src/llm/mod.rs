//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、token 用量

pub mod mock;
pub mod openai;
pub mod traits;
pub mod usage;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use traits::{Completion, LlmClient, ToolCallRequest, ToolSpec};
pub use usage::TokenUsage;
