//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（纯文本）、
//! complete_with_tools（绑定工具，模型可返回文本或原生 tool call）。
//! 返回的 Completion 同时携带本次调用的 token 用量。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::TokenUsage;
use crate::memory::Message;

/// 暴露给模型的工具签名（name / description / JSON Schema 参数）
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 模型产生的一次工具调用请求；id 在同一规划步内唯一（模型未提供时由客户端生成）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 单次 LLM 调用的结果：文本内容、零或多个 tool call、token 用量
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// LLM 客户端 trait：纯文本完成与带工具完成
///
/// 错误以 String 传递，调用方统一转 AgentError。
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 纯文本完成（不绑定工具）
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String>;

    /// 绑定工具的完成：模型可在文本之外返回零或多个 tool call。
    /// 默认实现忽略工具（等价于纯文本完成），无原生 tool call 能力的后端可沿用。
    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<Completion, String> {
        self.complete(messages).await
    }
}
