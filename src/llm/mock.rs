//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序弹出预设的 Completion；脚本耗尽后返回 fallback
//! （未设置 fallback 时回显最后一条 User 消息），便于本地跑通完整编排流程。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Completion, LlmClient, TokenUsage, ToolCallRequest, ToolSpec};
use crate::memory::{Message, Role};

type ScriptEntry = Result<Completion, String>;

/// Mock 客户端：先按脚本出队，再退回 fallback / 回显
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<ScriptEntry>>,
    fallback: Option<ScriptEntry>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次调用按给定顺序返回
    pub fn with_script(entries: Vec<ScriptEntry>) -> Self {
        Self {
            script: Mutex::new(entries.into()),
            fallback: None,
        }
    }

    /// 脚本耗尽后固定返回该 Completion（用于「模型永远请求工具」类测试）
    pub fn with_fallback(mut self, completion: Completion) -> Self {
        self.fallback = Some(Ok(completion));
        self
    }

    /// 脚本耗尽后固定返回错误（用于「所有调用都失败」类测试）
    pub fn with_fallback_error(mut self, error: impl Into<String>) -> Self {
        self.fallback = Some(Err(error.into()));
        self
    }

    /// 追加一条纯文本回复
    pub fn push_text(&self, content: impl Into<String>) {
        self.push(Ok(Completion::text(content).with_usage(TokenUsage::new(1, 1, 2))));
    }

    /// 追加一条 tool call 回复
    pub fn push_tool_call(&self, name: impl Into<String>, arguments: Value) {
        let call = ToolCallRequest::new(uuid::Uuid::new_v4().to_string(), name, arguments);
        self.push(Ok(Completion {
            content: String::new(),
            tool_calls: vec![call],
            usage: TokenUsage::new(1, 1, 2),
        }));
    }

    /// 追加一条调用失败
    pub fn push_error(&self, error: impl Into<String>) {
        self.push(Err(error.into()));
    }

    pub fn push(&self, entry: ScriptEntry) {
        self.script
            .lock()
            .expect("mock script lock poisoned")
            .push_back(entry);
    }

    fn next(&self, messages: &[Message]) -> ScriptEntry {
        if let Some(entry) = self
            .script
            .lock()
            .expect("mock script lock poisoned")
            .pop_front()
        {
            return entry;
        }
        if let Some(fallback) = &self.fallback {
            return fallback.clone();
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Completion::text(format!("Echo from Mock: {last_user}")))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        self.next(messages)
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        _tools: &[ToolSpec],
    ) -> Result<Completion, String> {
        self.next(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_order_then_fallback() {
        let mock = MockLlmClient::new().with_fallback(Completion::text("done"));
        mock.push_text("first");
        mock.push_text("second");

        let msgs = vec![Message::user("hi")];
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "first");
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "second");
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "done");
        assert_eq!(mock.complete(&msgs).await.unwrap().content, "done");
    }

    #[tokio::test]
    async fn test_echo_without_script() {
        let mock = MockLlmClient::new();
        let msgs = vec![Message::user("hola")];
        let out = mock.complete(&msgs).await.unwrap();
        assert!(out.content.contains("hola"));
    }
}
