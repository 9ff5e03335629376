//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 支持原生 tool calling：ToolSpec 转为 function 声明，响应中的 tool_calls
//! 解析为 ToolCallRequest（参数 JSON 解析失败时降级为空对象，id 缺失时生成 UUID）。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
    CreateChatCompletionRequestArgs, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{Completion, LlmClient, TokenUsage, ToolCallRequest, ToolSpec};
use crate::memory::{Message, Role};

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }

    /// Message 转 API 格式。Tool 角色以 "Tool result: ..." 的 user 消息传递，
    /// 避免对端点的 tool message 支持程度做假设。
    fn to_openai_messages(&self, messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut out = Vec::with_capacity(messages.len());
        for m in messages {
            let converted = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
                Role::Tool => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(format!("Tool result: {}", m.content))
                        .build()
                        .map_err(|e| e.to_string())?,
                ),
            };
            out.push(converted);
        }
        Ok(out)
    }

    fn to_openai_tools(&self, tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTool>, String> {
        tools
            .iter()
            .map(|spec| {
                let function = FunctionObjectArgs::default()
                    .name(spec.name.clone())
                    .description(spec.description.clone())
                    .parameters(spec.parameters.clone())
                    .build()
                    .map_err(|e| e.to_string())?;
                ChatCompletionToolArgs::default()
                    .r#type(ChatCompletionToolType::Function)
                    .function(function)
                    .build()
                    .map_err(|e| e.to_string())
            })
            .collect()
    }

    async fn invoke(
        &self,
        messages: &[Message],
        tools: Option<Vec<ChatCompletionTool>>,
    ) -> Result<Completion, String> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?);
        if let Some(tools) = tools {
            if !tools.is_empty() {
                builder.tools(tools);
            }
        }
        let request = builder.build().map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        let usage = response
            .usage
            .as_ref()
            .map(|u| {
                TokenUsage::new(
                    u.prompt_tokens as u64,
                    u.completion_tokens as u64,
                    u.total_tokens as u64,
                )
            })
            .unwrap_or_default();

        let message = response
            .choices
            .first()
            .map(|c| c.message.clone())
            .ok_or_else(|| "empty choices in completion response".to_string())?;

        let content = message.content.clone().unwrap_or_default();

        let mut tool_calls = Vec::new();
        if let Some(calls) = &message.tool_calls {
            for call in calls {
                // 参数是 JSON 字符串；解析失败时降级为空对象，交给校验层拒绝
                let arguments: Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(Default::default()));
                let id = if call.id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    call.id.clone()
                };
                tool_calls.push(ToolCallRequest::new(id, call.function.name.clone(), arguments));
            }
        }

        Ok(Completion {
            content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
        self.invoke(messages, None).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Completion, String> {
        let tools = self.to_openai_tools(tools)?;
        self.invoke(messages, Some(tools)).await
    }
}
