//! Bot 门面集成测试：路由、工具执行、校验拒绝回流、降级兜底

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use hive::agent::{Bot, BotSettings};
    use hive::core::TurnContext;
    use hive::llm::{Completion, LlmClient, MockLlmClient, TokenUsage, ToolCallRequest, ToolSpec};
    use hive::memory::Message;
    use hive::tools::{Tool, ToolCallStatus};
    use hive::workflow::FALLBACK_RESPONSE;

    // --- 测试工具 ---

    struct EmailTool;

    #[async_trait]
    impl Tool for EmailTool {
        fn name(&self) -> &str {
            "send_email"
        }
        fn description(&self) -> &str {
            "Sends an email"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "to_email": {"type": "string"},
                    "subject": {"type": "string"},
                    "message": {"type": "string"}
                },
                "required": ["to_email", "subject", "message"]
            })
        }
        async fn execute(&self, args: Value) -> Result<String, String> {
            let to = args.get("to_email").and_then(Value::as_str).unwrap_or("?");
            Ok(format!("Email sent to {to}"))
        }
    }

    struct ContactTool;

    #[async_trait]
    impl Tool for ContactTool {
        fn name(&self) -> &str {
            "create_or_update_contact"
        }
        fn description(&self) -> &str {
            "Saves contact info"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"}
                },
                "required": ["name", "email"]
            })
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok("Contact saved".to_string())
        }
    }

    /// 包装 Mock 并记录每次调用的完整消息，便于断言观察块确实回流到了规划输入
    struct RecordingLlm {
        inner: MockLlmClient,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingLlm {
        fn new(inner: MockLlmClient) -> Self {
            Self {
                inner,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, messages: &[Message]) {
            let joined = messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n---\n");
            self.prompts.lock().unwrap().push(joined);
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn complete(&self, messages: &[Message]) -> Result<Completion, String> {
            self.record(messages);
            self.inner.complete(messages).await
        }

        async fn complete_with_tools(
            &self,
            messages: &[Message],
            tools: &[ToolSpec],
        ) -> Result<Completion, String> {
            self.record(messages);
            self.inner.complete_with_tools(messages, tools).await
        }
    }

    fn tool_call_completion(name: &str, args: Value) -> Completion {
        Completion {
            content: String::new(),
            tool_calls: vec![ToolCallRequest::new(
                uuid::Uuid::new_v4().to_string(),
                name,
                args,
            )],
            usage: TokenUsage::new(5, 3, 8),
        }
    }

    fn context() -> TurnContext {
        TurnContext {
            function_purpose: "Help the user manage tasks.".to_string(),
            personality_tone: "Friendly".to_string(),
            limitations: "Do not invent information.".to_string(),
            dynamic_info: "User: Erley. Today is 2025-11-14".to_string(),
        }
    }

    // --- 场景 A：纯寒暄，只有 response 阶段，规划器从不触发 ---

    #[tokio::test]
    async fn test_greeting_goes_straight_to_response() -> anyhow::Result<()> {
        let mock = MockLlmClient::new();
        mock.push_text(r#"{"steps": ["response"], "reasoning": "User is greeting"}"#);
        mock.push_text("¡Hola! ¿En qué puedo ayudarte?");
        let llm = Arc::new(RecordingLlm::new(mock));

        let bot = Bot::new(
            llm.clone(),
            vec![Arc::new(EmailTool), Arc::new(ContactTool)],
            context(),
            BotSettings::default(),
        )?;

        let response = bot.get_response("Hola", Vec::new(), Vec::new()).await;

        assert_eq!(response.content, "¡Hola! ¿En qué puedo ayudarte?");
        assert!(response.tools_executed.is_empty());
        // 只有 Architect 与 Synthesizer 两次模型调用，规划器没有参与
        assert_eq!(llm.prompts().len(), 2);
        assert!(response
            .logs
            .iter()
            .any(|l| l.contains("Architect Plan: [response]")));
        Ok(())
    }

    // --- 场景 B：动作请求，恰好一次工具调用，回复反映工具输出 ---

    #[tokio::test]
    async fn test_action_executes_matching_tool_once() -> anyhow::Result<()> {
        let mock = MockLlmClient::new();
        mock.push_text(r#"{"steps": ["task", "response"], "reasoning": "send an email"}"#);
        mock.push(Ok(tool_call_completion(
            "send_email",
            json!({
                "to_email": "erley@gmail.com",
                "subject": "Hola",
                "message": "Hola Erley"
            }),
        )));
        mock.push_text("The email has been sent.");
        mock.push_text("Listo, el correo fue enviado a erley@gmail.com.");
        let llm = Arc::new(RecordingLlm::new(mock));

        let bot = Bot::new(
            llm,
            vec![Arc::new(EmailTool), Arc::new(ContactTool)],
            context(),
            BotSettings::default(),
        )?;

        let response = bot
            .get_response(
                "Envia un email a erley@gmail.com con el asunto Hola",
                Vec::new(),
                Vec::new(),
            )
            .await;

        assert_eq!(response.tools_executed.len(), 1);
        let result = &response.tools_executed[0];
        assert_eq!(result.tool_name, "send_email");
        assert_eq!(result.status, ToolCallStatus::Success);
        assert_eq!(result.output, "Email sent to erley@gmail.com");
        assert!(response.content.contains("erley@gmail.com"));
        Ok(())
    }

    // --- 场景 C：缺参调用被拒绝，不执行，拒绝观察回流下一轮规划 ---

    #[tokio::test]
    async fn test_rejected_call_feeds_back_missing_params() -> anyhow::Result<()> {
        let mock = MockLlmClient::new();
        mock.push_text(r#"{"steps": ["task", "response"], "reasoning": "save contact"}"#);
        // 第一次规划漏掉 email（空串），第二次补全
        mock.push(Ok(tool_call_completion(
            "create_or_update_contact",
            json!({"name": "Erley", "email": ""}),
        )));
        mock.push(Ok(tool_call_completion(
            "create_or_update_contact",
            json!({"name": "Erley", "email": "erley@gmail.com"}),
        )));
        mock.push_text("Contact stored.");
        mock.push_text("Guardé a Erley como contacto.");
        let llm = Arc::new(RecordingLlm::new(mock));

        let bot = Bot::new(
            llm.clone(),
            vec![Arc::new(EmailTool), Arc::new(ContactTool)],
            context(),
            BotSettings::default(),
        )?;

        let response = bot
            .get_response("Guarda a Erley, su correo te lo paso luego", Vec::new(), Vec::new())
            .await;

        assert_eq!(response.tools_executed.len(), 2);
        let rejected = &response.tools_executed[0];
        assert_eq!(rejected.status, ToolCallStatus::Rejected);
        assert!(rejected.output.contains("email"));

        let succeeded = &response.tools_executed[1];
        assert_eq!(succeeded.status, ToolCallStatus::Success);

        // 第二次规划的输入必须带着缺参观察
        let prompts = llm.prompts();
        assert!(prompts
            .iter()
            .any(|p| p.contains("missing required parameters: email")));
        Ok(())
    }

    // --- 门面结构不变量：所有内部阶段都失败也返回完整结构 ---

    #[tokio::test]
    async fn test_facade_shape_survives_total_failure() -> anyhow::Result<()> {
        let llm = Arc::new(MockLlmClient::new().with_fallback_error("provider down"));
        let bot = Bot::new(
            llm,
            vec![Arc::new(EmailTool)],
            context(),
            BotSettings::default(),
        )?;

        let response = bot.get_response("Hola", Vec::new(), Vec::new()).await;

        assert_eq!(response.content, FALLBACK_RESPONSE);
        assert!(response.tools_executed.is_empty());
        assert_eq!(response.token_usage, TokenUsage::default());
        assert!(response
            .logs
            .iter()
            .any(|l| l.contains("Fallback to response only")));
        Ok(())
    }

    // --- Token 用量跨所有模型调用逐字段求和 ---

    #[tokio::test]
    async fn test_token_usage_accumulates_across_invocations() -> anyhow::Result<()> {
        let mock = MockLlmClient::new();
        mock.push(Ok(Completion::text(
            r#"{"steps": ["task", "response"], "reasoning": "action"}"#,
        )
        .with_usage(TokenUsage::new(10, 2, 12))));
        mock.push(Ok(tool_call_completion(
            "send_email",
            json!({"to_email": "a@b.c", "subject": "s", "message": "m"}),
        )));
        mock.push(Ok(Completion::text("done").with_usage(TokenUsage::new(7, 1, 8))));
        mock.push(Ok(Completion::text("All sent!").with_usage(TokenUsage::new(20, 5, 25))));
        let llm = Arc::new(RecordingLlm::new(mock));

        let bot = Bot::new(
            llm,
            vec![Arc::new(EmailTool)],
            context(),
            BotSettings::default(),
        )?;

        let response = bot
            .get_response("send the email", Vec::new(), Vec::new())
            .await;

        // 10+5+7+20 / 2+3+1+5 / 12+8+8+25
        assert_eq!(response.token_usage, TokenUsage::new(42, 11, 53));
        Ok(())
    }

    // --- 历史回传：上一轮上下文参与本轮提示词 ---

    #[tokio::test]
    async fn test_history_is_replayed_into_prompt() -> anyhow::Result<()> {
        let mock = MockLlmClient::new();
        mock.push_text(r#"{"steps": ["response"], "reasoning": "chitchat"}"#);
        mock.push_text("Your name is Erley.");
        let llm = Arc::new(RecordingLlm::new(mock));

        let bot = Bot::new(
            llm.clone(),
            vec![Arc::new(EmailTool)],
            context(),
            BotSettings::default(),
        )?;

        let history = vec![
            Message::user("Mi nombre es Erley"),
            Message::assistant("Encantado, Erley."),
        ];
        let response = bot
            .get_response("¿Cómo me llamo?", history, Vec::new())
            .await;

        assert_eq!(response.content, "Your name is Erley.");
        // 上一轮消息必须出现在本轮某次模型调用的提示词里
        assert!(llm
            .prompts()
            .iter()
            .any(|p| p.contains("Mi nombre es Erley")));
        Ok(())
    }
}
