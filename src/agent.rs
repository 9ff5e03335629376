//! Bot 门面
//!
//! 公共入口：get_response(user_input, history, logs) 串起 Architect 路由、
//! 工作流引擎与合成器，返回 {content, logs, tools_executed, token_usage}。
//! 任何内部故障都只会降级 content，返回结构恒定。
//! 每轮按当轮计划重新组装规划器与引擎（计划是轮粒度的，不跨轮复用）；
//! 注册表与工具实例只读共享，不同会话的轮可并发执行。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::{AgentError, TurnContext, TurnState};
use crate::llm::{LlmClient, TokenUsage};
use crate::memory::{DocumentRetriever, Message, Role};
use crate::react::events::{emit, AgentEvent};
use crate::react::Planner;
use crate::tools::{Tool, ToolCallResult, ToolExecutor, ToolObserver, ToolRegistry};
use crate::workflow::{
    partition_tools, Architect, ResponseSynthesizer, Stage, WorkflowEngine, FALLBACK_RESPONSE,
};

/// 检索注入的片段数
const RETRIEVER_TOP_K: usize = 4;

/// 门面运行参数
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub max_iterations: usize,
    pub history_window_turns: usize,
    pub max_log_lines: usize,
    pub tool_timeout_secs: u64,
    pub tool_max_retries: u32,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BotSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_iterations: cfg.bot.max_iterations,
            history_window_turns: cfg.bot.history_window_turns,
            max_log_lines: cfg.bot.max_log_lines,
            tool_timeout_secs: cfg.tools.timeout_secs,
            tool_max_retries: cfg.tools.max_retries,
        }
    }
}

/// 单轮响应：结构恒定，内部失败时 content 为降级文案
#[derive(Debug)]
pub struct BotResponse {
    pub content: String,
    pub logs: Vec<String>,
    pub tools_executed: Vec<ToolCallResult>,
    pub token_usage: TokenUsage,
}

/// 对话编排门面；一个实例可服务多个相互独立的会话，
/// 同一会话的轮序由调用方保证（历史追加不可交换）
pub struct Bot {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    ctx: TurnContext,
    settings: BotSettings,
    available_stages: Vec<Stage>,
    retriever: Option<Arc<dyn DocumentRetriever>>,
    event_tx: Option<UnboundedSender<AgentEvent>>,
    tool_observer: Option<Arc<dyn ToolObserver>>,
}

impl Bot {
    /// 构建门面：注册全部工具（同名即配置错误）并按启发式预归类阶段
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tools: Vec<Arc<dyn Tool>>,
        ctx: TurnContext,
        settings: BotSettings,
    ) -> Result<Self, AgentError> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_arc(tool)?;
        }
        let partitions = partition_tools(&registry);
        let available_stages: Vec<Stage> = [Stage::Policy, Stage::Research, Stage::Task]
            .into_iter()
            .filter(|s| partitions.get(s).map(|t| !t.is_empty()).unwrap_or(false))
            .collect();

        Ok(Self {
            llm,
            registry: Arc::new(registry),
            ctx,
            settings,
            available_stages,
            retriever: None,
            event_tx: None,
            tool_observer: None,
        })
    }

    /// 配置文档检索端口；命中片段注入规划提示词
    pub fn with_retriever(mut self, retriever: Arc<dyn DocumentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// 配置过程事件通道（发送失败静默忽略）
    pub fn with_event_tx(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 配置工具生命周期观察者
    pub fn with_tool_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.tool_observer = Some(observer);
        self
    }

    /// 更新运行期事实（当前日期、用户身份、策略接受状态等）
    pub fn update_dynamic_info(&mut self, dynamic_info: impl Into<String>) {
        self.ctx.dynamic_info = dynamic_info.into();
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 处理一轮用户输入
    ///
    /// history 与 logs 由调用方持有并在下一轮原样传回；本方法不修改调用方
    /// 状态，新历史用 append_exchange 追加。
    pub async fn get_response(
        &self,
        user_input: &str,
        history: Vec<Message>,
        logs: Vec<String>,
    ) -> BotResponse {
        let mut state = TurnState::new(history, logs, self.settings.max_log_lines);
        let turn_start = state.messages.len();
        state.push_message(Message::user(user_input));

        let file_context = self.fetch_file_context(user_input, &mut state).await;
        let file_context = if file_context.is_empty() {
            None
        } else {
            Some(file_context.as_str())
        };

        // 路由与引擎按轮组装：计划只对本轮有效
        let architect = Architect::new(self.llm.clone());
        let plan = architect
            .route(&self.ctx, user_input, &self.available_stages, &mut state)
            .await;

        let engine = self.build_engine();
        engine
            .run(&plan, &self.ctx, &mut state, user_input, file_context)
            .await;

        let content = state
            .final_response()
            .unwrap_or(FALLBACK_RESPONSE)
            .to_string();
        state.push_message(Message::assistant(content.clone()));

        for line in render_turn_log(&state.messages[turn_start..]) {
            state.push_log(line);
        }

        let token_usage = state.token_usage();
        emit(
            &self.event_tx,
            AgentEvent::TokenUsage {
                prompt_tokens: token_usage.prompt_tokens,
                completion_tokens: token_usage.completion_tokens,
                total_tokens: token_usage.total_tokens,
            },
        );

        BotResponse {
            content,
            logs: state.take_logs(),
            tools_executed: std::mem::take(&mut state.tools_executed),
            token_usage,
        }
    }

    fn build_engine(&self) -> WorkflowEngine {
        let mut planner = Planner::new(self.llm.clone(), self.settings.max_iterations)
            .with_history_window(self.settings.history_window_turns);
        if let Some(tx) = &self.event_tx {
            planner = planner.with_event_tx(tx.clone());
        }

        let mut executor = ToolExecutor::new(
            self.registry.clone(),
            self.settings.tool_timeout_secs,
            self.settings.tool_max_retries,
        );
        if let Some(observer) = &self.tool_observer {
            executor = executor.with_observer(observer.clone());
        }

        let mut engine = WorkflowEngine::new(
            planner,
            executor,
            ResponseSynthesizer::new(self.llm.clone()),
            partition_tools(&self.registry),
        );
        if let Some(tx) = &self.event_tx {
            engine = engine.with_event_tx(tx.clone());
        }
        engine
    }

    /// 相似检索命中的片段；检索失败只记日志，不影响本轮
    async fn fetch_file_context(&self, query: &str, state: &mut TurnState) -> String {
        let retriever = match &self.retriever {
            Some(r) => r,
            None => return String::new(),
        };
        match retriever.similarity_search(query, RETRIEVER_TOP_K).await {
            Ok(chunks) => chunks.join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "document retrieval failed");
                state.push_log(format!("Retriever error: {e}"));
                String::new()
            }
        }
    }
}

/// 把本轮消息渲染为审计日志行
pub fn render_turn_log(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| match m.role {
            Role::User => format!("[USER] {}", m.content),
            Role::Assistant => "[AGENT] Response generated".to_string(),
            Role::Tool => "[TOOL] Result received".to_string(),
            Role::System => "[SYSTEM] Context updated".to_string(),
        })
        .collect()
}

/// 轮末把 user / assistant 消息追加进调用方历史（下一轮原样传回）
pub fn append_exchange(history: &mut Vec<Message>, user_input: &str, content: &str) {
    history.push(Message::user(user_input));
    history.push(Message::assistant(content));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::EchoTool;

    fn bot(llm: Arc<MockLlmClient>) -> Bot {
        Bot::new(
            llm,
            vec![Arc::new(EchoTool)],
            TurnContext::default(),
            BotSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_duplicate_tool_is_config_error() {
        let err = Bot::new(
            Arc::new(MockLlmClient::new()),
            vec![Arc::new(EchoTool), Arc::new(EchoTool)],
            TurnContext::default(),
            BotSettings::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AgentError::ToolNameCollision(_)));
    }

    #[tokio::test]
    async fn test_append_exchange_roundtrip() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_text(r#"{"steps": ["response"], "reasoning": "greeting"}"#);
        llm.push_text("Hi!");
        let bot = bot(llm);

        let mut history = Vec::new();
        let response = bot.get_response("hello", history.clone(), Vec::new()).await;
        append_exchange(&mut history, "hello", &response.content);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hi!");
    }

    #[test]
    fn test_render_turn_log() {
        let messages = vec![
            Message::user("hola"),
            Message::tool("Tool: echo\nStatus: success\nResult: hola"),
            Message::assistant("done"),
        ];
        let log = render_turn_log(&messages);
        assert_eq!(log[0], "[USER] hola");
        assert_eq!(log[1], "[TOOL] Result received");
        assert_eq!(log[2], "[AGENT] Response generated");
    }
}
