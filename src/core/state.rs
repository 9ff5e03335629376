//! 单轮执行状态
//!
//! TurnContext 是本轮不变的静态上下文（人设、限制、业务目的、动态事实）；
//! TurnState 是贯穿各阶段的唯一累加器：消息只追加、迭代计数只增、
//! 工具结果与日志只追加（日志可环形限长）、token 只累加、最终回复一次写入。
//! 每轮新建、轮末丢弃，调用方只保留 history 与 logs。

use crate::llm::TokenUsage;
use crate::memory::Message;
use crate::tools::ToolCallResult;

/// 本轮静态上下文（由调用方提供）
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    /// 业务目的与指令
    pub function_purpose: String,
    /// 人设语气
    pub personality_tone: String,
    /// 行为限制
    pub limitations: String,
    /// 运行期事实（当前日期、用户身份、策略接受状态等）
    pub dynamic_info: String,
}

/// 单轮累加器；一次在途执行独占所有权，不跨轮共享
pub struct TurnState {
    /// 消息历史（调用方历史 + 本轮追加），只追加、保序
    pub messages: Vec<Message>,
    /// 规划迭代计数，每次规划调用恰好 +1
    pub iteration: usize,
    /// 本轮全部工具调用结果，按执行顺序
    pub tools_executed: Vec<ToolCallResult>,
    /// 检索阶段产出
    pub research_results: Vec<String>,
    /// 任务阶段产出
    pub task_results: Vec<String>,
    /// 最近一次规划的 reasoning（供合成阶段引用）
    pub last_reasoning: String,
    logs: Vec<String>,
    max_log_lines: usize,
    token_usage: TokenUsage,
    final_response: Option<String>,
}

impl TurnState {
    /// 以调用方的历史与既有日志开始新一轮；max_log_lines 为 0 表示日志不限长
    pub fn new(history: Vec<Message>, logs: Vec<String>, max_log_lines: usize) -> Self {
        let mut state = Self {
            messages: history,
            iteration: 0,
            tools_executed: Vec::new(),
            research_results: Vec::new(),
            task_results: Vec::new(),
            last_reasoning: String::new(),
            logs,
            max_log_lines,
            token_usage: TokenUsage::default(),
            final_response: None,
        };
        state.trim_logs();
        state
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        self.trim_logs();
    }

    /// 超出 max_log_lines 时丢弃最旧的行
    fn trim_logs(&mut self) {
        if self.max_log_lines > 0 && self.logs.len() > self.max_log_lines {
            let excess = self.logs.len() - self.max_log_lines;
            self.logs.drain(..excess);
        }
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn take_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.logs)
    }

    pub fn record_tool_result(&mut self, result: ToolCallResult) {
        self.tools_executed.push(result);
    }

    /// 最近一次工具观察（喂给下一轮规划）
    pub fn last_observation(&self) -> Option<String> {
        self.tools_executed.last().map(|r| r.observation())
    }

    /// 本轮已执行工具的简要清单（name: status）
    pub fn tools_history(&self) -> String {
        self.tools_executed
            .iter()
            .map(|r| format!("- {}: {}", r.tool_name, r.status_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn add_usage(&mut self, usage: TokenUsage) {
        self.token_usage.absorb(usage);
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.token_usage
    }

    /// 一次写入：已有值时忽略后续写入
    pub fn set_final_response(&mut self, response: impl Into<String>) {
        if self.final_response.is_none() {
            self.final_response = Some(response.into());
        }
    }

    pub fn final_response(&self) -> Option<&str> {
        self.final_response.as_deref()
    }
}
