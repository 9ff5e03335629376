//! 编排过程事件：用于流式/SSE 展示阶段、规划决策、工具调用与观察
//!
//! 事件通过可选的无界通道推送；发送失败一律忽略，观察端故障不影响主流程。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// 单轮过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 进入某个阶段（index 为本轮计划内的序号）
    StageStarted { index: usize, stage: String },
    /// 正在调用 LLM 规划
    Thinking,
    /// 规划决策（execute_tool / finish）
    PlannerUpdate {
        decision: String,
        reasoning: String,
        iteration: usize,
    },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 工具执行失败或被校验拒绝
    ToolFailure { tool: String, reason: String },
    /// 最终回复已生成
    ResponseReady,
    /// Token 用量（本轮累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    /// 错误（已降级处理，仅供展示）
    Error { text: String },
}

/// 发送事件；通道关闭或未配置时静默丢弃
pub fn emit(tx: &Option<UnboundedSender<AgentEvent>>, event: AgentEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}
