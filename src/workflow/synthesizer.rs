//! ResponseSynthesizer：最终回复合成
//!
//! 一次 LLM 调用，基于本轮累积的检索结果、任务结果与规划 reasoning 生成
//! 面向用户的回复；提示词明确禁止编造观察之外的信息、要求与用户同语言。
//! 调用失败返回固定道歉文案，这个路径永不向上抛错。

use std::sync::Arc;

use crate::core::{TurnContext, TurnState};
use crate::llm::LlmClient;
use crate::memory::{window_messages, Message, Role};
use crate::tools::ToolCallStatus;

/// 合成提示词中保留的历史轮数
const HISTORY_WINDOW_TURNS: usize = 10;

/// 合成失败时的固定兜底文案
pub const FALLBACK_RESPONSE: &str =
    "I apologize, I encountered an error generating the response.";

/// 合成器：持有 LLM
pub struct ResponseSynthesizer {
    llm: Arc<dyn LlmClient>,
}

impl ResponseSynthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 生成最终回复；永不失败（失败即兜底文案）
    pub async fn synthesize(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) -> String {
        let mut system = self.build_prompt(ctx, state, user_input);
        if let Some(context) = file_context {
            if !context.is_empty() {
                system.push_str(&format!("\n\nContext from uploaded files:\n{context}"));
            }
        }
        let messages = vec![Message::system(system), Message::user("Generate the response now.")];

        match self.llm.complete(&messages).await {
            Ok(completion) => {
                state.add_usage(completion.usage);
                let text = completion.content.trim().to_string();
                if text.is_empty() {
                    state.push_log("Synthesizer returned empty content, using fallback.".to_string());
                    FALLBACK_RESPONSE.to_string()
                } else {
                    state.push_log("Response generated successfully.".to_string());
                    text
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "synthesizer model invocation failed");
                state.push_log(format!("Synthesizer error: {e}. Using fallback response."));
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    fn build_prompt(&self, ctx: &TurnContext, state: &TurnState, user_input: &str) -> String {
        let research = if state.research_results.is_empty() {
            "None".to_string()
        } else {
            state.research_results.join("\n")
        };
        let tasks = if state.task_results.is_empty() {
            "None".to_string()
        } else {
            state.task_results.join("\n")
        };
        let reasoning = if state.last_reasoning.is_empty() {
            "No reasoning provided".to_string()
        } else {
            state.last_reasoning.clone()
        };

        format!(
            "# RESPONSE GENERATOR\n\n\
             ## PERSONALITY\n{}\n\n\
             ## LIMITATIONS (MANDATORY)\n{}\n\n\
             ## CONVERSATION SO FAR\n{}\n\n\
             ## USER MESSAGE\n{}\n\n\
             ## CONTEXT\n\
             Dynamic Context:\n{}\n\n\
             Planner Reasoning:\n{}\n\n\
             Research Findings:\n{}\n\n\
             Task Results:\n{}\n\n\
             Tool Executions:\n{}\n\n\
             ## INSTRUCTIONS\n\
             1. Follow all limitations strictly\n\
             2. Answer the user's question directly using the Research Findings\n\
             3. If an action was performed, confirm the result using Task Results\n\
             4. Be conversational, helpful, and natural\n\
             5. Match the user's language\n\
             6. Never invent information not present above",
            ctx.personality_tone,
            ctx.limitations,
            self.build_history_block(state),
            user_input,
            ctx.dynamic_info,
            reasoning,
            research,
            tasks,
            self.build_results_summary(state)
        )
    }

    /// 最近几轮 user / assistant 消息，供合成阶段保持对话连续性
    fn build_history_block(&self, state: &TurnState) -> String {
        let lines: Vec<String> = window_messages(&state.messages, HISTORY_WINDOW_TURNS)
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .map(|m| {
                let speaker = match m.role {
                    Role::User => "user",
                    _ => "assistant",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect();
        if lines.is_empty() {
            "None".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// 工具执行摘要；没有执行时明确说明，避免模型自行脑补
    fn build_results_summary(&self, state: &TurnState) -> String {
        if state.tools_executed.is_empty() {
            return "No tools were executed. Agent may need more information from user.".to_string();
        }
        state
            .tools_executed
            .iter()
            .map(|r| match r.status {
                ToolCallStatus::Success => format!("From {}: {}", r.tool_name, r.output),
                _ => format!("{} {}: {}", r.tool_name, r.status_str(), r.output),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
