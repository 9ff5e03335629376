//! Architect：按轮规划执行路径
//!
//! 一次 LLM 调用产出线性阶段序列（JSON，schema 由 schemars 生成并注入提示词）。
//! 序列恒以 response 收尾（缺失则补）；解析或调用失败一律退化为 [response]，
//! 路由失败只会让这轮变成纯对话，不会让这轮失败。

use std::sync::Arc;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;

use crate::core::{TurnContext, TurnState};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::extract_json_block;
use crate::workflow::Stage;

/// 模型需输出的计划结构
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ArchitectPlan {
    /// 阶段 token 序列，顺序即执行顺序
    pub steps: Vec<String>,
    /// 选择这些阶段的简要理由
    #[serde(default)]
    pub reasoning: String,
}

/// 计划结构的 JSON Schema 文本，拼入 system prompt 约束输出格式
pub fn plan_schema_json() -> String {
    let schema = schema_for!(ArchitectPlan);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// Architect：持有 LLM，route 返回本轮阶段序列
pub struct Architect {
    llm: Arc<dyn LlmClient>,
}

impl Architect {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 规划本轮执行路径；available 为有工具可用的阶段集合（response 恒可用）
    pub async fn route(
        &self,
        ctx: &TurnContext,
        user_input: &str,
        available: &[Stage],
        state: &mut TurnState,
    ) -> Vec<Stage> {
        match self.try_route(ctx, user_input, available, state).await {
            Ok(plan) => {
                let tokens: Vec<&str> = plan.iter().map(Stage::as_str).collect();
                state.push_log(format!("Architect Plan: [{}]", tokens.join(", ")));
                plan
            }
            Err(e) => {
                tracing::warn!(error = %e, "architect failed, falling back to response only");
                state.push_log(format!("Architect Error: {e}. Fallback to response only."));
                vec![Stage::Response]
            }
        }
    }

    async fn try_route(
        &self,
        ctx: &TurnContext,
        user_input: &str,
        available: &[Stage],
        state: &mut TurnState,
    ) -> Result<Vec<Stage>, String> {
        let system = self.build_prompt(ctx, user_input, available);
        let messages = vec![
            Message::system(system),
            Message::user("Design the execution plan."),
        ];

        let completion = self.llm.complete(&messages).await?;
        state.add_usage(completion.usage);

        let json = extract_json_block(&completion.content)
            .ok_or_else(|| "no JSON object in architect output".to_string())?;
        let plan: ArchitectPlan = serde_json::from_str(json).map_err(|e| e.to_string())?;

        // 只保留可用阶段，未知 token 丢弃；response 必须收尾
        let mut stages: Vec<Stage> = plan
            .steps
            .iter()
            .filter_map(|token| Stage::parse(token))
            .filter(|s| *s == Stage::Response || available.contains(s))
            .collect();
        if !stages.contains(&Stage::Response) {
            stages.push(Stage::Response);
        }
        if !plan.reasoning.is_empty() {
            state.push_log(format!("Architect reasoning: {}", plan.reasoning));
        }
        Ok(stages)
    }

    fn build_prompt(&self, ctx: &TurnContext, user_input: &str, available: &[Stage]) -> String {
        let mut node_desc = Vec::new();
        for stage in available {
            match stage {
                Stage::Policy => {
                    node_desc.push("- policy: Checks privacy policies or permissions.")
                }
                Stage::Research => {
                    node_desc.push("- research: Searches internal knowledge base/documents.")
                }
                Stage::Task => {
                    node_desc.push("- task: Executes specific business actions/tools.")
                }
                Stage::Response => {}
            }
        }
        node_desc.push("- response: Generates the text response to the user.");

        format!(
            "You are the Architect of a conversational AI.\n\
             Your goal is to design a linear execution plan (a list of steps) to handle the \
             user's latest message, based on the provided Context and Instructions.\n\n\
             Available Steps:\n{}\n\n\
             Rules:\n\
             1. Always end with 'response' to generate the final answer.\n\
             2. If the user asks for information that might be in documents/knowledge base, include 'research'.\n\
             3. If the user wants to perform an action (book, update, calculate) and you have tools for it, include 'task'.\n\
             4. If the instructions or dynamic info suggest checking policies/permissions and they haven't been accepted, include 'policy' at the start.\n\
             5. Be efficient. Do not add steps if not needed.\n\
             6. If the user is just saying hello or chatting, just use [\"response\"].\n\n\
             Respond with a single JSON object matching this schema:\n{}\n\n\
             Context:\n\
             Dynamic Info: {}\n\
             Instructions: {}\n\n\
             Current User Input: {}",
            node_desc.join("\n"),
            plan_schema_json(),
            ctx.dynamic_info,
            ctx.function_purpose,
            user_input
        )
    }
}
