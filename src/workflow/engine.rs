//! 工作流引擎
//!
//! 对 Architect 产出的阶段序列做顺序解释：policy / research / task 各自在
//! 对应工具子集上跑 ReAct（规划一步 + 整批执行 + 观察写回），response 调用
//! 合成器。同一批内的工具并发执行，批与批之间串行；下一次规划只在整批
//! 结果齐备后发生。任何阶段处理器的失败都就地转为降级的状态更新，
//! 引擎保证走到收尾并产出最终回复。

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, TurnContext, TurnState};
use crate::llm::ToolCallRequest;
use crate::memory::Message;
use crate::react::events::{emit, AgentEvent};
use crate::react::planner::preview;
use crate::react::{Decision, Planner};
use crate::tools::{ToolCallResult, ToolCallStatus, ToolExecutor};
use crate::workflow::synthesizer::{ResponseSynthesizer, FALLBACK_RESPONSE};
use crate::workflow::Stage;

/// 检索阶段的最大重试（换词再查）次数
const RESEARCH_MAX_RETRIES: u32 = 2;
/// 观察预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 检索结果的无效标记（命中即认为没查到东西）
const INVALID_RESULT_MARKERS: [&str; 8] = [
    "no results",
    "not found",
    "no information",
    "empty",
    "null",
    "none",
    "no se encontraron",
    "sin resultados",
];

/// 策略已接受的动态信息标记
const POLICY_ACCEPTED_MARKERS: [&str; 2] = ["policies accepted: yes", "politicas aceptadas: si"];

/// 引擎：持有规划器、执行器、合成器与阶段工具划分
pub struct WorkflowEngine {
    planner: Planner,
    executor: ToolExecutor,
    synthesizer: ResponseSynthesizer,
    partitions: HashMap<Stage, Vec<String>>,
    event_tx: Option<UnboundedSender<AgentEvent>>,
}

impl WorkflowEngine {
    pub fn new(
        planner: Planner,
        executor: ToolExecutor,
        synthesizer: ResponseSynthesizer,
        partitions: HashMap<Stage, Vec<String>>,
    ) -> Self {
        Self {
            planner,
            executor,
            synthesizer,
            partitions,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 顺序执行本轮计划；结束时 state.final_response 必有值
    pub async fn run(
        &self,
        plan: &[Stage],
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) {
        for (index, stage) in plan.iter().enumerate() {
            // 同一阶段类型可在一个计划中出现多次，节点名用序号区分
            let node = format!("{index}_{stage}");
            emit(
                &self.event_tx,
                AgentEvent::StageStarted {
                    index,
                    stage: stage.as_str().to_string(),
                },
            );
            state.push_log(format!("Stage {node} started"));

            let outcome = match stage {
                Stage::Policy => self.run_policy(ctx, state, user_input, file_context).await,
                Stage::Research => self.run_research(ctx, state, user_input, file_context).await,
                Stage::Task => self.run_task(ctx, state, user_input, file_context).await,
                Stage::Response => self.run_response(ctx, state, user_input, file_context).await,
            };

            if let Err(e) = outcome {
                // 处理器失败不冲垮图：记录并带着降级状态继续走向收尾
                tracing::error!(stage = %node, error = %e, "stage handler failed");
                state.push_log(format!("Stage {node} error: {e}. Continuing degraded."));
                emit(&self.event_tx, AgentEvent::Error { text: e.to_string() });
            }
        }

        // 计划应由 Architect 保证以 response 收尾；这里兜底到必有最终回复
        if state.final_response().is_none() {
            let _ = self.run_response(ctx, state, user_input, file_context).await;
            if state.final_response().is_none() {
                state.set_final_response(FALLBACK_RESPONSE);
            }
        }
    }

    /// 策略阶段：已接受则跳过；否则在策略工具子集上跑一步 ReAct
    async fn run_policy(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) -> Result<(), AgentError> {
        let dynamic_info = ctx.dynamic_info.to_lowercase();
        if POLICY_ACCEPTED_MARKERS.iter().any(|m| dynamic_info.contains(m)) {
            state.push_log("Policy: policies already accepted. Skipping.".to_string());
            return Ok(());
        }

        let tools = self.stage_tools(Stage::Policy);
        if tools.is_empty() {
            state.push_log("Policy: no policy tool found.".to_string());
            return Ok(());
        }

        let specs = self.executor.registry().tool_specs(Some(&tools));
        let decision = self
            .planner
            .plan_step(ctx, state, user_input, &specs, file_context)
            .await;
        if decision.decision == Decision::ExecuteTool {
            let results = self.dispatch_batch(state, decision.tool_calls).await;
            for result in &results {
                if result.status == ToolCallStatus::Success {
                    state
                        .task_results
                        .push(format!("Policy Check Result: {}", result.output));
                }
            }
        }
        Ok(())
    }

    /// 检索阶段：一步规划 + 整批执行；结果无效时注入换词提示再试，
    /// 最多 RESEARCH_MAX_RETRIES 次重试
    async fn run_research(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) -> Result<(), AgentError> {
        let tools = self.stage_tools(Stage::Research);
        if tools.is_empty() {
            state.push_log("Research: no tools available, skipping.".to_string());
            return Ok(());
        }
        let specs = self.executor.registry().tool_specs(Some(&tools));

        let mut attempt = 0u32;
        while attempt <= RESEARCH_MAX_RETRIES {
            attempt += 1;
            let decision = self
                .planner
                .plan_step(ctx, state, user_input, &specs, file_context)
                .await;
            if decision.decision == Decision::Finish {
                state.push_log(format!(
                    "Research attempt {attempt}: model decided not to search."
                ));
                break;
            }

            let results = self.dispatch_batch(state, decision.tool_calls).await;
            let mut found_valid = false;
            for result in &results {
                if result.status == ToolCallStatus::Success && is_valid_result(&result.output) {
                    state
                        .research_results
                        .push(format!("Source ({}): {}", result.tool_name, result.output));
                    found_valid = true;
                }
            }
            if found_valid {
                break;
            }

            state.push_log(format!(
                "Research attempt {attempt}: no relevant results found."
            ));
            // 换词重查：把失败观察写回历史，让下一步规划生成更宽的查询
            state.push_message(Message::user(format!(
                "Previous search yielded no results. Try a broader term or synonym for: {user_input}"
            )));
        }
        Ok(())
    }

    /// 任务阶段：完整 ReAct 循环（规划 / 执行 / 观察），直到 Finish 或迭代上限
    async fn run_task(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) -> Result<(), AgentError> {
        let tools = self.stage_tools(Stage::Task);
        if tools.is_empty() {
            state.push_log("Task: no tools available.".to_string());
            return Ok(());
        }
        let specs = self.executor.registry().tool_specs(Some(&tools));

        loop {
            let decision = self
                .planner
                .plan_step(ctx, state, user_input, &specs, file_context)
                .await;
            match decision.decision {
                Decision::Finish => break,
                Decision::ExecuteTool => {
                    let results = self.dispatch_batch(state, decision.tool_calls).await;
                    for result in &results {
                        if result.status == ToolCallStatus::Success {
                            state
                                .task_results
                                .push(format!("Result of {}: {}", result.tool_name, result.output));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 收尾阶段：生成最终回复（一次写入）
    async fn run_response(
        &self,
        ctx: &TurnContext,
        state: &mut TurnState,
        user_input: &str,
        file_context: Option<&str>,
    ) -> Result<(), AgentError> {
        let content = self
            .synthesizer
            .synthesize(ctx, state, user_input, file_context)
            .await;
        state.set_final_response(content);
        emit(&self.event_tx, AgentEvent::ResponseReady);
        Ok(())
    }

    /// 执行一批调用并把每个结果写回状态（结果列表 + 观察消息 + 事件）
    async fn dispatch_batch(
        &self,
        state: &mut TurnState,
        calls: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallResult> {
        for call in &calls {
            emit(
                &self.event_tx,
                AgentEvent::ToolCall {
                    tool: call.name.clone(),
                    args: call.arguments.clone(),
                },
            );
        }

        let results = self.executor.execute_batch(calls).await;
        for result in &results {
            match result.status {
                ToolCallStatus::Success => emit(
                    &self.event_tx,
                    AgentEvent::Observation {
                        tool: result.tool_name.clone(),
                        preview: preview(&result.output, OBSERVATION_PREVIEW_CHARS),
                    },
                ),
                _ => emit(
                    &self.event_tx,
                    AgentEvent::ToolFailure {
                        tool: result.tool_name.clone(),
                        reason: result.output.clone(),
                    },
                ),
            }
            state.push_message(Message::tool(result.observation()));
            state.push_log(format!(
                "Tool {} finished: {}",
                result.tool_name,
                result.status_str()
            ));
            state.record_tool_result(result.clone());
        }
        results
    }

    fn stage_tools(&self, stage: Stage) -> Vec<String> {
        self.partitions.get(&stage).cloned().unwrap_or_default()
    }
}

/// 检索结果有效性启发式：空串或命中无效标记即视为没查到
fn is_valid_result(output: &str) -> bool {
    let lower = output.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    !INVALID_RESULT_MARKERS.iter().any(|m| lower.contains(m))
}
