//! 工具执行器
//!
//! 对一批已由模型产生的工具调用先校验后执行：同批内并发、互相隔离
//! （单个失败不影响其余），批与批之间严格串行（下一轮规划要等整批结果）。
//! 每次调用带超时与有界重试，并输出结构化审计日志（JSON）。
//! 观察者回调的任何异常行为都不得中断执行，通知只管发出、不管结果。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;

use crate::llm::ToolCallRequest;
use crate::tools::{validator, ToolRegistry};

/// 调用结果状态：Rejected 表示校验失败从未执行；Failed 表示执行后出错
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Success,
    Failed,
    Rejected,
}

/// 单次工具调用的结果；创建后不再修改，按执行顺序累积为本轮观察列表
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub status: ToolCallStatus,
    pub output: String,
    pub error: Option<String>,
    /// 完成时间（Unix 毫秒）
    pub finished_at: i64,
}

impl ToolCallResult {
    pub fn success(call: &ToolCallRequest, output: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolCallStatus::Success,
            output,
            error: None,
            finished_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn failed(call: &ToolCallRequest, error: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolCallStatus::Failed,
            output: format!("ERROR: {error}"),
            error: Some(error),
            finished_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn rejected(call: &ToolCallRequest, missing: Vec<String>, reason: String) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            status: ToolCallStatus::Rejected,
            output: reason,
            error: if missing.is_empty() {
                None
            } else {
                Some(format!("missing required parameters: {}", missing.join(", ")))
            },
            finished_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 供下一轮规划使用的观察块
    pub fn observation(&self) -> String {
        format!(
            "Tool: {}\nStatus: {}\nResult: {}",
            self.tool_name,
            self.status_str(),
            self.output
        )
    }

    pub fn status_str(&self) -> &'static str {
        match self.status {
            ToolCallStatus::Success => "success",
            ToolCallStatus::Failed => "failed",
            ToolCallStatus::Rejected => "rejected",
        }
    }
}

/// 工具生命周期观察者：start / end / error 三个通知点。
/// 实现必须不可失败；执行器忽略通知的任何返回与副作用。
pub trait ToolObserver: Send + Sync {
    fn on_start(&self, _tool: &str, _args: &Value) {}
    fn on_end(&self, _tool: &str, _output: &str) {}
    fn on_error(&self, _tool: &str, _error: &str) {}
}

/// 空观察者
pub struct NoopObserver;

impl ToolObserver for NoopObserver {}

/// 工具执行器：持有注册表、超时与重试配置、可选观察者
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    /// 失败后的额外尝试次数（总尝试 = 1 + max_retries）
    max_retries: u32,
    observer: Arc<dyn ToolObserver>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64, max_retries: u32) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 执行一批调用：逐个先校验，已通过的并发执行；返回与入参等长、
    /// 顺序一致的结果列表
    pub async fn execute_batch(&self, calls: Vec<ToolCallRequest>) -> Vec<ToolCallResult> {
        let futures = calls.iter().map(|call| self.execute_one(call));
        join_all(futures).await
    }

    async fn execute_one(&self, call: &ToolCallRequest) -> ToolCallResult {
        if let Err(rejected) = validator::validate(call, &self.registry) {
            self.audit(call, "rejected", 0, 0);
            self.observer.on_error(&call.name, &rejected.output);
            return rejected;
        }

        // 校验已确认存在
        let tool = match self.registry.get(&call.name) {
            Some(t) => t,
            None => {
                return ToolCallResult::rejected(
                    call,
                    Vec::new(),
                    format!("Tool {} not found", call.name),
                )
            }
        };

        self.observer.on_start(&call.name, &call.arguments);

        let start = Instant::now();
        let mut last_error = String::new();
        let mut attempts = 0u32;
        while attempts <= self.max_retries {
            attempts += 1;
            match timeout(self.timeout, tool.execute(call.arguments.clone())).await {
                Ok(Ok(output)) => {
                    self.audit(call, "ok", attempts, start.elapsed().as_millis() as u64);
                    self.observer.on_end(&call.name, &output);
                    return ToolCallResult::success(call, output);
                }
                Ok(Err(e)) => {
                    tracing::warn!(tool = %call.name, attempt = attempts, error = %e, "tool attempt failed");
                    last_error = e;
                }
                Err(_) => {
                    tracing::warn!(tool = %call.name, attempt = attempts, "tool attempt timed out");
                    last_error = format!("timed out after {}s", self.timeout.as_secs());
                }
            }
        }

        self.audit(call, "error", attempts, start.elapsed().as_millis() as u64);
        self.observer.on_error(&call.name, &last_error);
        ToolCallResult::failed(call, last_error)
    }

    /// 结构化审计日志（JSON 单行）
    fn audit(&self, call: &ToolCallRequest, outcome: &str, attempts: u32, duration_ms: u64) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "call_id": call.id,
            "outcome": outcome,
            "attempts": attempts,
            "duration_ms": duration_ms,
            "args_preview": args_preview(&call.arguments),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
