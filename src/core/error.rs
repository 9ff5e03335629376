//! Agent 错误类型
//!
//! 校验拒绝与工具失败不是错误：它们以 ToolCallResult 形式回流到下一轮规划。
//! AgentError 只覆盖会让某个阶段降级的故障；任何阶段错误都不会越过工作流边界
//! 抛给调用方，门面始终返回完整响应结构。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（模型调用、解析、工具、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool name collision: {0}")]
    ToolNameCollision(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
