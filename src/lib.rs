//! Hive - Rust 对话智能体编排层
//!
//! 模块划分：
//! - **agent**: Bot 门面（get_response 入口与响应结构）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、单轮上下文与执行状态
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、token 用量
//! - **memory**: 对话消息类型、历史窗口、文档检索端口
//! - **react**: ReAct 单步规划与过程事件
//! - **tools**: 工具注册表、调用校验、批量执行器
//! - **workflow**: 阶段词表、Architect 路由、顺序解释引擎、回复合成

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod workflow;

pub use crate::agent::{append_exchange, Bot, BotResponse, BotSettings};
pub use crate::core::{AgentError, TurnContext};
