//! Token 用量统计
//!
//! 值语义的 TokenUsage：add 满足交换律与结合律，分段累加与整体累加结果一致，
//! 一次对话内 Planner / Architect / Synthesizer 的每次 LLM 调用都向同一份累计值汇总。

use serde::{Deserialize, Serialize};

/// 单次或累计的 token 用量（prompt / completion / total）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// 两份用量相加，返回新值
    pub fn add(self, other: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            total_tokens: self.total_tokens + other.total_tokens,
        }
    }

    /// 原地累加（累计值只增不减）
    pub fn absorb(&mut self, other: TokenUsage) {
        *self = self.add(other);
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0 && self.prompt_tokens == 0 && self.completion_tokens == 0
    }
}
