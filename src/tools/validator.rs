//! 工具调用校验
//!
//! 执行前检查：未注册的工具名直接拒绝；必填参数缺失或「有值但为假」
//! （空串 / null）同样拒绝。空串在本域从不是合法业务输入（邮箱、电话、id），
//! 这是比 JSON Schema 更严格的刻意规则。
//! 拒绝不是异常：以 Rejected 状态的 ToolCallResult 回流给下一轮规划，
//! 让模型自行修正。

use serde_json::Value;

use crate::llm::ToolCallRequest;
use crate::tools::executor::{ToolCallResult, ToolCallStatus};
use crate::tools::ToolRegistry;

/// 校验一次工具调用；通过返回 Ok(())，否则返回可回流的 Rejected 结果
pub fn validate(call: &ToolCallRequest, registry: &ToolRegistry) -> Result<(), ToolCallResult> {
    let descriptor = match registry.descriptor(&call.name) {
        Some(d) => d,
        None => {
            return Err(ToolCallResult::rejected(
                call,
                Vec::new(),
                format!("Tool {} not found", call.name),
            ));
        }
    };

    let missing: Vec<String> = descriptor
        .required
        .iter()
        .filter(|param| is_missing(call.arguments.get(param.as_str())))
        .cloned()
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    let reason = format!(
        "Validation rejected: missing required parameters: {}",
        missing.join(", ")
    );
    Err(ToolCallResult::rejected(call, missing, reason))
}

/// 缺失判定：参数不存在、为 null、或为（去除空白后的）空串
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}
