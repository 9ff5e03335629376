//! 对话历史类型
//!
//! 历史由调用方持有并在每轮传入；本模块只定义消息类型与取最近 N 轮的窗口裁剪，
//! 供构建 LLM 上下文使用。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致；Tool 为工具观察结果）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

/// 从 {role, content} 形式的记录还原历史；未知 role 按 user 处理
pub fn message_from_record(role: &str, content: &str) -> Message {
    match role {
        "assistant" | "bot" => Message::assistant(content),
        "system" => Message::system(content),
        "tool" => Message::tool(content),
        _ => Message::user(content),
    }
}

/// 取最近 max_turns 轮（约 max_turns*2 条）消息；max_turns 为 0 表示不裁剪
pub fn window_messages(messages: &[Message], max_turns: usize) -> &[Message] {
    if max_turns == 0 {
        return messages;
    }
    let keep = max_turns * 2;
    if messages.len() > keep {
        &messages[messages.len() - keep..]
    } else {
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_keeps_most_recent() {
        let messages: Vec<Message> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("u{i}"))
                } else {
                    Message::assistant(format!("a{i}"))
                }
            })
            .collect();

        let window = window_messages(&messages, 2);
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].content, "u6");
        assert_eq!(window[3].content, "a9");
    }

    #[test]
    fn test_window_zero_means_unbounded() {
        let messages = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(window_messages(&messages, 0).len(), 2);
    }

    #[test]
    fn test_message_from_record_roles() {
        assert_eq!(message_from_record("bot", "x").role, Role::Assistant);
        assert_eq!(message_from_record("user", "x").role, Role::User);
        assert_eq!(message_from_record("???", "x").role, Role::User);
    }
}
