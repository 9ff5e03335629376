//! 记忆层：对话消息类型、历史窗口、文档检索端口

pub mod conversation;
pub mod retriever;

pub use conversation::{message_from_record, window_messages, Message, Role};
pub use retriever::{DocumentRetriever, KeywordRetriever};
