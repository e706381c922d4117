//! 记忆层：会话对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
