//! 记忆层：会话文字记录（短期）与会话归档（持久化）

pub mod conversation;
pub mod persistence;

pub use conversation::{ConversationMemory, Message, Role};
pub use persistence::{SessionArchive, SessionRecord};
