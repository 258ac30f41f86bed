//! 短期记忆：会话文字记录
//!
//! 保留最近 N 轮对话（user/assistant 对），超出时自动剪枝；阶段提示等以 System 消息记录，只用于展示与归档。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
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
}

/// 短期记忆：最近 N 轮对话（每轮含 user + assistant，System 提示另计，故上限为 max_turns*3 条消息）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns,
        }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 最近 turns 轮的 user/assistant 消息（不含 System），供模型上下文使用
    pub fn recent(&self, turns: usize) -> Vec<Message> {
        let dialog: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let skip = dialog.len().saturating_sub(turns * 2);
        dialog.into_iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 超出上限时丢弃最旧的消息，保留最近部分
    fn prune(&mut self) {
        let keep = self.max_turns * 3;
        if self.messages.len() > keep {
            self.messages.drain(..self.messages.len() - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_skips_system() {
        let mut mem = ConversationMemory::new(10);
        mem.push(Message::user("u1"));
        mem.push(Message::assistant("a1"));
        mem.push(Message::system("Phase: Warm-up → Clarify"));
        mem.push(Message::user("u2"));
        mem.push(Message::assistant("a2"));

        let recent = mem.recent(1);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "u2");
        assert_eq!(mem.recent(5).len(), 4);
        assert_eq!(mem.len(), 5);
    }

    #[test]
    fn test_prune_keeps_latest() {
        let mut mem = ConversationMemory::new(1);
        for i in 0..5 {
            mem.push(Message::user(format!("m{}", i)));
        }
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.messages()[0].content, "m2");
        mem.clear();
        assert!(mem.is_empty());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
