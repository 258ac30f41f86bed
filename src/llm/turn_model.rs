//! 把任意 LlmClient 适配成编排器使用的 ModelCall
//!
//! 消息布局：system = 系统提示 + 微知识 + 会话状态 JSON；随后是最近的对话历史，最后是本轮用户输入。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{ModelCall, ModelRequest};
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

pub struct LlmTurnModel {
    llm: Arc<dyn LlmClient>,
    history: Vec<Message>,
}

impl LlmTurnModel {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            history: Vec::new(),
        }
    }

    /// 附带最近的对话历史（不含本轮输入）
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn build_messages(&self, request: &ModelRequest<'_>) -> Vec<Message> {
        let mut system = request.system_prompt.to_string();
        if !request.knowledge.is_empty() {
            system.push_str("\n\nMICRO_KNOWLEDGE:\n");
            system.push_str(request.knowledge);
        }
        system.push_str("\n\nSESSION_STATE:\n");
        system.push_str(&request.state.to_string());

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(request.user_text));
        messages
    }
}

#[async_trait]
impl ModelCall for LlmTurnModel {
    async fn call(&self, request: &ModelRequest<'_>) -> Result<String, LlmError> {
        let messages = self.build_messages(request);
        self.llm.complete(&messages).await
    }
}
