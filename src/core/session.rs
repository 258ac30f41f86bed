//! 单段会话：SessionState + 文字记录 + 结束时的报告与归档
//!
//! ChatSession 持有注入的编排器、模型客户端与可选归档，每次 submit 跑一轮 handle_turn；
//! 阶段到达 Closed 时生成总结报告、写入归档并丢弃重构分析。

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::{PhaseOrchestrator, SessionError, SessionState, TurnResult, UiState};
use crate::llm::{LlmClient, LlmTurnModel};
use crate::memory::{ConversationMemory, Message, SessionArchive, SessionRecord};
use crate::report::render_summary;

pub struct ChatSession {
    id: String,
    started_at: DateTime<Utc>,
    state: SessionState,
    conversation: ConversationMemory,
    orchestrator: Arc<PhaseOrchestrator>,
    llm: Arc<dyn LlmClient>,
    archive: Option<SessionArchive>,
    history_turns: usize,
    report: Option<String>,
}

impl ChatSession {
    pub fn new(
        orchestrator: Arc<PhaseOrchestrator>,
        llm: Arc<dyn LlmClient>,
        state: SessionState,
    ) -> Self {
        let max_turns = state.max_turns as usize;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            state,
            conversation: ConversationMemory::new(max_turns.max(1)),
            orchestrator,
            llm,
            archive: None,
            history_turns: 8,
            report: None,
        }
    }

    pub fn with_archive(mut self, archive: SessionArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// 会话结束后生成的总结报告
    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn ui_state(&self) -> UiState {
        UiState::project(&self.state, self.conversation.messages().to_vec())
    }

    /// 丢弃当前会话，以新的 id 与状态重新开始
    pub fn restart(&mut self, state: SessionState) {
        self.id = uuid::Uuid::new_v4().to_string();
        self.started_at = Utc::now();
        self.conversation = ConversationMemory::new((state.max_turns as usize).max(1));
        self.state = state;
        self.report = None;
    }

    /// 处理一条用户输入；模型失败时用户输入仍记入文字记录，错误交给调用方
    pub async fn submit(&mut self, user_text: &str) -> Result<TurnResult, SessionError> {
        let model = LlmTurnModel::new(self.llm.clone())
            .with_history(self.conversation.recent(self.history_turns));
        let outcome = self
            .orchestrator
            .handle_turn(&mut self.state, user_text, &model)
            .await;

        self.conversation.push(Message::user(user_text));
        let result = outcome?;

        if let Some(banner) = &result.banner {
            self.conversation.push(Message::system(banner.clone()));
        }
        self.conversation.push(Message::assistant(result.ui_text.clone()));

        if result.end_of_session && self.report.is_none() {
            self.close()?;
        }
        Ok(result)
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let analysis = self.state.take_reframe();
        let report = render_summary(&self.state, analysis.as_ref());
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::info!(
            session = %self.id,
            turns = self.state.turn,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "Session closed"
        );

        if let Some(archive) = &self.archive {
            let record = SessionRecord {
                id: self.id.clone(),
                started_at: self.started_at,
                closed_at: Utc::now(),
                state: self.state.clone(),
                transcript: self.conversation.messages().to_vec(),
                report: report.clone(),
            };
            let path = archive
                .save(&record)
                .map_err(|e| SessionError::Archive(e.to_string()))?;
            tracing::info!("Session archived to {}", path.display());
        }

        self.report = Some(report);
        Ok(())
    }
}
