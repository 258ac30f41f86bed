//! 会话运行时：主控循环
//!
//! 负责：加载语言包、创建 LLM/编排器/归档，建立 cmd/state 两条通道，
//! 并在后台任务中逐条消费用户命令（Submit/Cancel/Restart/Quit），保证同一会话的轮次串行执行。

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::{AppConfig, SessionSection};
use crate::core::{ChatSession, PhaseOrchestrator, SessionError, SessionState, UiState};
use crate::llm::{create_llm_from_config, LlmError};
use crate::memory::SessionArchive;
use crate::prompts::PromptLibrary;

/// 从 UI 发往会话运行时的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入，跑一轮 handle_turn
    Submit(String),
    /// 放弃正在等待的模型回复
    Cancel,
    /// 丢弃当前会话（含正在等待的一轮），开始新会话
    Restart,
    Quit,
}

/// 加载语言包：配置目录 > config/prompts > 内置
pub fn load_prompt_library(cfg: &AppConfig) -> PromptLibrary {
    let dir = cfg
        .prompts
        .dir
        .clone()
        .or_else(|| {
            ["config/prompts", "../config/prompts"]
                .into_iter()
                .map(PathBuf::from)
                .find(|p| p.exists())
        });

    match dir {
        Some(dir) => PromptLibrary::load_dir(&dir).unwrap_or_else(|e| {
            tracing::warn!("Prompt packs in {} failed to load ({}), using built-in", dir.display(), e);
            PromptLibrary::builtin()
        }),
        None => PromptLibrary::builtin(),
    }
}

/// 按配置组装一段新会话（编排器、LLM、归档均显式注入）
pub fn build_session(cfg: &AppConfig) -> ChatSession {
    let library = Arc::new(load_prompt_library(cfg));
    let orchestrator = Arc::new(PhaseOrchestrator::from_config(cfg, library));
    let llm = create_llm_from_config(cfg);

    let mut session = ChatSession::new(orchestrator, llm, SessionState::new(&cfg.session))
        .with_history_turns(cfg.app.history_turns);
    if let Some(dir) = &cfg.app.archive_dir {
        session = session.with_archive(SessionArchive::new(dir));
    }
    session
}

/// 创建会话运行时：返回命令发送端与状态接收端；后台任务消费命令并发布 UiState
pub fn create_session_runtime(
    cfg: AppConfig,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let session = build_session(&cfg);
    spawn_session_loop(session, cfg.session)
}

/// 后台主控循环。等待模型回复期间 Cancel/Restart/Quit 会中断本轮再各自执行，
/// 期间到达的 Submit 排队到本轮结束后处理
fn spawn_session_loop(
    mut session: ChatSession,
    session_cfg: SessionSection,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(session.ui_state());

    tokio::spawn(async move {
        let mut queued: VecDeque<Command> = VecDeque::new();
        loop {
            let cmd = match queued.pop_front() {
                Some(cmd) => cmd,
                None => match cmd_rx.recv().await {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            match cmd {
                Command::Submit(input) => {
                    let _ = state_tx.send(session.ui_state().locked());

                    let outcome = {
                        let turn = session.submit(&input);
                        tokio::pin!(turn);
                        loop {
                            tokio::select! {
                                r = &mut turn => break Ok(r),
                                Some(cmd) = cmd_rx.recv() => match cmd {
                                    Command::Submit(text) => queued.push_back(Command::Submit(text)),
                                    other => break Err(other),
                                },
                            }
                        }
                    };

                    let ui = match outcome {
                        Ok(Ok(_)) => session.ui_state(),
                        Ok(Err(e)) => {
                            tracing::error!("Turn failed: {}", e);
                            session.ui_state().with_error(e.to_string())
                        }
                        Err(interrupt) => {
                            let err = SessionError::from(LlmError::Cancelled);
                            tracing::info!("Turn interrupted by {:?}: {}", interrupt, err);
                            if !matches!(interrupt, Command::Cancel) {
                                queued.push_front(interrupt);
                            }
                            session.ui_state().with_error(err.to_string())
                        }
                    };
                    let _ = state_tx.send(ui);
                }
                Command::Cancel => {}
                Command::Restart => {
                    queued.clear();
                    session.restart(SessionState::new(&session_cfg));
                    let _ = state_tx.send(session.ui_state());
                }
                Command::Quit => break,
            }
        }
    });

    (cmd_tx, state_rx)
}
