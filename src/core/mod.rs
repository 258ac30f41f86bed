//! 核心编排层：阶段状态机、输出契约解析、危机拦截、单轮编排、会话与运行时

pub mod control;
pub mod crisis;
pub mod error;
pub mod orchestrator;
pub mod phase;
pub mod runtime;
pub mod session;
pub mod state;

pub use control::{
    parse_model_output, sanitize_ui, ConfidenceShift, ControlBlock, ParsedOutput, SudsReading,
};
pub use crisis::CrisisGate;
pub use error::SessionError;
pub use orchestrator::{ModelCall, ModelRequest, PhaseOrchestrator, TurnResult};
pub use phase::Phase;
pub use runtime::{build_session, create_session_runtime, Command};
pub use session::ChatSession;
pub use state::{ProgressFlags, ReframeAnalysis, SessionState, UiState};
