//! 状态定义：SessionState（编排器每轮修改）、ReframeAnalysis、UiState 投影
//!
//! SessionState 每段会话创建一次，由编排器逐轮修改，阶段到达 Closed 后归档。
//! UI 只持有轻量的 UiState（阶段、轮次、历史、锁、错误）。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::SessionSection;
use crate::core::Phase;
use crate::memory::Message;

/// 入组信息采集进度
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFlags {
    pub situation: bool,
    pub thought: bool,
    pub emotion: bool,
    pub intensity: bool,
}

impl ProgressFlags {
    pub const FIELDS: [&'static str; 4] = ["situation", "thought", "emotion", "intensity"];

    /// 字段不在 missing 列表中即视为已采集；已采集的标记不会被撤销
    pub fn absorb_missing(&mut self, missing: &[String]) {
        let is_missing = |name: &str| missing.iter().any(|m| m.trim().eq_ignore_ascii_case(name));
        self.situation |= !is_missing("situation");
        self.thought |= !is_missing("thought");
        self.emotion |= !is_missing("emotion");
        self.intensity |= !is_missing("intensity");
    }

    pub fn is_complete(&self) -> bool {
        self.situation && self.thought && self.emotion && self.intensity
    }

    pub fn missing(&self) -> Vec<&'static str> {
        let flags = [self.situation, self.thought, self.emotion, self.intensity];
        Self::FIELDS
            .into_iter()
            .zip(flags)
            .filter(|(_, collected)| !collected)
            .map(|(name, _)| name)
            .collect()
    }
}

/// 重构阶段的分析结果，以 JSON 字符串存入 SessionState.reframe_json，总结阶段与报告各消费一次
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReframeAnalysis {
    #[serde(default)]
    pub distortions: Vec<String>,
    #[serde(default)]
    pub evidence_for: Vec<String>,
    #[serde(default)]
    pub evidence_against: Vec<String>,
    #[serde(default)]
    pub balanced_thought: String,
    /// 不超过 10 分钟的小行动实验
    #[serde(default)]
    pub micro_action: Option<String>,
    #[serde(default, deserialize_with = "crate::core::control::lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub certainty_before: Option<u8>,
    #[serde(default, deserialize_with = "crate::core::control::lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub certainty_after: Option<u8>,
    #[serde(default)]
    pub tone: Option<String>,
}

/// 单段会话的完整状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: Phase,
    pub turn: u32,
    pub max_turns: u32,
    pub followups_left: u32,
    pub user_language: String,
    pub progress: ProgressFlags,
    pub suds_pre: Option<u8>,
    pub suds_post: Option<u8>,
    pub confidence_pre: Option<u8>,
    pub confidence_post: Option<u8>,
    pub crisis_flag: bool,
    /// 序列化后的 ReframeAnalysis
    pub reframe_json: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&SessionSection::default())
    }
}

impl SessionState {
    pub fn new(cfg: &SessionSection) -> Self {
        Self {
            phase: Phase::Warmup,
            turn: 0,
            max_turns: cfg.max_turns,
            followups_left: cfg.followup_budget,
            user_language: cfg.default_language.clone(),
            progress: ProgressFlags::default(),
            suds_pre: None,
            suds_post: None,
            confidence_pre: None,
            confidence_post: None,
            crisis_flag: false,
            reframe_json: None,
        }
    }

    pub fn reframe_analysis(&self) -> Option<ReframeAnalysis> {
        let raw = self.reframe_json.as_deref()?;
        match serde_json::from_str(raw) {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                tracing::debug!("Stored reframe analysis is unreadable: {}", e);
                None
            }
        }
    }

    pub fn store_reframe(&mut self, analysis: &ReframeAnalysis) -> Result<(), serde_json::Error> {
        self.reframe_json = Some(serde_json::to_string(analysis)?);
        Ok(())
    }

    /// 会话结束后丢弃分析结果
    pub fn take_reframe(&mut self) -> Option<ReframeAnalysis> {
        let analysis = self.reframe_analysis();
        self.reframe_json = None;
        analysis
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: Phase,
    pub turn: u32,
    pub max_turns: u32,
    pub followups_left: u32,
    pub history: Vec<Message>,
    pub input_locked: bool,
    pub error_message: Option<String>,
    pub end_of_session: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self::project(&SessionState::default(), Vec::new())
    }
}

impl UiState {
    /// 将会话状态与最新历史合并，得到 UI 可渲染的 UiState
    pub fn project(state: &SessionState, history: Vec<Message>) -> Self {
        Self {
            phase: state.phase,
            turn: state.turn,
            max_turns: state.max_turns,
            followups_left: state.followups_left,
            history,
            input_locked: false,
            error_message: None,
            end_of_session: state.phase.is_terminal(),
        }
    }

    pub fn locked(mut self) -> Self {
        self.input_locked = true;
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}
