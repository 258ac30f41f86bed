//! 阶段编排器：单轮处理
//!
//! 每轮顺序固定：危机扫描 → Prompt 组装 → 一次模型调用 → 输出解析 → 状态修改。
//! 编排器不持有模型客户端，只接收一个 [`ModelCall`]，与具体后端解耦；
//! 模型调用失败原样向上传播，输出格式问题则在本地降级处理。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::AppConfig;
use crate::core::{parse_model_output, ControlBlock, CrisisGate, Phase, SessionError, SessionState};
use crate::llm::LlmError;
use crate::prompts::{PromptComposer, PromptLibrary, PromptPack};

/// 一次模型调用的全部输入
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_prompt: &'a str,
    pub knowledge: &'a str,
    pub state: &'a serde_json::Value,
    pub user_text: &'a str,
}

/// 编排器调用模型的唯一入口
#[async_trait]
pub trait ModelCall: Send + Sync {
    async fn call(&self, request: &ModelRequest<'_>) -> Result<String, LlmError>;
}

/// 单轮处理结果
#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub phase: Phase,
    pub turn: u32,
    pub followups_left: u32,
    /// 阶段变化、过半提醒、安全提示等给人看的说明
    pub banner: Option<String>,
    pub ui_text: String,
    /// 本轮解析出的 control 块；无信号时为 None
    pub control: Option<ControlBlock>,
    pub state: serde_json::Value,
    pub end_of_session: bool,
}

pub struct PhaseOrchestrator {
    composer: PromptComposer,
    crisis: CrisisGate,
    ui_char_limit: usize,
}

impl PhaseOrchestrator {
    pub fn new(composer: PromptComposer, crisis: CrisisGate, ui_char_limit: usize) -> Self {
        Self {
            composer,
            crisis,
            ui_char_limit,
        }
    }

    pub fn from_config(cfg: &AppConfig, library: Arc<PromptLibrary>) -> Self {
        Self::new(
            PromptComposer::new(library),
            CrisisGate::new(&cfg.safety.extra_keywords),
            cfg.session.ui_char_limit,
        )
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    /// 处理一轮用户输入并就地修改 state
    pub async fn handle_turn(
        &self,
        state: &mut SessionState,
        user_text: &str,
        model: &dyn ModelCall,
    ) -> Result<TurnResult, SessionError> {
        let start = state.phase;
        state.turn = state.turn.saturating_add(1);
        if state.turn == 1 && contains_cjk(user_text) {
            state.user_language = "zh".to_string();
        }
        let mut banners = Vec::new();

        if let Some(keyword) = self.crisis.matched(user_text) {
            tracing::warn!(turn = state.turn, phase = %start, "Crisis keyword matched: {}", keyword);
            state.crisis_flag = true;
            if start == Phase::Followup {
                state.followups_left = state.followups_left.saturating_sub(1);
            }
            state.phase = start.max(Phase::Summary);
            let pack = self.composer.pack(&state.user_language);
            banners.push(pack.safety_banner.clone());
            let message = pack.safety_message.clone();
            return self.finish(state, start, banners, message, None);
        }

        if start == Phase::Closed {
            let message = self.composer.pack(&state.user_language).closed_message.clone();
            return self.finish(state, start, banners, message, None);
        }

        if start == Phase::Followup && state.followups_left == 0 {
            state.phase = Phase::Closed;
            let message = self.composer.pack(&state.user_language).closing_message.clone();
            return self.finish(state, start, banners, message, None);
        }

        let prompt = self.composer.compose(state);
        let state_json = state.to_json()?;
        let raw = model
            .call(&ModelRequest {
                system_prompt: &prompt.system_prompt,
                knowledge: &prompt.knowledge,
                state: &state_json,
                user_text,
            })
            .await?;

        let parsed = parse_model_output(&raw, self.ui_char_limit);
        if !parsed.ui_tagged {
            tracing::debug!(turn = state.turn, "Model output had no <ui> block");
        }

        if start == Phase::Followup {
            state.followups_left = state.followups_left.saturating_sub(1);
        }

        let pack = self.composer.pack(&state.user_language);
        let mut next = start;
        if let Some(control) = &parsed.control {
            next = start.advance_by_label(&control.next_phase);
            absorb_control(state, start, control)?;
            if control.crisis_detected {
                tracing::warn!(turn = state.turn, "Model reported a crisis");
                state.crisis_flag = true;
                next = next.max(Phase::Summary);
                banners.push(pack.safety_banner.clone());
            }
        }

        if state.turn == state.max_turns / 2 && start <= Phase::Reframe {
            banners.push(pack.halfway_banner.clone());
        }
        if state.turn.saturating_add(1) >= state.max_turns {
            next = next.max(Phase::Summary);
        }
        state.phase = next;

        let ui_text = if parsed.ui_text.is_empty() {
            pack.fallback_ui.clone()
        } else {
            parsed.ui_text
        };
        self.finish(state, start, banners, ui_text, parsed.control)
    }

    fn finish(
        &self,
        state: &SessionState,
        start: Phase,
        mut banners: Vec<String>,
        ui_text: String,
        control: Option<ControlBlock>,
    ) -> Result<TurnResult, SessionError> {
        if state.phase != start {
            tracing::info!(turn = state.turn, "Phase {} -> {}", start, state.phase);
            let pack: &PromptPack = self.composer.pack(&state.user_language);
            banners.push(pack.phase_change_banner(start, state.phase));
        }

        Ok(TurnResult {
            phase: state.phase,
            turn: state.turn,
            followups_left: state.followups_left,
            banner: (!banners.is_empty()).then(|| banners.join("\n")),
            ui_text,
            control,
            state: state.to_json()?,
            end_of_session: state.phase.is_terminal(),
        })
    }
}

/// control 块的附带信号：采集进度、SUDS、相信程度、重构分析
fn absorb_control(
    state: &mut SessionState,
    start: Phase,
    control: &ControlBlock,
) -> Result<(), SessionError> {
    if matches!(start, Phase::Warmup | Phase::Clarify) {
        state.progress.absorb_missing(&control.missing_fields);
    }
    if let Some(suds) = &control.suds {
        if let Some(pre) = suds.pre {
            state.suds_pre = Some(pre.min(100));
        }
        if let Some(post) = suds.post {
            state.suds_post = Some(post.min(100));
        }
    }
    if let Some(shift) = &control.confidence_shift {
        if let Some(before) = shift.before {
            state.confidence_pre = Some(before.min(100));
        }
        if let Some(after) = shift.after {
            state.confidence_post = Some(after.min(100));
        }
    }
    if let Some(analysis) = &control.reframe {
        state.store_reframe(analysis)?;
    }
    Ok(())
}

fn contains_cjk(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// 按顺序返回预设输出，并记录调用次数与收到的请求
    struct ScriptedModel {
        outputs: Mutex<Vec<String>>,
        calls: AtomicUsize,
        last_system: Mutex<String>,
    }

    impl ScriptedModel {
        fn new(outputs: &[&str]) -> Self {
            Self {
                outputs: Mutex::new(outputs.iter().rev().map(|s| s.to_string()).collect()),
                calls: AtomicUsize::new(0),
                last_system: Mutex::new(String::new()),
            }
        }

        fn repeating(output: &str, n: usize) -> Self {
            Self::new(&vec![output; n])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelCall for ScriptedModel {
        async fn call(&self, request: &ModelRequest<'_>) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_system.lock().unwrap() = request.system_prompt.to_string();
            self.outputs
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::Request("script exhausted".into()))
        }
    }

    fn output(next_phase: &str) -> String {
        format!(
            "<ui>ok</ui><control>{{\"next_phase\":\"{}\",\"missing_fields\":[],\"suggest_questions\":[],\"crisis_detected\":false}}</control>",
            next_phase
        )
    }

    fn orchestrator() -> PhaseOrchestrator {
        PhaseOrchestrator::from_config(&AppConfig::default(), Arc::new(PromptLibrary::builtin()))
    }

    fn state_at(phase: Phase) -> SessionState {
        let mut state = SessionState::default();
        state.phase = phase;
        state
    }

    #[tokio::test]
    async fn test_round_trip_from_warmup() {
        let orch = orchestrator();
        let mut state = SessionState::default();
        let model = ScriptedModel::new(&[
            "<ui>hello</ui>\n<control>{\"next_phase\":\"clarify\",\"missing_fields\":[],\"suggest_questions\":[],\"crisis_detected\":false}</control>",
        ]);

        let result = orch.handle_turn(&mut state, "hi", &model).await.unwrap();
        assert_eq!(result.ui_text, "hello");
        assert_eq!(result.phase, Phase::Clarify);
        assert_eq!(state.phase, Phase::Clarify);
        assert_eq!(result.turn, 1);
        assert_eq!(result.banner.as_deref(), Some("Phase: Warm-up → Clarify"));
        assert_eq!(result.state["phase"], "clarify");
        assert!(result.control.is_some());
        assert!(!result.end_of_session);
    }

    #[tokio::test]
    async fn test_model_cannot_skip_phases() {
        let orch = orchestrator();
        let mut state = SessionState::default();
        let model = ScriptedModel::new(&[&output("followup")]);
        let result = orch.handle_turn(&mut state, "hi", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Clarify);
    }

    #[tokio::test]
    async fn test_model_cannot_regress() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Reframe);
        let model = ScriptedModel::new(&[&output("warmup")]);
        let result = orch.handle_turn(&mut state, "hmm", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Reframe);
        assert!(result.banner.is_none());
    }

    #[tokio::test]
    async fn test_unknown_phase_label_ignored() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[&output("discovery")]);
        let result = orch.handle_turn(&mut state, "hmm", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Clarify);
        assert!(result.control.is_some());
    }

    #[tokio::test]
    async fn test_malformed_control_keeps_phase() {
        let orch = orchestrator();
        for raw in [
            "<ui>hi</ui><control>{not json}</control>",
            "<ui>hi</ui><control>{\"next_phase\":\"reframe\"}</control>",
            "<ui>hi</ui>",
            "",
        ] {
            let mut state = state_at(Phase::Clarify);
            let model = ScriptedModel::new(&[raw]);
            let result = orch.handle_turn(&mut state, "text", &model).await.unwrap();
            assert_eq!(state.phase, Phase::Clarify);
            assert!(result.control.is_none());
        }
    }

    #[tokio::test]
    async fn test_empty_ui_uses_fallback() {
        let orch = orchestrator();
        let mut state = SessionState::default();
        let model = ScriptedModel::new(&["<ui>  ```  </ui>"]);
        let result = orch.handle_turn(&mut state, "hi", &model).await.unwrap();
        assert_eq!(result.ui_text, "Thanks for sharing that.");
    }

    #[tokio::test]
    async fn test_crisis_short_circuits_without_model_call() {
        let orch = orchestrator();
        for phase in [Phase::Warmup, Phase::Clarify, Phase::Reframe, Phase::Summary] {
            let mut state = state_at(phase);
            let model = ScriptedModel::new(&[]);
            let result = orch
                .handle_turn(&mut state, "I want to kill myself", &model)
                .await
                .unwrap();
            assert_eq!(model.calls(), 0);
            assert!(state.crisis_flag);
            assert_eq!(result.phase, Phase::Summary);
            assert!(result.banner.unwrap().contains("Safety"));
            assert!(result.ui_text.contains("emergency"));
            assert!(!result.end_of_session);
            assert_eq!(result.state["crisis_flag"], true);
        }
    }

    #[tokio::test]
    async fn test_crisis_when_closed_stays_closed() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Closed);
        let model = ScriptedModel::new(&[]);
        let result = orch
            .handle_turn(&mut state, "I want to KILL MYSELF", &model)
            .await
            .unwrap();
        assert_eq!(model.calls(), 0);
        assert!(state.crisis_flag);
        assert_eq!(result.phase, Phase::Closed);
        assert!(result.end_of_session);
    }

    #[tokio::test]
    async fn test_crisis_prompt_note_on_following_turn() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[&output("summary")]);
        orch.handle_turn(&mut state, "I want to end my life", &model)
            .await
            .unwrap();
        orch.handle_turn(&mut state, "ok", &model).await.unwrap();
        assert_eq!(model.calls(), 1);
        assert!(model.last_system.lock().unwrap().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_model_reported_crisis() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[
            "<ui>I'm concerned.</ui><control>{\"next_phase\":\"clarify\",\"missing_fields\":[],\"suggest_questions\":[],\"crisis_detected\":true}</control>",
        ]);
        let result = orch.handle_turn(&mut state, "everything is dark", &model).await.unwrap();
        assert!(state.crisis_flag);
        assert_eq!(result.phase, Phase::Summary);
        assert_eq!(result.ui_text, "I'm concerned.");
    }

    #[tokio::test]
    async fn test_followup_budget_then_close() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Followup);
        let model = ScriptedModel::repeating(&output("followup"), 3);

        for expected_left in [2, 1, 0] {
            let result = orch.handle_turn(&mut state, "one more", &model).await.unwrap();
            assert_eq!(result.phase, Phase::Followup);
            assert_eq!(result.followups_left, expected_left);
        }

        let result = orch.handle_turn(&mut state, "and another", &model).await.unwrap();
        assert_eq!(model.calls(), 3);
        assert_eq!(result.phase, Phase::Closed);
        assert_eq!(result.followups_left, 0);
        assert!(result.end_of_session);
        assert!(result.banner.unwrap().contains("Closed"));
        assert!(result.ui_text.contains("closed"));

        let result = orch.handle_turn(&mut state, "hello?", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Closed);
        assert_eq!(result.followups_left, 0);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_followups_untouched_outside_followup() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Summary);
        let model = ScriptedModel::new(&[&output("followup")]);
        let result = orch.handle_turn(&mut state, "thanks", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Followup);
        assert_eq!(result.followups_left, 3);
    }

    #[tokio::test]
    async fn test_last_turn_forces_summary() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        state.max_turns = 6;
        state.turn = 4;
        let model = ScriptedModel::new(&[&output("clarify")]);
        let result = orch.handle_turn(&mut state, "more detail", &model).await.unwrap();
        assert_eq!(result.turn, 5);
        assert_eq!(result.phase, Phase::Summary);
    }

    #[tokio::test]
    async fn test_halfway_banner() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        state.max_turns = 10;
        state.turn = 4;
        let model = ScriptedModel::repeating(&output("clarify"), 2);
        let result = orch.handle_turn(&mut state, "x", &model).await.unwrap();
        assert!(result.banner.unwrap().contains("halfway"));

        let mut late = state_at(Phase::Summary);
        late.max_turns = 10;
        late.turn = 4;
        let result = orch.handle_turn(&mut late, "x", &model).await.unwrap();
        assert!(result.banner.is_none());
    }

    #[tokio::test]
    async fn test_turn_increments_every_call() {
        let orch = orchestrator();
        let mut state = SessionState::default();
        let model = ScriptedModel::repeating("garbage", 2);
        orch.handle_turn(&mut state, "a", &model).await.unwrap();
        orch.handle_turn(&mut state, "I want to kill myself", &model)
            .await
            .unwrap();
        orch.handle_turn(&mut state, "b", &model).await.unwrap();
        assert_eq!(state.turn, 3);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[]);
        let err = orch.handle_turn(&mut state, "hi", &model).await.unwrap_err();
        assert!(matches!(err, SessionError::Llm(_)));
        assert_eq!(state.phase, Phase::Clarify);
        assert_eq!(state.turn, 1);
    }

    #[tokio::test]
    async fn test_control_side_effects() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[
            r#"<ui>ok</ui><control>{"next_phase":"reframe","missing_fields":["intensity"],"suggest_questions":[],"crisis_detected":false,
                "suds":{"pre":250},"confidence_shift":{"before":90},
                "reframe":{"distortions":["mind reading"],"balanced_thought":"I don't know what they think."}}</control>"#,
        ]);
        orch.handle_turn(&mut state, "x", &model).await.unwrap();
        assert!(state.progress.situation && state.progress.thought && state.progress.emotion);
        assert!(!state.progress.intensity);
        assert_eq!(state.confidence_pre, Some(90));
        assert_eq!(
            state.reframe_analysis().unwrap().distortions,
            vec!["mind reading"]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_reading_still_advances() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Clarify);
        let model = ScriptedModel::new(&[
            "<ui>ok</ui><control>{\"next_phase\":\"reframe\",\"missing_fields\":[],\"suggest_questions\":[],\"crisis_detected\":false,\"suds\":{\"pre\":300}}</control>",
        ]);
        let result = orch.handle_turn(&mut state, "it was awful", &model).await.unwrap();
        assert_eq!(result.phase, Phase::Reframe);
        assert!(result.control.is_some());
        assert_eq!(state.suds_pre, Some(100));
    }

    #[tokio::test]
    async fn test_crisis_with_exhausted_followups() {
        let orch = orchestrator();
        let mut state = state_at(Phase::Followup);
        state.followups_left = 0;
        let model = ScriptedModel::new(&[]);

        let result = orch.handle_turn(&mut state, "I want to end my life", &model).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert!(state.crisis_flag);
        assert_eq!(state.followups_left, 0);
        assert_eq!(result.phase, Phase::Followup);
        assert!(!result.end_of_session);
        assert!(result.ui_text.contains("safety"));
    }

    #[tokio::test]
    async fn test_first_turn_language_detection() {
        let orch = orchestrator();
        let mut state = SessionState::default();
        let model = ScriptedModel::new(&[""]);
        let result = orch.handle_turn(&mut state, "我最近压力很大", &model).await.unwrap();
        assert_eq!(state.user_language, "zh");
        assert_eq!(result.ui_text, "谢谢你的分享。");
        assert!(model.last_system.lock().unwrap().contains("简体中文"));
    }
}
