//! Prompt 组装（纯函数）
//!
//! 人设 + 输出契约 + 当前阶段引导 + 语言要求，外加按阶段查表得到的微知识片段。

use std::sync::Arc;

use crate::core::{ControlBlock, Phase, SessionState};
use crate::prompts::{PromptLibrary, PromptPack};

/// 一轮调用模型所需的两段文本
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPrompt {
    pub system_prompt: String,
    pub knowledge: String,
}

#[derive(Debug, Clone)]
pub struct PromptComposer {
    library: Arc<PromptLibrary>,
    control_schema: String,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(Arc::new(PromptLibrary::builtin()))
    }
}

impl PromptComposer {
    pub fn new(library: Arc<PromptLibrary>) -> Self {
        Self {
            library,
            control_schema: ControlBlock::schema_json(),
        }
    }

    pub fn pack(&self, lang: &str) -> &PromptPack {
        self.library.pack(lang)
    }

    pub fn compose(&self, state: &SessionState) -> ComposedPrompt {
        let pack = self.library.pack(&state.user_language);
        let phase = state.phase;

        let mut system = String::new();
        system.push_str(&pack.persona);
        system.push_str("\n\n");
        system.push_str(&pack.output_contract.replace("{schema}", &self.control_schema));
        system.push_str(&format!(
            "\n\n## {} ({})\n{}",
            pack.phase_name(phase),
            phase.label(),
            pack.guidance_for(phase)
        ));

        if matches!(phase, Phase::Warmup | Phase::Clarify) {
            let missing = state.progress.missing();
            if !missing.is_empty() {
                system.push_str(&format!("\n{} {}", pack.missing_fields_hint, missing.join(", ")));
            }
        }

        if phase == Phase::Summary {
            if let Some(raw) = state.reframe_json.as_deref() {
                system.push_str("\n\nREFRAME_ANALYSIS:\n");
                system.push_str(raw);
            }
        }

        if state.crisis_flag {
            system.push_str("\n\n");
            system.push_str(&pack.crisis_note);
        }

        system.push_str("\n\n");
        system.push_str(&pack.language_instruction);

        ComposedPrompt {
            system_prompt: system,
            knowledge: pack.knowledge_for(phase).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_warmup() {
        let composer = PromptComposer::default();
        let state = SessionState::default();
        let prompt = composer.compose(&state);
        assert!(prompt.system_prompt.contains("CBT"));
        assert!(prompt.system_prompt.contains("(warmup)"));
        assert!(prompt.system_prompt.contains("crisis_detected"));
        assert!(!prompt.system_prompt.contains("{schema}"));
        assert!(prompt.system_prompt.ends_with("Reply in English."));
        assert!(prompt.knowledge.contains("CBT links"));
    }

    #[test]
    fn test_knowledge_is_keyed_by_phase() {
        let composer = PromptComposer::default();
        let mut state = SessionState::default();
        state.phase = Phase::Reframe;
        let prompt = composer.compose(&state);
        assert!(prompt.knowledge.contains("catastrophizing"));
        assert!(!prompt.system_prompt.contains("Still missing"));
    }

    #[test]
    fn test_clarify_lists_missing_fields() {
        let composer = PromptComposer::default();
        let mut state = SessionState::default();
        state.phase = Phase::Clarify;
        state.progress.situation = true;
        let prompt = composer.compose(&state);
        assert!(prompt
            .system_prompt
            .contains("Still missing: thought, emotion, intensity"));
    }

    #[test]
    fn test_summary_carries_reframe_and_crisis_note() {
        let composer = PromptComposer::default();
        let mut state = SessionState::default();
        state.phase = Phase::Summary;
        state.crisis_flag = true;
        state.reframe_json = Some(r#"{"distortions":["labeling"]}"#.into());
        let prompt = composer.compose(&state);
        assert!(prompt.system_prompt.contains("REFRAME_ANALYSIS"));
        assert!(prompt.system_prompt.contains("labeling"));
        assert!(prompt.system_prompt.contains("SAFETY"));
    }

    #[test]
    fn test_chinese_pack_selected_by_language() {
        let composer = PromptComposer::default();
        let mut state = SessionState::default();
        state.user_language = "zh".into();
        let prompt = composer.compose(&state);
        assert!(prompt.system_prompt.ends_with("请用简体中文回复。"));
        assert!(prompt.system_prompt.contains("## 热身 (warmup)"));
    }
}
