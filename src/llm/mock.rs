//! Mock LLM 客户端（用于测试与无 API Key 时的本地体验）
//!
//! 从系统提示中读出当前阶段标签，按固定脚本输出符合 <ui>/<control> 契约的回复，
//! 每轮建议前进一个阶段；Followup 阶段停留，交给追问预算收尾。

use async_trait::async_trait;
use serde_json::json;

use crate::core::Phase;
use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient;

impl MockLlmClient {
    /// 系统提示中的 "(warmup)" 等标记
    fn current_phase(messages: &[Message]) -> Phase {
        messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(|m| {
                Phase::ALL
                    .into_iter()
                    .rev()
                    .find(|p| m.content.contains(&format!("({})", p.label())))
            })
            .unwrap_or(Phase::Warmup)
    }

    fn script(phase: Phase, last_user: &str) -> (String, serde_json::Value) {
        match phase {
            Phase::Warmup => (
                "Hi, thanks for being here. What situation has been on your mind?".to_string(),
                json!({
                    "next_phase": "clarify",
                    "missing_fields": ["thought", "emotion", "intensity"],
                    "suggest_questions": ["What went through your mind?"],
                    "crisis_detected": false
                }),
            ),
            Phase::Clarify => (
                format!("I hear you: \"{}\". Let's look at the thought behind it.", last_user),
                json!({
                    "next_phase": "reframe",
                    "missing_fields": [],
                    "suggest_questions": [],
                    "crisis_detected": false,
                    "suds": { "pre": 70 }
                }),
            ),
            Phase::Reframe => (
                "It sounds like one setback is being read as proof of failure. A more balanced view: this was one difficult moment, not the whole story.".to_string(),
                json!({
                    "next_phase": "summary",
                    "missing_fields": [],
                    "suggest_questions": [],
                    "crisis_detected": false,
                    "confidence_shift": { "before": 80, "after": 45 },
                    "reframe": {
                        "distortions": ["catastrophizing", "labeling"],
                        "evidence_for": ["The feedback was critical"],
                        "evidence_against": ["Previous work was praised", "Feedback targeted one section"],
                        "balanced_thought": "One critical review does not make me incompetent; I can fix this section.",
                        "micro_action": "Spend 10 minutes listing two concrete fixes.",
                        "certainty_before": 80,
                        "certainty_after": 45,
                        "tone": "warm"
                    }
                }),
            ),
            Phase::Summary => (
                "Here's what we found: a stressful moment, a harsh thought and a more balanced alternative. How distressing does it feel now?".to_string(),
                json!({
                    "next_phase": "followup",
                    "missing_fields": [],
                    "suggest_questions": [],
                    "crisis_detected": false,
                    "suds": { "post": 35 }
                }),
            ),
            Phase::Followup | Phase::Closed => (
                "Good question. Try the small experiment and notice what actually happens.".to_string(),
                json!({
                    "next_phase": "followup",
                    "missing_fields": [],
                    "suggest_questions": [],
                    "crisis_detected": false
                }),
            ),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let (ui, control) = Self::script(Self::current_phase(messages), last_user);
        Ok(format!("<ui>{}</ui>\n<control>{}</control>", ui, control))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse_model_output;

    #[tokio::test]
    async fn test_mock_follows_contract() {
        let messages = vec![
            Message::system("persona ... ## Clarify (clarify) ..."),
            Message::user("My boss ignored my email"),
        ];
        let raw = MockLlmClient.complete(&messages).await.unwrap();
        let parsed = parse_model_output(&raw, 1200);
        assert!(parsed.ui_tagged);
        assert!(parsed.ui_text.contains("My boss ignored my email"));
        assert_eq!(parsed.control.unwrap().next_phase, "reframe");
    }

    #[tokio::test]
    async fn test_mock_defaults_to_warmup() {
        let raw = MockLlmClient.complete(&[Message::user("hi")]).await.unwrap();
        let parsed = parse_model_output(&raw, 1200);
        assert_eq!(parsed.control.unwrap().next_phase, "clarify");
    }
}
