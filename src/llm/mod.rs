//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及到编排器 ModelCall 的适配
//!
//! DeepSeek 走 OpenAI 兼容端点，不单独实现客户端。

pub mod mock;
pub mod openai;
pub mod traits;
pub mod turn_model;

use std::sync::Arc;

use crate::config::AppConfig;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
pub use turn_model::LlmTurnModel;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// 实际选用的后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    DeepSeek,
    OpenAi,
    Mock,
}

/// provider 配置 + 可用的 Key 决定后端；provider=deepseek 时 OPENAI_API_KEY 也可用于 DeepSeek 端点
fn resolve_backend(provider: &str, deepseek_key: bool, openai_key: bool) -> Backend {
    match provider {
        "mock" => Backend::Mock,
        "deepseek" if deepseek_key || openai_key => Backend::DeepSeek,
        "openai" if openai_key => Backend::OpenAi,
        _ if deepseek_key => Backend::DeepSeek,
        _ if openai_key => Backend::OpenAi,
        _ => Backend::Mock,
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let provider = cfg.llm.provider.to_lowercase();

    match resolve_backend(&provider, deepseek_key.is_some(), openai_key.is_some()) {
        Backend::DeepSeek => {
            let model = cfg
                .llm
                .deepseek
                .model
                .clone()
                .unwrap_or_else(|| cfg.llm.model.clone());
            let base = cfg.llm.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);
            tracing::info!("Using DeepSeek LLM ({} @ {})", model, base);
            Arc::new(OpenAiClient::new(
                Some(base),
                &model,
                deepseek_key.or(openai_key).as_deref(),
            ))
        }
        Backend::OpenAi => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                openai_key.as_deref(),
            ))
        }
        Backend::Mock => {
            if provider != "mock" {
                tracing::warn!("No API key for provider '{}', using Mock LLM", provider);
            }
            Arc::new(MockLlmClient)
        }
    }
}
