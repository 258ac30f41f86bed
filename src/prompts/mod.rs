//! Prompt 层：语言包（人设、阶段引导、微知识、固定话术）与按阶段组装系统提示

pub mod composer;
pub mod pack;

pub use composer::{ComposedPrompt, PromptComposer};
pub use pack::{normalize_language, PromptLibrary, PromptPack};
