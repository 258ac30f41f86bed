//! Reframe - 基于 CBT 的认知重构对话编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 阶段状态机、危机拦截、输出契约解析、单轮编排、会话与运行时
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）及单轮模型适配
//! - **memory**: 对话记录与会话归档
//! - **observability**: tracing 日志初始化
//! - **prompts**: 多语言提示词包与系统提示词组装
//! - **report**: 会话结束时的 Markdown 总结
//! - **ui**: Ratatui TUI 界面

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod report;
pub mod ui;
