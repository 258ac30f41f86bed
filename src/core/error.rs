//! 会话错误类型
//!
//! 编排器只把自己无法在本地消化的失败抛给调用方：模型调用失败、状态序列化失败、归档写入失败。
//! 输出格式错误、危机拦截、追问预算耗尽都在本地确定性处理，不属于错误。

use thiserror::Error;

use crate::llm::LlmError;

/// 会话处理过程中向上传播的错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 模型调用失败，原样交给调用方决定重试或占位回复
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("State serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Archive failed: {0}")]
    Archive(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SessionError {
    fn from(e: config::ConfigError) -> Self {
        SessionError::Config(e.to_string())
    }
}
