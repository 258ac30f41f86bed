//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REFRAME__*` 覆盖（双下划线表示嵌套，如 `REFRAME__SESSION__MAX_TURNS=12`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub safety: SafetySection,
}

/// [app] 段：应用名、归档目录、传给模型的历史轮数
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话结束后写入 JSON 归档的目录，未设置时不归档
    pub archive_dir: Option<PathBuf>,
    /// 传给模型的最近对话轮数
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            archive_dir: None,
            history_turns: default_history_turns(),
        }
    }
}

fn default_history_turns() -> usize {
    8
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [session] 段：轮数预算、追问预算、默认语言、无标签输出的截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_followup_budget")]
    pub followup_budget: u32,
    #[serde(default = "default_language")]
    pub default_language: String,
    /// 模型未输出 <ui> 标签时，清洗后的原文最多保留的字符数
    #[serde(default = "default_ui_char_limit")]
    pub ui_char_limit: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            followup_budget: default_followup_budget(),
            default_language: default_language(),
            ui_char_limit: default_ui_char_limit(),
        }
    }
}

fn default_max_turns() -> u32 {
    20
}

fn default_followup_budget() -> u32 {
    3
}

fn default_language() -> String {
    "en".to_string()
}

fn default_ui_char_limit() -> usize {
    1200
}

/// [prompts] 段：语言包目录（每种语言一个 <lang>.toml）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub dir: Option<PathBuf>,
}

/// [safety] 段：在内置危机关键词之外追加的短语
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SafetySection {
    #[serde(default)]
    pub extra_keywords: Vec<String>,
}

/// 从 config 目录加载配置，环境变量 REFRAME__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REFRAME__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REFRAME")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.session.max_turns, 20);
        assert_eq!(cfg.session.followup_budget, 3);
        assert_eq!(cfg.session.default_language, "en");
        assert_eq!(cfg.app.history_turns, 8);
        assert!(cfg.safety.extra_keywords.is_empty());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[session]\nmax_turns = 10\nfollowup_budget = 1\n\n[safety]\nextra_keywords = [\"give up on everything\"]\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.session.max_turns, 10);
        assert_eq!(cfg.session.followup_budget, 1);
        assert_eq!(cfg.session.default_language, "en");
        assert_eq!(cfg.safety.extra_keywords, vec!["give up on everything"]);
    }
}
