//! 输出契约解析：<ui>…</ui> 与 <control>{json}</control>
//!
//! parse_model_output 从模型原文中取出第一个 ui 块与第一个 control 块。
//! control JSON 无法解析或缺少必填键时返回 None（视为「无信号」），不报错；
//! ui 文本会清洗掉泄漏的 control 块、代码围栏并压缩空白，没有 ui 标签时截断到字符上限。

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::ReframeAnalysis;

/// 模型每轮附带的结构化控制信号
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ControlBlock {
    pub next_phase: String,
    pub missing_fields: Vec<String>,
    pub suggest_questions: Vec<String>,
    pub crisis_detected: bool,
    // 以下可选字段各自独立解析，单个字段格式不对只丢弃该字段
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<ConfidenceShift>")]
    pub confidence_shift: Option<ConfidenceShift>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<SudsReading>")]
    pub suds: Option<SudsReading>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(with = "Option<ReframeAnalysis>")]
    pub reframe: Option<ReframeAnalysis>,
}

/// 对原始想法的相信程度（0-100）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfidenceShift {
    #[serde(default, deserialize_with = "lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub before: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub after: Option<u8>,
}

/// 主观痛苦程度 SUDS（0-100）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SudsReading {
    #[serde(default, deserialize_with = "lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub pre: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    #[schemars(with = "Option<u8>")]
    pub post: Option<u8>,
}

/// 可选子结构：类型不符时视为缺失，不影响整个 control 块
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!("Optional control field ignored: {}", e);
            None
        }
    }))
}

/// 0-100 的评分：数字（含小数、负数、超界）取整并夹到 0-100，"70" / "70%" 也接受，其余视为缺失
pub(crate) fn lenient_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(score_from_value))
}

fn score_from_value(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then(|| n.round().clamp(0.0, 100.0) as u8)
}

impl ControlBlock {
    /// control 块的 JSON Schema，拼进系统提示的输出契约
    pub fn schema_json() -> String {
        let schema = schemars::schema_for!(ControlBlock);
        serde_json::to_string(&schema).unwrap_or_default()
    }
}

/// 单轮模型输出的解析结果
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedOutput {
    /// 清洗后的 ui 文本；为空表示需要用兜底回复
    pub ui_text: String,
    pub control: Option<ControlBlock>,
    /// 原文是否包含 <ui> 标签
    pub ui_tagged: bool,
}

fn ui_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<ui>(.*?)</ui>").expect("valid ui regex"))
}

fn control_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<control>(.*?)</control>").expect("valid control regex"))
}

fn unclosed_control_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<control>.*$").expect("valid control tail regex"))
}

fn stray_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?(ui|control)>").expect("valid tag regex"))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("valid fence regex"))
}

fn inline_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x0B\x0C\r]+").expect("valid space regex"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n[\s\n]*").expect("valid blank line regex"))
}

/// 解析 control 负载；允许外层包一层 ```json 围栏
pub fn parse_control(payload: &str) -> Option<ControlBlock> {
    let trimmed = payload.trim();
    let json_str = match trimmed.find('{') {
        Some(start) => match trimmed.rfind('}') {
            Some(end) if end > start => &trimmed[start..=end],
            _ => trimmed,
        },
        None => trimmed,
    };
    match serde_json::from_str::<ControlBlock>(json_str) {
        Ok(control) => Some(control),
        Err(e) => {
            tracing::debug!("Control block ignored ({}): {}", e, json_str);
            None
        }
    }
}

/// 清洗 ui 文本：去掉 control 块与残留标签、代码围栏，压缩空白
pub fn sanitize_ui(text: &str) -> String {
    let text = control_re().replace_all(text, "");
    let text = unclosed_control_re().replace_all(&text, "");
    let text = stray_tag_re().replace_all(&text, "");
    let text = fence_re().replace_all(&text, "");
    let text = inline_space_re().replace_all(&text, " ");
    let text = text
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    let text = blank_lines_re().replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// 按字符数截断（不在 UTF-8 中间切断）
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// 解析模型原文
pub fn parse_model_output(raw: &str, ui_char_limit: usize) -> ParsedOutput {
    let control = control_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_control(m.as_str()));

    match ui_re().captures(raw).and_then(|c| c.get(1)) {
        Some(ui) => ParsedOutput {
            ui_text: sanitize_ui(ui.as_str()),
            control,
            ui_tagged: true,
        },
        None => ParsedOutput {
            ui_text: truncate_chars(&sanitize_ui(raw), ui_char_limit),
            control,
            ui_tagged: false,
        },
    }
}
