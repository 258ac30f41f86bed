//! 危机关键词拦截
//!
//! 在任何模型调用之前对用户原文做大小写无关的子串匹配（不做 NLP）。
//! 命中后由编排器直接走安全总结路径，本轮不调用模型。

/// 内置关键词：自伤、自杀、伤害他人（英文 + 中文）
const DEFAULT_KEYWORDS: &[&str] = &[
    "kill myself",
    "killing myself",
    "end my life",
    "ending my life",
    "take my own life",
    "suicide",
    "suicidal",
    "want to die",
    "wanna die",
    "better off dead",
    "no reason to live",
    "hurt myself",
    "harm myself",
    "self-harm",
    "self harm",
    "cut myself",
    "overdose",
    "kill someone",
    "hurt someone",
    "kill him",
    "kill her",
    "kill them",
    "自杀",
    "轻生",
    "不想活",
    "想死",
    "结束生命",
    "结束自己的生命",
    "伤害自己",
    "自残",
    "割腕",
    "杀了他",
    "杀了她",
    "杀人",
];

/// 危机关键词扫描器（同步、无外部依赖、不会失败）
#[derive(Debug, Clone)]
pub struct CrisisGate {
    keywords: Vec<String>,
}

impl Default for CrisisGate {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl CrisisGate {
    /// 内置关键词 + 配置追加的短语（空串忽略）
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect();
        for k in extra {
            let k = k.as_ref().trim().to_lowercase();
            if !k.is_empty() && !keywords.contains(&k) {
                keywords.push(k);
            }
        }
        Self { keywords }
    }

    /// 返回第一个命中的关键词
    pub fn matched(&self, text: &str) -> Option<&str> {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lower.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn scan(&self, text: &str) -> bool {
        self.matched(text).is_some()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_match() {
        let gate = CrisisGate::default();
        assert!(gate.scan("I want to KILL MYSELF"));
        assert!(gate.scan("sometimes I think about Suicide"));
        assert_eq!(gate.matched("I want to kill myself"), Some("kill myself"));
    }

    #[test]
    fn test_chinese_keywords() {
        let gate = CrisisGate::default();
        assert!(gate.scan("我真的不想活了"));
        assert!(!gate.scan("今天工作压力很大"));
    }

    #[test]
    fn test_ordinary_text_passes() {
        let gate = CrisisGate::default();
        assert!(!gate.scan("My boss criticised my report and I feel useless"));
        assert!(!gate.scan(""));
    }

    #[test]
    fn test_extra_keywords() {
        let gate = CrisisGate::new(["  Disappear Forever ", ""]);
        assert!(gate.scan("I just want to disappear forever"));
        assert_eq!(gate.keywords().len(), DEFAULT_KEYWORDS.len() + 1);
    }
}
