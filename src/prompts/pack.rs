//! 语言包：人设、阶段引导、微知识与固定话术
//!
//! 提示词是数据而不是控制流：内置 en / zh 两套，可从 config/prompts/<lang>.toml 覆盖或新增语言。
//! TOML 中缺省的键沿用英文内置值。

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::core::Phase;

/// 单一语言的全部提示文本
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptPack {
    pub persona: String,
    /// 输出契约；`{schema}` 会被替换为 control 块的 JSON Schema
    pub output_contract: String,
    pub language_instruction: String,
    pub crisis_note: String,
    /// Clarify 阶段提示尚缺字段时的前缀
    pub missing_fields_hint: String,
    pub guidance: BTreeMap<Phase, String>,
    pub knowledge: BTreeMap<Phase, String>,
    pub phase_names: BTreeMap<Phase, String>,
    pub safety_message: String,
    pub safety_banner: String,
    pub closing_message: String,
    pub closed_message: String,
    pub fallback_ui: String,
    pub halfway_banner: String,
    /// `{from}` / `{to}` 为阶段显示名
    pub phase_banner: String,
}

impl Default for PromptPack {
    fn default() -> Self {
        Self::english()
    }
}

fn phase_map(entries: [(Phase, &str); 6]) -> BTreeMap<Phase, String> {
    entries.into_iter().map(|(p, s)| (p, s.to_string())).collect()
}

impl PromptPack {
    pub fn english() -> Self {
        Self {
            persona: "You are a warm, concise CBT (cognitive behavioral therapy) coach. \
                You help one person look at a single upsetting situation, notice the automatic thought, \
                name any cognitive distortions and arrive at a balanced, believable alternative thought. \
                You are not a therapist and never diagnose. Ask one question at a time and keep replies under 120 words."
                .into(),
            output_contract: "OUTPUT CONTRACT (mandatory):\n\
                1. First write the message for the user inside <ui>...</ui>.\n\
                2. Then write exactly one <control>{json}</control> block whose JSON matches this schema: {schema}\n\
                Required keys: next_phase (one of warmup, clarify, reframe, summary, followup, closed), \
                missing_fields (subset of situation, thought, emotion, intensity), suggest_questions, crisis_detected.\n\
                Never put anything outside these two blocks."
                .into(),
            language_instruction: "Reply in English.".into(),
            crisis_note: "SAFETY: the person may be at risk. Do not continue the exercise. \
                Acknowledge their pain, encourage contacting local emergency services or a crisis line, and keep it brief."
                .into(),
            missing_fields_hint: "Still missing:".into(),
            guidance: phase_map([
                (Phase::Warmup, "Greet the person, explain in one sentence how the exercise works and ask what situation is on their mind. Suggest next_phase=clarify once they describe something."),
                (Phase::Clarify, "Collect the situation, the automatic thought, the main emotion and its intensity (0-100). Ask for one missing field per turn. When all four are known, report a SUDS reading in control.suds.pre and suggest next_phase=reframe."),
                (Phase::Reframe, "Identify up to three cognitive distortions, weigh evidence for and against the thought and co-create a balanced thought. Put the result in control.reframe and the belief ratings in control.confidence_shift, then suggest next_phase=summary."),
                (Phase::Summary, "Summarise the situation, the distortions noticed and the balanced thought in a few lines. Ask how distressing the situation feels now (control.suds.post) and suggest next_phase=followup."),
                (Phase::Followup, "Answer brief follow-up questions about the exercise. Do not start a new topic. Suggest next_phase=closed when the person is done."),
                (Phase::Closed, "The session is over. Thank the person and say goodbye."),
            ]),
            knowledge: phase_map([
                (Phase::Warmup, "CBT links situations, thoughts, emotions and behaviour; changing how we read a situation changes how we feel."),
                (Phase::Clarify, "An automatic thought is the quick interpretation that pops up; rate emotion intensity 0-100 (SUDS)."),
                (Phase::Reframe, "Common distortions: catastrophizing, mind reading, all-or-nothing thinking, overgeneralization, labeling, should statements, emotional reasoning, discounting the positive."),
                (Phase::Summary, "A good balanced thought is specific, believable and acknowledges both the evidence for and against."),
                (Phase::Followup, "A micro-action is a small experiment under 10 minutes that tests the balanced thought."),
                (Phase::Closed, "Thank the person for their effort."),
            ]),
            phase_names: phase_map([
                (Phase::Warmup, "Warm-up"),
                (Phase::Clarify, "Clarify"),
                (Phase::Reframe, "Reframe"),
                (Phase::Summary, "Summary"),
                (Phase::Followup, "Follow-up"),
                (Phase::Closed, "Closed"),
            ]),
            safety_message: "I'm really sorry you're going through this. Your safety matters more than this exercise. \
                If you might act on these thoughts, please contact your local emergency number now, \
                or reach a crisis line such as 988 (US) or your local equivalent. \
                You don't have to handle this alone; reaching out to someone you trust right now can help."
                .into(),
            safety_banner: "Safety check: pausing the exercise and moving to a safe summary.".into(),
            closing_message: "Thank you for working through this today. The session is now closed; \
                take your balanced thought with you and be kind to yourself."
                .into(),
            closed_message: "This session is closed. Start a new session whenever you'd like to work on another situation."
                .into(),
            fallback_ui: "Thanks for sharing that.".into(),
            halfway_banner: "We're about halfway through this session.".into(),
            phase_banner: "Phase: {from} → {to}".into(),
        }
    }

    pub fn chinese() -> Self {
        Self {
            persona: "你是一位温和、简洁的 CBT（认知行为疗法）练习教练。\
                你帮助对方聚焦一个令人困扰的具体情境，觉察自动化思维，识别认知扭曲，并得到一个平衡、可信的替代想法。\
                你不是治疗师，不做诊断。每次只问一个问题，回复不超过 150 字。"
                .into(),
            output_contract: "输出契约（必须遵守）：\n\
                1. 先在 <ui>...</ui> 中写给用户的话。\n\
                2. 然后输出且仅输出一个 <control>{json}</control>，JSON 需符合此 Schema：{schema}\n\
                必填键：next_phase（warmup、clarify、reframe、summary、followup、closed 之一）、\
                missing_fields（situation、thought、emotion、intensity 的子集）、suggest_questions、crisis_detected。\n\
                两个块之外不要输出任何内容。"
                .into(),
            language_instruction: "请用简体中文回复。".into(),
            crisis_note: "安全提示：对方可能处于危险中。不要继续练习，简短地回应其痛苦，鼓励联系当地急救电话或心理危机热线。"
                .into(),
            missing_fields_hint: "仍缺少：".into(),
            guidance: phase_map([
                (Phase::Warmup, "问候对方，用一句话说明练习方式，并询问最近困扰他的情境。对方描述情境后建议 next_phase=clarify。"),
                (Phase::Clarify, "依次收集情境、自动化思维、主要情绪及其强度（0-100），每轮只问一个缺失项。四项齐全后在 control.suds.pre 给出痛苦评分并建议 next_phase=reframe。"),
                (Phase::Reframe, "识别最多三种认知扭曲，权衡支持与反对该想法的证据，共同得出平衡想法。结果写入 control.reframe，相信程度写入 control.confidence_shift，然后建议 next_phase=summary。"),
                (Phase::Summary, "用几行话总结情境、识别到的认知扭曲和平衡想法。询问现在的痛苦程度（control.suds.post）并建议 next_phase=followup。"),
                (Phase::Followup, "简短回答关于本次练习的追问，不开启新话题。对方结束时建议 next_phase=closed。"),
                (Phase::Closed, "会话已结束，感谢对方并道别。"),
            ]),
            knowledge: phase_map([
                (Phase::Warmup, "CBT 认为情境、想法、情绪与行为相互关联；换一种解读情境的方式，感受也会随之改变。"),
                (Phase::Clarify, "自动化思维是脑中瞬间冒出的解读；情绪强度用 0-100 评分（SUDS）。"),
                (Phase::Reframe, "常见认知扭曲：灾难化、读心术、非黑即白、过度概括、贴标签、应该句式、情绪化推理、忽视积极面。"),
                (Phase::Summary, "好的平衡想法具体、可信，并同时承认支持与反对的证据。"),
                (Phase::Followup, "微行动是 10 分钟以内、用来检验平衡想法的小实验。"),
                (Phase::Closed, "感谢对方的投入。"),
            ]),
            phase_names: phase_map([
                (Phase::Warmup, "热身"),
                (Phase::Clarify, "澄清"),
                (Phase::Reframe, "重构"),
                (Phase::Summary, "总结"),
                (Phase::Followup, "追问"),
                (Phase::Closed, "已结束（Closed）"),
            ]),
            safety_message: "听到你这样说，我很担心你。你的安全比这个练习重要得多。\
                如果你可能会伤害自己，请立即拨打 120 / 110，或拨打心理援助热线 400-161-9995、010-82951332。\
                你不必独自承受，现在就联系一位你信任的人也会有帮助。"
                .into(),
            safety_banner: "安全检查：暂停练习，转入安全总结。".into(),
            closing_message: "谢谢你今天认真完成练习。本次会话已结束，带上你的平衡想法，也请善待自己。".into(),
            closed_message: "本次会话已结束。想处理另一个情境时，可以随时开始新的会话。".into(),
            fallback_ui: "谢谢你的分享。".into(),
            halfway_banner: "本次会话已过半。".into(),
            phase_banner: "阶段：{from} → {to}".into(),
        }
    }

    pub fn phase_name(&self, phase: Phase) -> &str {
        self.phase_names
            .get(&phase)
            .map(String::as_str)
            .unwrap_or_else(|| phase.label())
    }

    pub fn guidance_for(&self, phase: Phase) -> &str {
        self.guidance.get(&phase).map(String::as_str).unwrap_or("")
    }

    pub fn knowledge_for(&self, phase: Phase) -> &str {
        self.knowledge.get(&phase).map(String::as_str).unwrap_or("")
    }

    pub fn phase_change_banner(&self, from: Phase, to: Phase) -> String {
        self.phase_banner
            .replace("{from}", self.phase_name(from))
            .replace("{to}", self.phase_name(to))
    }
}

/// 多语言提示库：按语言代码取语言包，未知语言回退到英文
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    packs: HashMap<String, PromptPack>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

/// "zh-CN" / "zh_TW" / "ZH" → "zh"
pub fn normalize_language(lang: &str) -> String {
    lang.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

impl PromptLibrary {
    pub fn builtin() -> Self {
        let mut packs = HashMap::new();
        packs.insert("en".to_string(), PromptPack::english());
        packs.insert("zh".to_string(), PromptPack::chinese());
        Self { packs }
    }

    /// 在内置语言包之上加载目录中的 <lang>.toml；目录不存在时只返回内置包
    pub fn load_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut library = Self::builtin();
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(library);
        }

        for entry in std::fs::read_dir(dir)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(lang) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            match toml::from_str::<PromptPack>(&content) {
                Ok(pack) => {
                    library.insert(lang, pack);
                }
                Err(e) => tracing::warn!("Skipping prompt pack {}: {}", path.display(), e),
            }
        }

        tracing::info!("Loaded {} prompt packs", library.packs.len());
        Ok(library)
    }

    pub fn insert(&mut self, lang: &str, pack: PromptPack) {
        self.packs.insert(normalize_language(lang), pack);
    }

    pub fn pack(&self, lang: &str) -> &PromptPack {
        self.packs
            .get(&normalize_language(lang))
            .or_else(|| self.packs.get("en"))
            .unwrap_or_else(|| english_fallback())
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut langs: Vec<&str> = self.packs.keys().map(String::as_str).collect();
        langs.sort_unstable();
        langs
    }
}

fn english_fallback() -> &'static PromptPack {
    static PACK: std::sync::OnceLock<PromptPack> = std::sync::OnceLock::new();
    PACK.get_or_init(PromptPack::english)
}
