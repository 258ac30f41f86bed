//! 会话阶段：固定全序 Warmup → Clarify → Reframe → Summary → Followup → Closed
//!
//! 模型在 control 块里只能「建议」下一阶段，由 [`Phase::advance_towards`] 决定实际落点：
//! 每轮最多前进一步，不能回退，无法识别的标签视为原地不动。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Clarify,
    Reframe,
    Summary,
    Followup,
    Closed,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Warmup,
        Phase::Clarify,
        Phase::Reframe,
        Phase::Summary,
        Phase::Followup,
        Phase::Closed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Phase> {
        Self::ALL.get(index).copied()
    }

    /// 线上标签（与 control 块中的 next_phase 一致）
    pub fn label(self) -> &'static str {
        match self {
            Phase::Warmup => "warmup",
            Phase::Clarify => "clarify",
            Phase::Reframe => "reframe",
            Phase::Summary => "summary",
            Phase::Followup => "followup",
            Phase::Closed => "closed",
        }
    }

    /// 解析标签，忽略大小写与首尾空白；未知标签返回 None
    pub fn parse(label: &str) -> Option<Phase> {
        let label = label.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    pub fn next(self) -> Phase {
        Self::from_index(self.index() + 1).unwrap_or(Phase::Closed)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Closed
    }

    /// next = max(current, min(suggested, current + 1))
    pub fn advance_towards(self, suggested: Phase) -> Phase {
        suggested.min(self.next()).max(self)
    }

    /// 根据模型给出的标签推进；无法解析时保持当前阶段
    pub fn advance_by_label(self, label: &str) -> Phase {
        match Phase::parse(label) {
            Some(suggested) => self.advance_towards(suggested),
            None => self,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(Phase::parse("clarify"), Some(Phase::Clarify));
        assert_eq!(Phase::parse("  SUMMARY "), Some(Phase::Summary));
        assert_eq!(Phase::parse("discovery"), None);
        assert_eq!(Phase::parse(""), None);
    }

    #[test]
    fn test_advance_at_most_one_step() {
        assert_eq!(Phase::Warmup.advance_towards(Phase::Summary), Phase::Clarify);
        assert_eq!(Phase::Clarify.advance_towards(Phase::Reframe), Phase::Reframe);
        assert_eq!(Phase::Followup.advance_towards(Phase::Closed), Phase::Closed);
    }

    #[test]
    fn test_never_regresses() {
        assert_eq!(Phase::Reframe.advance_towards(Phase::Warmup), Phase::Reframe);
        assert_eq!(Phase::Closed.advance_towards(Phase::Clarify), Phase::Closed);
        for current in Phase::ALL {
            for suggested in Phase::ALL {
                let next = current.advance_towards(suggested);
                assert!(next >= current);
                assert!(next.index() <= current.index() + 1);
            }
        }
    }

    #[test]
    fn test_unknown_label_stays_put() {
        assert_eq!(Phase::Clarify.advance_by_label("reframing"), Phase::Clarify);
        assert_eq!(Phase::Clarify.advance_by_label("Reframe"), Phase::Reframe);
    }

    #[test]
    fn test_closed_is_last() {
        assert_eq!(Phase::Closed.next(), Phase::Closed);
        assert!(Phase::Closed.is_terminal());
        assert!(!Phase::Followup.is_terminal());
    }
}
