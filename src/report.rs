//! 会话总结报告（Markdown）
//!
//! 由最终 SessionState 与重构分析确定性生成，不调用模型；会话结束时写入归档。

use std::fmt::Write as _;

use crate::core::{ProgressFlags, ReframeAnalysis, SessionState};

fn rating(value: Option<u8>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "–".to_string())
}

fn delta_line(label: &str, before: Option<u8>, after: Option<u8>) -> String {
    match (before, after) {
        (Some(b), Some(a)) => {
            let change = i16::from(a) - i16::from(b);
            format!("- {}: {} → {} ({:+})", label, b, a, change)
        }
        _ => format!("- {}: {} → {}", label, rating(before), rating(after)),
    }
}

fn bullet_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n### {}", title);
    for item in items {
        let _ = writeln!(out, "- {}", item);
    }
}

fn progress_line(progress: &ProgressFlags) -> String {
    let flags = [
        ("situation", progress.situation),
        ("thought", progress.thought),
        ("emotion", progress.emotion),
        ("intensity", progress.intensity),
    ];
    flags
        .iter()
        .map(|(name, done)| format!("{} {}", if *done { "[x]" } else { "[ ]" }, name))
        .collect::<Vec<_>>()
        .join(" · ")
}

/// 渲染总结；analysis 为 None 时从 state.reframe_json 读取
pub fn render_summary(state: &SessionState, analysis: Option<&ReframeAnalysis>) -> String {
    let stored;
    let analysis = match analysis {
        Some(a) => Some(a),
        None => {
            stored = state.reframe_analysis();
            stored.as_ref()
        }
    };

    let mut out = String::from("# CBT session summary\n\n");
    if state.crisis_flag {
        out.push_str(
            "> **Safety notice:** crisis language was detected during this session. \
             The exercise was paused; please contact local emergency services or a crisis line if you are at risk.\n\n",
        );
    }

    let _ = writeln!(out, "- Final phase: {}", state.phase);
    let _ = writeln!(out, "- Turns used: {} / {}", state.turn, state.max_turns);
    let _ = writeln!(out, "- Intake: {}", progress_line(&state.progress));
    let _ = writeln!(out, "{}", delta_line("Distress (SUDS)", state.suds_pre, state.suds_post));
    let _ = writeln!(
        out,
        "{}",
        delta_line("Belief in original thought", state.confidence_pre, state.confidence_post)
    );

    match analysis {
        Some(a) => {
            out.push_str("\n## Reframe\n");
            bullet_list(&mut out, "Cognitive distortions", &a.distortions);
            bullet_list(&mut out, "Evidence for the thought", &a.evidence_for);
            bullet_list(&mut out, "Evidence against the thought", &a.evidence_against);
            if !a.balanced_thought.trim().is_empty() {
                let _ = writeln!(out, "\n### Balanced thought\n{}", a.balanced_thought.trim());
            }
            if let Some(action) = a.micro_action.as_deref().filter(|s| !s.trim().is_empty()) {
                let _ = writeln!(out, "\n### Micro-action (≤10 min)\n{}", action.trim());
            }
            if a.certainty_before.is_some() || a.certainty_after.is_some() {
                let _ = writeln!(
                    out,
                    "\n{}",
                    delta_line("Certainty", a.certainty_before, a.certainty_after)
                );
            }
        }
        None => out.push_str("\n_No reframe was completed in this session._\n"),
    }

    out
}
