//! 界面渲染
//!
//! 根据 UiState（阶段、轮次、剩余追问、历史、错误）与 input_buffer 绘制：标题栏显示阶段与预算，
//! 主体为对话历史（按角色着色、阶段提示灰显、按宽度换行），底部为输入框与快捷键提示。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{Phase, UiState};
use crate::memory::Role;

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
pub fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    lines
}

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::Warmup | Phase::Clarify => Color::Cyan,
        Phase::Reframe => Color::Magenta,
        Phase::Summary | Phase::Followup => Color::Green,
        Phase::Closed => Color::DarkGray,
    }
}

/// 标题：阶段 │ 轮次 │ 剩余追问
pub fn title_for(state: &UiState) -> String {
    let mut title = format!(
        " Reframe │ {} │ turn {}/{} ",
        state.phase.label(),
        state.turn,
        state.max_turns
    );
    if state.phase >= Phase::Followup {
        title.push_str(&format!("│ follow-ups left {} ", state.followups_left));
    }
    title
}

/// 绘制一帧：上方对话区（标题 + 历史 + 滚动条），下方输入区；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let input_height = 5u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(input_height)])
        .split(f.area());

    let conv_area = chunks[0];
    let content_width = conv_area.width.saturating_sub(2).saturating_sub(1) as usize; // 边框 + 滚动条

    let block = Block::default()
        .title(title_for(state))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(phase_color(state.phase)));

    let mut text_lines: Vec<Line> = Vec::new();
    for (idx, m) in state.history.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        let (prefix, style) = match m.role {
            Role::User => ("You   ", Style::default().fg(Color::Cyan)),
            Role::Assistant => ("Coach ", Style::default().fg(Color::Green)),
            Role::System => (
                "  ·   ",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ),
        };
        let wrapped = wrap_text(&m.content, content_width.saturating_sub(prefix.len()).max(20));
        for (i, line) in wrapped.into_iter().enumerate() {
            let pref = if i == 0 { prefix } else { "      " };
            text_lines.push(Line::from(vec![
                Span::styled(pref, style.add_modifier(Modifier::BOLD)),
                Span::styled(line, if m.role == Role::System { style } else { Style::default() }),
            ]));
        }
    }

    let content_height = conv_area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = conversation_scroll.min(max_scroll);

    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, conv_area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, conv_area, &mut scrollbar_state);
    }

    let input_prompt = if let Some(err) = &state.error_message {
        format!(" Error: {} ", err.chars().take(48).collect::<String>())
    } else if state.end_of_session {
        " Session closed · Ctrl+L new session ".to_string()
    } else if state.input_locked {
        " Waiting for reply… ".to_string()
    } else {
        " Message ".to_string()
    };

    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter send │ ↑↓ PgUp/PgDn scroll │ Esc cancel │ Ctrl+L restart │ Ctrl+Q quit ";
    let input_block = Block::default()
        .title(input_prompt)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });

    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
