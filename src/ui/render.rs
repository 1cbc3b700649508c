//! 界面渲染
//!
//! 标题栏显示当前步骤与 provider；主体按步骤绘制（主题、问题与答案、计划、检索日志、报告与来源），
//! 底部为输入框与快捷键提示。API Key 输入以 * 遮挡。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{UiState, WizardStep};

/// TUI 本地状态：输入缓冲、当前回答的问题、滚动位置
#[derive(Debug, Default, Clone)]
pub struct ViewState {
    pub input: String,
    pub answer_cursor: usize,
    pub scroll: usize,
}

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
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

fn step_title(step: WizardStep) -> &'static str {
    match step {
        WizardStep::ApiKey => "1/6 API Key",
        WizardStep::Topic => "2/6 调研主题",
        WizardStep::Answers => "3/6 澄清问题",
        WizardStep::Plan => "4/6 调研计划",
        WizardStep::Research => "5/6 检索",
        WizardStep::Report => "6/6 最终报告",
    }
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    ))
}

fn push_wrapped(lines: &mut Vec<Line<'static>>, text: &str, width: usize, style: Style) {
    for l in wrap_text(text, width) {
        lines.push(Line::from(Span::styled(l, style)));
    }
}

/// 主体内容（已按宽度换行）
fn body_lines(state: &UiState, view: &ViewState, width: usize) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let plain = Style::default();
    let dim = Style::default().fg(Color::DarkGray);

    match state.step {
        WizardStep::ApiKey => {
            push_wrapped(
                &mut lines,
                "未在配置或环境变量中找到 API Key，请输入（仅保存在本次会话内存中）。",
                width,
                plain,
            );
        }
        WizardStep::Topic => {
            push_wrapped(&mut lines, "请输入调研主题，Enter 后生成澄清问题。", width, plain);
            if !state.topic.is_empty() {
                lines.push(Line::from(""));
                push_wrapped(&mut lines, &format!("上次主题：{}", state.topic), width, dim);
            }
        }
        WizardStep::Answers => {
            lines.push(heading(&format!("主题：{}", state.topic)));
            lines.push(Line::from(""));
            for (i, q) in state.questions.iter().enumerate() {
                let selected = i == view.answer_cursor;
                let q_style = if selected {
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Cyan)
                };
                let marker = if selected { "▶ " } else { "  " };
                push_wrapped(&mut lines, &format!("{}{}", marker, q), width, q_style);
                let answer = state.answers.get(i).map(String::as_str).unwrap_or("");
                if answer.is_empty() {
                    lines.push(Line::from(Span::styled("    (未回答)", dim)));
                } else {
                    push_wrapped(&mut lines, &format!("    {}", answer), width, plain);
                }
            }
        }
        WizardStep::Plan => {
            lines.push(heading("调研目标"));
            push_wrapped(&mut lines, &state.goal, width, plain);
            lines.push(Line::from(""));
            lines.push(heading("检索查询"));
            for q in &state.queries {
                push_wrapped(&mut lines, &format!("- {}", q), width, plain);
            }
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled("Enter 开始检索", dim)));
        }
        WizardStep::Research => {
            lines.push(heading(&format!(
                "目标：{}  │ 第 {} 轮 │ {} 条结果",
                state.goal, state.rounds, state.findings
            )));
            for l in &state.log {
                push_wrapped(&mut lines, l, width, plain);
            }
            if !state.busy && state.error_message.is_some() {
                lines.push(Line::from(""));
                let hint = if state.research_done {
                    "Enter 重新生成报告"
                } else {
                    "Enter 重新执行检索"
                };
                lines.push(Line::from(Span::styled(hint, dim)));
            }
        }
        WizardStep::Report => {
            lines.push(Line::from(Span::styled(
                "✔ 调研完成",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(""));
            if let Some(report) = &state.report {
                push_wrapped(&mut lines, report, width, plain);
            }
            if !state.sources.is_empty() {
                lines.push(Line::from(""));
                lines.push(heading("检索来源"));
                for url in &state.sources {
                    push_wrapped(&mut lines, &format!("- {}", url), width, dim);
                }
            }
        }
    }
    lines
}

/// Paragraph 的滚动偏移为 u16，超出时停在最大值
fn scroll_row(offset: usize) -> u16 {
    u16::try_from(offset).unwrap_or(u16::MAX)
}

fn input_label(state: &UiState) -> &'static str {
    match state.step {
        WizardStep::ApiKey => " API Key ",
        WizardStep::Topic => " 主题 ",
        WizardStep::Answers => " 回答 ",
        _ => " ",
    }
}

/// 绘制一帧：上方主体（标题 + 内容 + 滚动条），下方输入区；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(f: &mut Frame, state: &UiState, view: &ViewState, out: &mut (usize, usize)) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(5), Constraint::Length(4)])
        .split(f.area());

    let main_area = chunks[0];
    let content_width = main_area.width.saturating_sub(2).saturating_sub(1) as usize; // 边框 + 滚动条

    let status = if state.busy {
        state.activity.clone().unwrap_or_else(|| "处理中…".to_string())
    } else {
        "就绪".to_string()
    };
    let provider = if state.provider.is_empty() {
        String::new()
    } else {
        format!(" │ {}", state.provider)
    };
    let title = format!(" Scout │ {} │ {}{} ", step_title(state.step), status, provider);
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let text_lines = body_lines(state, view, content_width.max(20));
    let content_height = main_area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = view.scroll.min(max_scroll);

    let inner = block.inner(main_area);
    f.render_widget(block, main_area);
    let paragraph = Paragraph::new(Text::from(text_lines))
        .wrap(Wrap { trim: false })
        .scroll((scroll_row(scroll_offset), 0));
    f.render_widget(paragraph, inner);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, inner, &mut scrollbar_state);
    }

    let input_title = if let Some(err) = &state.error_message {
        format!(" 错误: {} ", err.chars().take(60).collect::<String>())
    } else if state.busy {
        " 等待服务响应… ".to_string()
    } else {
        input_label(state).to_string()
    };
    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter 确认 │ ↑↓ PgUp/PgDn 选择/滚动 │ Esc 取消 │ Ctrl+R 新主题 │ Ctrl+Q 退出 ";
    let input_block = Block::default()
        .title(input_title)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let shown = if state.step == WizardStep::ApiKey {
        "*".repeat(view.input.chars().count())
    } else {
        view.input.clone()
    };
    let input = Paragraph::new(shown)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.busy {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, chunks[1]);

    out.0 = total_lines;
    out.1 = content_height;
}
