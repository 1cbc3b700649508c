//! TUI 应用主循环
//!
//! 进入全屏/原始模式，轮询 state_rx 与键盘事件，按当前向导步骤把输入转为 Command 发送给会话驱动，
//! 每帧用 draw 渲染 UiState 与本地输入状态。

use std::io::{self, Stdout};

use crossterm::event::KeyCode;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::{mpsc, watch};

use crate::core::{Command, UiState, WizardStep};
use crate::ui::event::{AppEvent, EventHandler};
use crate::ui::render::{draw, ViewState};

/// 回答问题时 Enter 的结果：下一个待答问题，或全部答完
fn next_unanswered(answers: &[String], current: usize) -> Option<usize> {
    let n = answers.len();
    (1..=n)
        .map(|offset| (current + offset) % n)
        .find(|&i| answers[i].trim().is_empty())
}

/// 与问题数量对齐的答案列表
fn padded_answers(state: &UiState) -> Vec<String> {
    let mut answers = state.answers.clone();
    answers.resize(state.questions.len(), String::new());
    answers
}

/// 按当前步骤处理一个按键
fn handle_key(
    code: KeyCode,
    state: &UiState,
    view: &mut ViewState,
    events: &EventHandler,
) {
    match code {
        KeyCode::Up => match state.step {
            WizardStep::Answers => {
                view.answer_cursor = view.answer_cursor.saturating_sub(1);
                view.input = state.answers.get(view.answer_cursor).cloned().unwrap_or_default();
            }
            _ => view.scroll = view.scroll.saturating_sub(1),
        },
        KeyCode::Down => match state.step {
            WizardStep::Answers => {
                view.answer_cursor =
                    (view.answer_cursor + 1).min(state.questions.len().saturating_sub(1));
                view.input = state.answers.get(view.answer_cursor).cloned().unwrap_or_default();
            }
            _ => view.scroll = view.scroll.saturating_add(1),
        },
        KeyCode::PageUp => view.scroll = view.scroll.saturating_sub(10),
        KeyCode::PageDown => view.scroll = view.scroll.saturating_add(10),
        KeyCode::Home => view.scroll = 0,
        KeyCode::End => view.scroll = usize::MAX,
        KeyCode::Backspace => {
            view.input.pop();
        }
        KeyCode::Char(c) if accepts_text(state.step) => view.input.push(c),
        KeyCode::Enter => submit(state, view, events),
        _ => {}
    }
}

fn accepts_text(step: WizardStep) -> bool {
    matches!(
        step,
        WizardStep::ApiKey | WizardStep::Topic | WizardStep::Answers
    )
}

fn submit(state: &UiState, view: &mut ViewState, events: &EventHandler) {
    match state.step {
        WizardStep::ApiKey => {
            events.send(Command::SetApiKey(std::mem::take(&mut view.input)));
        }
        WizardStep::Topic => {
            let topic = view.input.trim().to_string();
            if !topic.is_empty() {
                view.input.clear();
                events.send(Command::SubmitTopic(topic));
            } else if state.error_message.is_some() && !state.topic.is_empty() {
                // 澄清失败或被取消后，空输入 Enter 重试上次主题
                events.send(Command::SubmitTopic(state.topic.clone()));
            }
        }
        WizardStep::Answers => {
            if state.questions.is_empty() {
                return;
            }
            let text = view.input.trim().to_string();
            if text.is_empty() {
                // 空输入不覆盖已有答案；全部答完时重新生成计划，否则跳到下一个未答问题
                match next_unanswered(&padded_answers(state), view.answer_cursor) {
                    Some(next) => {
                        view.answer_cursor = next;
                        view.input.clear();
                    }
                    None => events.send(Command::GeneratePlan),
                }
                return;
            }
            let index = view.answer_cursor.min(state.questions.len() - 1);
            let mut answers = padded_answers(state);
            answers[index] = text.clone();
            events.send(Command::SetAnswer { index, text });

            match next_unanswered(&answers, index) {
                Some(next) => {
                    view.answer_cursor = next;
                    view.input.clear();
                }
                None => {
                    view.input.clear();
                    events.send(Command::GeneratePlan);
                }
            }
        }
        WizardStep::Plan => events.send(Command::RunResearch),
        WizardStep::Research => {
            if state.error_message.is_some() {
                if state.research_done {
                    events.send(Command::GenerateReport);
                } else {
                    events.send(Command::RunResearch);
                }
            }
        }
        WizardStep::Report => {}
    }
}

/// 运行 TUI：启用原始模式与全屏，循环 poll 事件 + 渲染，退出时恢复终端
pub async fn run_app(
    state_rx: watch::Receiver<UiState>,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, state_rx, EventHandler::new(cmd_tx)).await;

    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    state_rx: watch::Receiver<UiState>,
    events: EventHandler,
) -> anyhow::Result<()> {
    let mut view = ViewState::default();
    let mut last_step = state_rx.borrow().step;
    let mut last_log_len = 0usize;

    loop {
        let state = state_rx.borrow().clone();

        if state.step != last_step {
            last_step = state.step;
            view = ViewState::default();
        }
        if state.step == WizardStep::Research && state.log.len() != last_log_len {
            last_log_len = state.log.len();
            view.scroll = usize::MAX;
        }

        if let Some(ev) = events.poll()? {
            match ev {
                AppEvent::Command(Command::Quit) => break,
                AppEvent::Command(_) => {}
                AppEvent::Key(key) if !state.busy => handle_key(key.code, &state, &mut view, &events),
                AppEvent::Key(_) => {}
            }
        }

        let mut scroll_info = (0usize, 0usize);
        terminal.draw(|f| draw(f, &state, &view, &mut scroll_info))?;
        let (total_lines, viewport_height) = scroll_info;
        view.scroll = view.scroll.min(total_lines.saturating_sub(viewport_height));

        tokio::task::yield_now().await;
    }
    Ok(())
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_next_unanswered_wraps() {
        assert_eq!(next_unanswered(&answers(&["a", "", "c"]), 0), Some(1));
        assert_eq!(next_unanswered(&answers(&["", "b", "c"]), 2), Some(0));
        assert_eq!(next_unanswered(&answers(&["a", "b", "c"]), 1), None);
    }

    #[test]
    fn test_answers_enter_sends_plan_when_complete() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Answers,
            questions: answers(&["1. a?", "2. b?"]),
            answers: answers(&["x", ""]),
            ..UiState::default()
        };
        let mut view = ViewState {
            input: "y".into(),
            answer_cursor: 1,
            ..ViewState::default()
        };

        submit(&state, &mut view, &events);
        assert!(matches!(
            rx.try_recv(),
            Ok(Command::SetAnswer { index: 1, ref text }) if text == "y"
        ));
        assert!(matches!(rx.try_recv(), Ok(Command::GeneratePlan)));
        assert!(view.input.is_empty());
    }

    #[test]
    fn test_empty_enter_after_plan_failure_retries_plan() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Answers,
            questions: answers(&["1. a?", "2. b?"]),
            answers: answers(&["x", "y"]),
            error_message: Some("Malformed plan output".into()),
            ..UiState::default()
        };
        let mut view = ViewState {
            answer_cursor: 1,
            ..ViewState::default()
        };

        submit(&state, &mut view, &events);
        assert!(matches!(rx.try_recv(), Ok(Command::GeneratePlan)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_empty_enter_never_clears_an_answer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Answers,
            questions: answers(&["a?", "b?", "c?"]),
            answers: answers(&["x", "", ""]),
            ..UiState::default()
        };
        let mut view = ViewState::default();

        submit(&state, &mut view, &events);
        assert!(rx.try_recv().is_err());
        assert_eq!(view.answer_cursor, 1);
    }

    #[test]
    fn test_empty_enter_after_clarify_failure_resubmits_topic() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Topic,
            topic: "solar panel ROI".into(),
            error_message: Some("Research cancelled".into()),
            ..UiState::default()
        };
        let mut view = ViewState::default();

        submit(&state, &mut view, &events);
        assert!(matches!(
            rx.try_recv(),
            Ok(Command::SubmitTopic(ref t)) if t == "solar panel ROI"
        ));
    }

    #[test]
    fn test_empty_enter_on_fresh_topic_does_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Topic,
            ..UiState::default()
        };
        submit(&state, &mut ViewState::default(), &events);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_answers_enter_moves_to_next_empty() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = EventHandler::new(tx);
        let state = UiState {
            step: WizardStep::Answers,
            questions: answers(&["a?", "b?", "c?"]),
            answers: answers(&["", "", ""]),
            ..UiState::default()
        };
        let mut view = ViewState {
            input: "first".into(),
            ..ViewState::default()
        };

        submit(&state, &mut view, &events);
        assert!(matches!(rx.try_recv(), Ok(Command::SetAnswer { index: 0, .. })));
        assert!(rx.try_recv().is_err());
        assert_eq!(view.answer_cursor, 1);
    }
}
