//! 状态定义：UiState 投影
//!
//! UI 只持有轻量的 UiState（当前步骤、问题与答案、计划、进度日志、报告、错误）；
//! 完整会话由驱动任务持有，每次变化后投影到 UiState。

use serde::Serialize;

use crate::research::{LoopOutcome, ResearchEvent};

/// 进度日志保留条数
const MAX_LOG_LINES: usize = 500;

/// 向导步骤：每一步都依赖上一步完成
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum WizardStep {
    /// 输入 API Key
    ApiKey,
    /// 输入调研主题
    Topic,
    /// 回答澄清问题
    Answers,
    /// 查看调研计划
    Plan,
    /// 检索进行中 / 已结束
    Research,
    /// 最终报告
    Report,
}

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub step: WizardStep,
    pub provider: String,
    /// 正在等待服务响应
    pub busy: bool,
    pub activity: Option<String>,
    pub topic: String,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    pub goal: String,
    pub queries: Vec<String>,
    pub log: Vec<String>,
    pub rounds: usize,
    pub findings: usize,
    /// 检索循环已结束（报告失败时可单独重试报告）
    pub research_done: bool,
    pub report: Option<String>,
    pub sources: Vec<String>,
    pub error_message: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            step: WizardStep::ApiKey,
            provider: String::new(),
            busy: false,
            activity: None,
            topic: String::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            goal: String::new(),
            queries: Vec::new(),
            log: Vec::new(),
            rounds: 0,
            findings: 0,
            research_done: false,
            report: None,
            sources: Vec::new(),
            error_message: None,
        }
    }
}

impl UiState {
    /// 回到输入主题：清空会话相关字段，保留 provider
    pub fn reset_session(&mut self) {
        *self = Self {
            step: WizardStep::Topic,
            provider: std::mem::take(&mut self.provider),
            ..Self::default()
        };
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    /// 将检索事件投影为进度日志与计数
    pub fn apply_event(&mut self, event: &ResearchEvent) {
        match event {
            ResearchEvent::RoundStarted { round, queries } => {
                self.rounds = *round;
                self.activity = Some(format!("第 {} 轮检索", round));
                self.push_log(format!("── 第 {} 轮：{} 条查询", round, queries));
            }
            ResearchEvent::Searching { query, .. } => {
                self.activity = Some(format!("搜索: {}", query));
                self.push_log(format!("🔍 {}", query));
            }
            ResearchEvent::FindingAdded { preview, total, .. } => {
                self.findings = *total;
                self.push_log(format!("   ↳ {}", preview));
            }
            ResearchEvent::Evaluating { findings } => {
                self.activity = Some("评估是否满足目标…".to_string());
                self.push_log(format!("⚖ 评估 {} 条结果", findings));
            }
            ResearchEvent::Judged { sufficient, verdict } => {
                let mark = if *sufficient { "✔" } else { "✘" };
                self.push_log(format!("{} {}", mark, verdict));
            }
            ResearchEvent::Expanded { queries } => {
                self.push_log(format!("➕ 新查询：{}", queries.join(" | ")));
            }
            ResearchEvent::Finished {
                rounds,
                findings,
                outcome,
            } => {
                self.rounds = *rounds;
                self.findings = *findings;
                let why = match outcome {
                    LoopOutcome::Sufficient => "目标已满足",
                    LoopOutcome::RoundLimit => "达到轮数上限",
                    LoopOutcome::Exhausted => "没有新的查询",
                };
                self.push_log(format!(
                    "■ 检索完成（{}）：{} 轮，{} 条结果",
                    why, rounds, findings
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_keeps_provider() {
        let mut state = UiState {
            provider: "openai".into(),
            topic: "x".into(),
            step: WizardStep::Report,
            ..UiState::default()
        };
        state.reset_session();
        assert_eq!(state.step, WizardStep::Topic);
        assert_eq!(state.provider, "openai");
        assert!(state.topic.is_empty());
    }

    #[test]
    fn test_apply_event_tracks_counts() {
        let mut state = UiState::default();
        state.apply_event(&ResearchEvent::RoundStarted { round: 2, queries: 5 });
        state.apply_event(&ResearchEvent::FindingAdded {
            query: "q".into(),
            preview: "p".into(),
            total: 7,
        });
        assert_eq!(state.rounds, 2);
        assert_eq!(state.findings, 7);
        assert_eq!(state.log.len(), 2);
    }

    #[test]
    fn test_log_is_bounded() {
        let mut state = UiState::default();
        for i in 0..(MAX_LOG_LINES + 10) {
            state.push_log(i.to_string());
        }
        assert_eq!(state.log.len(), MAX_LOG_LINES);
        assert_eq!(state.log[0], "10");
    }
}
