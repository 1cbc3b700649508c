//! 会话状态：单个调研会话持有的全部数据
//!
//! ResearchSession 是唯一的会话上下文，按 &mut 传入每个步骤函数；stage 限制步骤顺序，
//! exchanges 记录每次服务交换的 id，供后续请求链式引用。

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::ResearchError;
use crate::llm::{Citation, ExchangeId};
use crate::research::parse::parse_json_block;
use crate::research::Report;

/// 会话阶段：每个步骤只能在对应阶段执行
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// 已有主题，等待生成澄清问题
    Topic,
    /// 已生成澄清问题，等待回答与规划
    Clarifying,
    /// 已有目标与查询，等待执行检索
    Planned,
    /// 检索循环结束，等待生成报告
    Researched,
    Reported,
}

/// 产生交换的步骤
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Clarify,
    Plan,
    Search,
    Evaluate,
    Expand,
    Report,
}

/// 一次交换记录
#[derive(Clone, Debug, Serialize)]
pub struct ExchangeRecord {
    pub step: Step,
    pub id: ExchangeId,
}

/// 一条检索结果：查询、来源引用、文本
#[derive(Clone, Debug, Serialize)]
pub struct Finding {
    pub query: String,
    pub source_ref: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// 产生该结果的轮次（从 1 开始）
    pub round: usize,
    pub retrieved_at: DateTime<Local>,
}

/// 调研计划：目标句 + 检索查询（预期 5 条，不强制）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub queries: Vec<String>,
}

impl Plan {
    /// 编码为 {"goal": "...", "queries": [...]}
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// 从服务输出解析计划；允许 ```json 代码块包裹，不做修复
    pub fn parse(text: &str) -> Result<Self, ResearchError> {
        let plan: Plan = parse_json_block(text, '{', "plan")?;
        if plan.queries.is_empty() {
            return Err(ResearchError::malformed("plan", "plan has no queries"));
        }
        Ok(plan)
    }
}

/// 调研会话
#[derive(Clone, Debug)]
pub struct ResearchSession {
    pub topic: String,
    pub clarifying_questions: Vec<String>,
    pub answers: Vec<String>,
    pub goal: String,
    pub queries: Vec<String>,
    findings: Vec<Finding>,
    exchanges: Vec<ExchangeRecord>,
    pub report: Option<Report>,
    stage: Stage,
}

impl ResearchSession {
    pub fn new(topic: impl Into<String>) -> Result<Self, ResearchError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(ResearchError::EmptyTopic);
        }
        Ok(Self {
            topic,
            clarifying_questions: Vec::new(),
            answers: Vec::new(),
            goal: String::new(),
            queries: Vec::new(),
            findings: Vec::new(),
            exchanges: Vec::new(),
            report: None,
            stage: Stage::Topic,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn expect_stage(&self, expected: Stage) -> Result<(), ResearchError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ResearchError::OutOfOrder {
                expected,
                actual: self.stage,
            })
        }
    }

    pub(crate) fn advance(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "session stage");
        self.stage = stage;
    }

    /// 设置澄清问题，答案槽位重置为同样数量的空串
    pub(crate) fn set_questions(&mut self, questions: Vec<String>) {
        self.answers = vec![String::new(); questions.len()];
        self.clarifying_questions = questions;
    }

    pub fn set_answer(&mut self, index: usize, answer: impl Into<String>) -> Result<(), ResearchError> {
        let len = self.answers.len();
        let slot = self
            .answers
            .get_mut(index)
            .ok_or(ResearchError::AnswerIndex { index, len })?;
        *slot = answer.into().trim().to_string();
        Ok(())
    }

    /// 答案完整：数量与问题一致且每条非空
    pub fn answers_complete(&self) -> bool {
        !self.clarifying_questions.is_empty()
            && self.answers.len() == self.clarifying_questions.len()
            && self.answers.iter().all(|a| !a.trim().is_empty())
    }

    pub(crate) fn set_plan(&mut self, plan: Plan) {
        self.goal = plan.goal;
        self.queries = plan.queries;
    }

    pub fn plan(&self) -> Option<Plan> {
        if self.goal.is_empty() && self.queries.is_empty() {
            return None;
        }
        Some(Plan {
            goal: self.goal.clone(),
            queries: self.queries.clone(),
        })
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub(crate) fn push_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    /// 检索结果的 JSON 转储（评估、扩展、报告请求的输入）
    pub fn findings_json(&self) -> String {
        serde_json::to_string(&self.findings).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn exchanges(&self) -> &[ExchangeRecord] {
        &self.exchanges
    }

    pub(crate) fn record_exchange(&mut self, step: Step, id: ExchangeId) {
        self.exchanges.push(ExchangeRecord { step, id });
    }

    /// 某步骤最近一次交换的 id
    pub fn last_exchange(&self, step: Step) -> Option<ExchangeId> {
        self.exchanges
            .iter()
            .rev()
            .find(|r| r.step == step)
            .map(|r| r.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_questions(n: usize) -> ResearchSession {
        let mut s = ResearchSession::new("solar panel ROI").unwrap();
        s.set_questions((1..=n).map(|i| format!("{}. question?", i)).collect());
        s
    }

    #[test]
    fn test_empty_topic_rejected() {
        assert!(matches!(
            ResearchSession::new("   "),
            Err(ResearchError::EmptyTopic)
        ));
    }

    #[test]
    fn test_answers_complete_requires_every_slot() {
        let mut s = session_with_questions(3);
        assert!(!s.answers_complete());
        s.set_answer(0, "homeowner").unwrap();
        s.set_answer(1, "California").unwrap();
        assert!(!s.answers_complete());
        s.set_answer(2, "   ").unwrap();
        assert!(!s.answers_complete());
        s.set_answer(2, "10 years").unwrap();
        assert!(s.answers_complete());
    }

    #[test]
    fn test_no_questions_is_never_complete() {
        let s = ResearchSession::new("topic").unwrap();
        assert!(!s.answers_complete());
    }

    #[test]
    fn test_answer_index_out_of_range() {
        let mut s = session_with_questions(2);
        assert!(matches!(
            s.set_answer(2, "x"),
            Err(ResearchError::AnswerIndex { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_plan_round_trip() {
        let plan = Plan {
            goal: "Determine payback period of residential solar panels".into(),
            queries: vec![
                "solar panel cost 2024".into(),
                "residential solar \"net metering\" rates".into(),
                "solar incentives by state".into(),
            ],
        };
        assert_eq!(Plan::parse(&plan.to_json()).unwrap(), plan);
    }

    #[test]
    fn test_plan_parse_fenced() {
        let text = "```json\n{\"goal\": \"g\", \"queries\": [\"a\", \"b\"]}\n```";
        let plan = Plan::parse(text).unwrap();
        assert_eq!(plan.goal, "g");
        assert_eq!(plan.queries, vec!["a", "b"]);
    }

    #[test]
    fn test_plan_parse_malformed() {
        assert!(matches!(
            Plan::parse("Goal: save money"),
            Err(ResearchError::MalformedOutput { step: "plan", .. })
        ));
        assert!(matches!(
            Plan::parse(r#"{"goal": "g"}"#),
            Err(ResearchError::MalformedOutput { step: "plan", .. })
        ));
        assert!(matches!(
            Plan::parse(r#"{"goal": "g", "queries": []}"#),
            Err(ResearchError::MalformedOutput { step: "plan", .. })
        ));
    }

    #[test]
    fn test_last_exchange_by_step() {
        let mut s = ResearchSession::new("t").unwrap();
        s.record_exchange(Step::Clarify, ExchangeId("c".into()));
        s.record_exchange(Step::Plan, ExchangeId("p".into()));
        s.record_exchange(Step::Search, ExchangeId("s".into()));
        assert_eq!(s.last_exchange(Step::Plan), Some(ExchangeId("p".into())));
        assert_eq!(s.last_exchange(Step::Expand), None);
        assert_eq!(s.exchanges().len(), 3);
    }
}
