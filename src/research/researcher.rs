//! Researcher：持有语言服务、模型与调研参数，实现澄清 / 规划 / 检索 / 评估 / 扩展各步骤
//!
//! 每个步骤接收 &mut ResearchSession，校验阶段后发起一次（或多次）服务请求并写回会话。

use std::sync::Arc;

use chrono::Local;

use crate::config::AppConfig;
use crate::core::ResearchError;
use crate::llm::{LlmClient, LlmRequest, Message};
use crate::research::parse::parse_string_list;
use crate::research::session::{Finding, Plan, ResearchSession, Stage, Step};
use crate::research::{prompts, Judgment};

/// 调研参数
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    pub model: String,
    /// 澄清问题使用的轻量模型
    pub mini_model: String,
    pub question_count: usize,
    pub queries_per_round: usize,
    /// None 表示不限轮数
    pub max_rounds: Option<usize>,
    pub dedupe_queries: bool,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ResearchSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            model: cfg.llm.model.clone(),
            mini_model: cfg.llm.mini_model.clone(),
            question_count: cfg.research.question_count.max(1),
            queries_per_round: cfg.research.queries_per_round.max(1),
            max_rounds: match cfg.research.max_rounds {
                0 => None,
                n => Some(n),
            },
            dedupe_queries: cfg.research.dedupe_queries,
        }
    }
}

pub struct Researcher {
    llm: Arc<dyn LlmClient>,
    instructions: String,
    settings: ResearchSettings,
}

impl Researcher {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        instructions: impl Into<String>,
        settings: ResearchSettings,
    ) -> Self {
        Self {
            llm,
            instructions: instructions.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    fn request(&self, model: &str) -> LlmRequest {
        LlmRequest::new(model, self.instructions.clone())
    }

    /// 生成澄清问题；问题数量与要求不一致时照常接受，答案槽位随问题数量重置
    pub async fn clarify(&self, session: &mut ResearchSession) -> Result<Vec<String>, ResearchError> {
        session.expect_stage(Stage::Topic)?;

        let request = self
            .request(&self.settings.mini_model)
            .message(Message::user(prompts::clarify(
                &session.topic,
                self.settings.question_count,
            )));
        let exchange = self.llm.respond(request).await?;
        let questions = parse_string_list(&exchange.text, "clarify")?;

        if questions.len() != self.settings.question_count {
            tracing::debug!(
                expected = self.settings.question_count,
                got = questions.len(),
                "clarifying question count differs"
            );
        }
        tracing::info!(topic = %session.topic, questions = questions.len(), "clarifying questions ready");

        session.record_exchange(Step::Clarify, exchange.id);
        session.set_questions(questions.clone());
        session.advance(Stage::Clarifying);
        Ok(questions)
    }

    /// 生成调研计划；仅当所有答案非空时可达，链式引用澄清交换
    pub async fn plan(&self, session: &mut ResearchSession) -> Result<Plan, ResearchError> {
        session.expect_stage(Stage::Clarifying)?;
        if !session.answers_complete() {
            return Err(ResearchError::IncompleteAnswers);
        }

        let request = self
            .request(&self.settings.model)
            .message(Message::user(prompts::plan(
                &session.topic,
                &session.clarifying_questions,
                &session.answers,
                self.settings.queries_per_round,
            )))
            .chained_to(session.last_exchange(Step::Clarify));
        let exchange = self.llm.respond(request).await?;
        let plan = Plan::parse(&exchange.text)?;

        tracing::info!(goal = %plan.goal, queries = plan.queries.len(), "research plan ready");

        session.record_exchange(Step::Plan, exchange.id);
        session.set_plan(plan.clone());
        session.advance(Stage::Planned);
        Ok(plan)
    }

    /// 执行一条搜索查询，得到一条 Finding
    pub(crate) async fn search(
        &self,
        session: &mut ResearchSession,
        query: &str,
        round: usize,
    ) -> Result<Finding, ResearchError> {
        let request = self
            .request(&self.settings.model)
            .message(Message::user(prompts::search(query)))
            .with_web_search();
        let exchange = self.llm.respond(request).await?;
        session.record_exchange(Step::Search, exchange.id);

        Ok(Finding {
            query: query.to_string(),
            source_ref: exchange.source_ref,
            text: exchange.text,
            citations: exchange.citations,
            round,
            retrieved_at: Local::now(),
        })
    }

    /// 充分性判断：目标 + 全部检索结果，要求回答 Yes / No
    pub(crate) async fn evaluate(
        &self,
        session: &mut ResearchSession,
    ) -> Result<(Judgment, String), ResearchError> {
        let request = self
            .request(&self.settings.model)
            .message(Message::developer(prompts::research_goal(&session.goal)))
            .message(Message::assistant(session.findings_json()))
            .message(Message::user(prompts::EVALUATE_QUESTION));
        let exchange = self.llm.respond(request).await?;
        session.record_exchange(Step::Evaluate, exchange.id);

        let verdict = exchange.text.trim().to_string();
        Ok((Judgment::from_text(&verdict), verdict))
    }

    /// 请求新一组查询，链式引用规划交换
    pub(crate) async fn expand(
        &self,
        session: &mut ResearchSession,
    ) -> Result<Vec<String>, ResearchError> {
        let request = self
            .request(&self.settings.model)
            .message(Message::assistant(prompts::current_data(&session.findings_json())))
            .message(Message::user(prompts::expand(
                &session.goal,
                self.settings.queries_per_round,
            )))
            .chained_to(session.last_exchange(Step::Plan));
        let exchange = self.llm.respond(request).await?;
        session.record_exchange(Step::Expand, exchange.id);

        parse_string_list(&exchange.text, "expand")
    }

    /// 报告请求：developer 写作要求 + 检索结果转储
    pub(crate) async fn write_report(
        &self,
        session: &mut ResearchSession,
    ) -> Result<String, ResearchError> {
        let request = self
            .request(&self.settings.model)
            .message(Message::developer(prompts::report(&session.goal)))
            .message(Message::assistant(session.findings_json()));
        let exchange = self.llm.respond(request).await?;
        session.record_exchange(Step::Report, exchange.id);
        Ok(exchange.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ScriptedReply};

    fn researcher(mock: Arc<MockLlmClient>) -> Researcher {
        Researcher::new(mock, prompts::DEFAULT_INSTRUCTIONS, ResearchSettings::default())
    }

    #[tokio::test]
    async fn test_clarify_yields_questions_and_empty_answers() {
        let mock = Arc::new(MockLlmClient::new([ScriptedReply::text(
            r#"["1. Residential or commercial?", "2. Which region?", "3. Budget?"]"#,
        )]));
        let r = researcher(mock.clone());
        let mut session = ResearchSession::new("solar panel ROI").unwrap();

        let questions = r.clarify(&mut session).await.unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(session.answers, vec!["", "", ""]);
        assert_eq!(session.stage(), Stage::Clarifying);

        let req = &mock.requests()[0];
        assert_eq!(req.model, "gpt-4o-mini");
        assert!(!req.web_search);
        assert!(req.previous.is_none());
    }

    #[tokio::test]
    async fn test_clarify_malformed_keeps_stage() {
        let mock = Arc::new(MockLlmClient::new([ScriptedReply::text("1. Why?\n2. Where?")]));
        let r = researcher(mock);
        let mut session = ResearchSession::new("topic").unwrap();

        let err = r.clarify(&mut session).await.unwrap_err();
        assert!(matches!(err, ResearchError::MalformedOutput { step: "clarify", .. }));
        assert_eq!(session.stage(), Stage::Topic);
    }

    #[tokio::test]
    async fn test_plan_requires_all_answers() {
        let mock = Arc::new(MockLlmClient::new([ScriptedReply::text(r#"["a?", "b?"]"#)]));
        let r = researcher(mock.clone());
        let mut session = ResearchSession::new("topic").unwrap();
        r.clarify(&mut session).await.unwrap();
        session.set_answer(0, "yes").unwrap();

        let err = r.plan(&mut session).await.unwrap_err();
        assert!(matches!(err, ResearchError::IncompleteAnswers));
        // 未发起规划请求
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_plan_is_chained_to_clarify() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text(r#"["a?"]"#),
            ScriptedReply::text(r#"{"goal": "g", "queries": ["q1", "q2"]}"#),
        ]));
        let r = researcher(mock.clone());
        let mut session = ResearchSession::new("topic").unwrap();
        r.clarify(&mut session).await.unwrap();
        session.set_answer(0, "answer").unwrap();

        let plan = r.plan(&mut session).await.unwrap();
        assert_eq!(plan.queries, vec!["q1", "q2"]);
        assert_eq!(session.goal, "g");
        assert_eq!(session.stage(), Stage::Planned);

        let requests = mock.requests();
        assert_eq!(requests[1].previous, session.last_exchange(Step::Clarify));
        assert_eq!(requests[1].model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_plan_out_of_order() {
        let mock = Arc::new(MockLlmClient::default());
        let r = researcher(mock);
        let mut session = ResearchSession::new("topic").unwrap();
        assert!(matches!(
            r.plan(&mut session).await,
            Err(ResearchError::OutOfOrder {
                expected: Stage::Clarifying,
                actual: Stage::Topic
            })
        ));
    }
}
