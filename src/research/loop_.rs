//! 检索主循环
//!
//! Searching（逐条执行当前查询集）-> Evaluating（充分性判断）-> Done，或 Expanding（生成新查询集）-> Searching。
//! 结束条件由外部判断决定；可选轮数上限与跨轮查询去重，支持 Cancel。
//! 可选 event_tx：向 TUI 推送轮次 / 搜索 / 判断 / 扩展事件。

use std::collections::HashSet;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::ResearchError;
use crate::research::{ResearchEvent, ResearchSession, Researcher, Stage};

/// 事件预览最大字符数
const FINDING_PREVIEW_CHARS: usize = 160;

/// 充分性判断：回复中包含 "yes"（不区分大小写）即视为充分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Sufficient,
    Insufficient,
}

impl Judgment {
    pub fn from_text(text: &str) -> Self {
        if text.to_lowercase().contains("yes") {
            Judgment::Sufficient
        } else {
            Judgment::Insufficient
        }
    }

    pub fn is_sufficient(self) -> bool {
        self == Judgment::Sufficient
    }
}

/// 循环结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// 判断为充分
    Sufficient,
    /// 达到轮数上限
    RoundLimit,
    /// 去重后没有新查询可执行
    Exhausted,
}

/// 循环结果摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub rounds: usize,
    pub outcome: LoopOutcome,
    pub findings: usize,
}

fn emit(event_tx: Option<&mpsc::UnboundedSender<ResearchEvent>>, event: ResearchEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event);
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), ResearchError> {
    if cancel.is_cancelled() {
        Err(ResearchError::Cancelled)
    } else {
        Ok(())
    }
}

fn normalize_query(q: &str) -> String {
    q.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(FINDING_PREVIEW_CHARS).collect();
    if text.chars().count() > FINDING_PREVIEW_CHARS {
        out.push('…');
    }
    out.replace('\n', " ")
}

/// 执行检索循环：会话需处于 Planned，结束后进入 Researched。
/// 取消或出错时会话保持 Planned，已收集的结果保留。
pub async fn research_loop(
    researcher: &Researcher,
    session: &mut ResearchSession,
    event_tx: Option<&mpsc::UnboundedSender<ResearchEvent>>,
    cancel: CancellationToken,
) -> Result<LoopSummary, ResearchError> {
    session.expect_stage(Stage::Planned)?;
    let settings = researcher.settings().clone();

    let mut working_set = session.queries.clone();
    let mut executed: HashSet<String> = HashSet::new();
    let mut round = 0usize;

    let outcome = loop {
        round += 1;

        if settings.dedupe_queries {
            let mut seen_this_round = HashSet::new();
            working_set.retain(|q| {
                let key = normalize_query(q);
                !executed.contains(&key) && seen_this_round.insert(key)
            });
            if working_set.is_empty() {
                tracing::info!(round, "no new queries left after dedup");
                round -= 1;
                break LoopOutcome::Exhausted;
            }
        }

        tracing::info!(round, queries = working_set.len(), "research round started");
        emit(
            event_tx,
            ResearchEvent::RoundStarted {
                round,
                queries: working_set.len(),
            },
        );

        // Searching
        for query in &working_set {
            check_cancel(&cancel)?;
            emit(
                event_tx,
                ResearchEvent::Searching {
                    round,
                    query: query.clone(),
                },
            );
            let finding = researcher.search(session, query, round).await?;
            tracing::debug!(query = %query, chars = finding.text.len(), "finding added");
            let event = ResearchEvent::FindingAdded {
                query: query.clone(),
                preview: preview(&finding.text),
                total: session.findings().len() + 1,
            };
            session.push_finding(finding);
            executed.insert(normalize_query(query));
            emit(event_tx, event);
        }

        // Evaluating
        check_cancel(&cancel)?;
        emit(
            event_tx,
            ResearchEvent::Evaluating {
                findings: session.findings().len(),
            },
        );
        let (judgment, verdict) = researcher.evaluate(session).await?;
        tracing::info!(round, sufficient = judgment.is_sufficient(), verdict = %verdict, "sufficiency judged");
        emit(
            event_tx,
            ResearchEvent::Judged {
                sufficient: judgment.is_sufficient(),
                verdict,
            },
        );
        if judgment.is_sufficient() {
            break LoopOutcome::Sufficient;
        }

        if let Some(max) = settings.max_rounds {
            if round >= max {
                tracing::warn!(round, max, "round limit reached before the goal was judged satisfied");
                break LoopOutcome::RoundLimit;
            }
        }

        // Expanding
        check_cancel(&cancel)?;
        working_set = researcher.expand(session).await?;
        tracing::info!(round, queries = ?working_set, "queries expanded");
        emit(
            event_tx,
            ResearchEvent::Expanded {
                queries: working_set.clone(),
            },
        );
    };

    session.advance(Stage::Researched);
    let summary = LoopSummary {
        rounds: round,
        outcome,
        findings: session.findings().len(),
    };
    emit(
        event_tx,
        ResearchEvent::Finished {
            rounds: summary.rounds,
            findings: summary.findings,
            outcome,
        },
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::llm::{MockLlmClient, ScriptedReply};
    use crate::research::{prompts, Plan, ResearchSettings, Step};

    fn planned_session(queries: &[&str]) -> ResearchSession {
        let mut s = ResearchSession::new("solar panel ROI").unwrap();
        s.set_questions(vec!["q?".into()]);
        s.set_answer(0, "a").unwrap();
        s.advance(Stage::Clarifying);
        s.record_exchange(Step::Plan, crate::llm::ExchangeId("plan-1".into()));
        s.set_plan(Plan {
            goal: "Determine payback period".into(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
        });
        s.advance(Stage::Planned);
        s
    }

    fn researcher(mock: Arc<MockLlmClient>, settings: ResearchSettings) -> Researcher {
        Researcher::new(mock, prompts::DEFAULT_INSTRUCTIONS, settings)
    }

    #[test]
    fn test_judgment_is_case_insensitive_substring() {
        assert_eq!(Judgment::from_text("Yes, this covers it."), Judgment::Sufficient);
        assert_eq!(Judgment::from_text("YES"), Judgment::Sufficient);
        assert_eq!(Judgment::from_text("No, missing pricing data."), Judgment::Insufficient);
        assert_eq!(Judgment::from_text(""), Judgment::Insufficient);
    }

    #[tokio::test]
    async fn test_findings_are_rounds_times_queries() {
        let mut replies = Vec::new();
        for round in 0..3 {
            for i in 0..2 {
                replies.push(ScriptedReply::text(format!("result r{} q{}", round, i)));
            }
            if round < 2 {
                replies.push(ScriptedReply::text("No"));
                replies.push(ScriptedReply::text(r#"["same a", "same b"]"#));
            } else {
                replies.push(ScriptedReply::text("Yes"));
            }
        }
        let mock = Arc::new(MockLlmClient::new(replies));
        let r = researcher(mock.clone(), ResearchSettings::default());
        let mut session = planned_session(&["same a", "same b"]);

        let summary = research_loop(&r, &mut session, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.rounds, 3);
        assert_eq!(summary.outcome, LoopOutcome::Sufficient);
        assert_eq!(session.findings().len(), 3 * 2);
        assert_eq!(session.stage(), Stage::Researched);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_searches_enable_web_search_and_expansion_chains_to_plan() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text("r1"),
            ScriptedReply::text("No"),
            ScriptedReply::text(r#"["next"]"#),
            ScriptedReply::text("r2"),
            ScriptedReply::text("yes"),
        ]));
        let r = researcher(mock.clone(), ResearchSettings::default());
        let mut session = planned_session(&["first"]);

        research_loop(&r, &mut session, None, CancellationToken::new())
            .await
            .unwrap();

        let requests = mock.requests();
        assert!(requests[0].web_search);
        assert_eq!(requests[0].input[0].content, "search: first");
        assert!(!requests[1].web_search);
        assert_eq!(
            requests[2].previous,
            Some(crate::llm::ExchangeId("plan-1".into()))
        );
        assert_eq!(requests[3].input[0].content, "search: next");
        assert_eq!(session.findings()[1].round, 2);
    }

    #[tokio::test]
    async fn test_round_limit_stops_loop() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text("r1"),
            ScriptedReply::text("No"),
            ScriptedReply::text(r#"["q2"]"#),
            ScriptedReply::text("r2"),
            ScriptedReply::text("No"),
        ]));
        let settings = ResearchSettings {
            max_rounds: Some(2),
            ..ResearchSettings::default()
        };
        let r = researcher(mock.clone(), settings);
        let mut session = planned_session(&["q1"]);

        let summary = research_loop(&r, &mut session, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.outcome, LoopOutcome::RoundLimit);
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.findings, 2);
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_dedupe_exhausts_repeated_queries() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text("r1"),
            ScriptedReply::text("No"),
            ScriptedReply::text(r#"["  Q1 "]"#),
        ]));
        let settings = ResearchSettings {
            dedupe_queries: true,
            ..ResearchSettings::default()
        };
        let r = researcher(mock, settings);
        let mut session = planned_session(&["q1"]);

        let summary = research_loop(&r, &mut session, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.outcome, LoopOutcome::Exhausted);
        assert_eq!(summary.rounds, 1);
        assert_eq!(summary.findings, 1);
    }

    #[tokio::test]
    async fn test_malformed_expansion_is_named_error() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text("r1"),
            ScriptedReply::text("No"),
            ScriptedReply::text("1. another search"),
        ]));
        let r = researcher(mock, ResearchSettings::default());
        let mut session = planned_session(&["q1"]);

        let err = research_loop(&r, &mut session, None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::MalformedOutput { step: "expand", .. }));
        assert_eq!(session.stage(), Stage::Planned);
        assert_eq!(session.findings().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_search() {
        let mock = Arc::new(MockLlmClient::default());
        let r = researcher(mock.clone(), ResearchSettings::default());
        let mut session = planned_session(&["q1"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = research_loop(&r, &mut session, None, cancel).await.unwrap_err();
        assert!(matches!(err, ResearchError::Cancelled));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let mock = Arc::new(MockLlmClient::new([
            ScriptedReply::text("r1"),
            ScriptedReply::text("Yes"),
        ]));
        let r = researcher(mock, ResearchSettings::default());
        let mut session = planned_session(&["q1"]);
        let (tx, mut rx) = mpsc::unbounded_channel();

        research_loop(&r, &mut session, Some(&tx), CancellationToken::new())
            .await
            .unwrap();
        drop(tx);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(match ev {
                ResearchEvent::RoundStarted { .. } => "round",
                ResearchEvent::Searching { .. } => "search",
                ResearchEvent::FindingAdded { .. } => "finding",
                ResearchEvent::Evaluating { .. } => "evaluate",
                ResearchEvent::Judged { .. } => "judged",
                ResearchEvent::Expanded { .. } => "expanded",
                ResearchEvent::Finished { .. } => "finished",
            });
        }
        assert_eq!(
            kinds,
            vec!["round", "search", "finding", "evaluate", "judged", "finished"]
        );
    }
}
