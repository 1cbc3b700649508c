//! 报告生成：目标 + 全部检索结果 -> 带 [n] 行内引用与参考列表的报告
//!
//! 报告原样展示；引用标记只做检查并记录 warn，不阻断。

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;

use crate::core::ResearchError;
use crate::research::{ResearchSession, Researcher, Stage};

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,4})\]").expect("valid citation regex"))
}

/// 参考列表条目：行首（可带列表符号）的 [n]
fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:[-*]\s*)?\[(\d{1,4})\]").expect("valid reference regex")
    })
}

/// 文本中出现的全部 [n] 标记（去重、升序）
pub fn citation_markers(text: &str) -> Vec<u32> {
    marker_re()
        .captures_iter(text)
        .filter_map(|c| c[1].parse().ok())
        .collect::<BTreeSet<u32>>()
        .into_iter()
        .collect()
}

/// 最终报告
#[derive(Clone, Debug)]
pub struct Report {
    pub goal: String,
    /// 服务返回的报告正文（Markdown，原样）
    pub body: String,
    /// 所有检索结果中出现的来源 URL（去重，保持首次出现顺序）
    pub sources: Vec<String>,
    pub generated_at: DateTime<Local>,
}

impl Report {
    /// 正文中使用但参考列表里没有对应条目的标记
    pub fn unresolved_markers(&self) -> Vec<u32> {
        let referenced: BTreeSet<u32> = reference_re()
            .captures_iter(&self.body)
            .filter_map(|c| c[1].parse().ok())
            .collect();
        citation_markers(&self.body)
            .into_iter()
            .filter(|n| !referenced.contains(n))
            .collect()
    }
}

/// 汇总检索结果中的来源 URL
fn collect_sources(session: &ResearchSession) -> Vec<String> {
    let mut seen = BTreeSet::new();
    session
        .findings()
        .iter()
        .flat_map(|f| f.citations.iter())
        .filter(|c| seen.insert(c.url.clone()))
        .map(|c| c.url.clone())
        .collect()
}

/// 生成报告：会话需处于 Researched，完成后进入 Reported
pub async fn synthesize_report(
    researcher: &Researcher,
    session: &mut ResearchSession,
) -> Result<Report, ResearchError> {
    session.expect_stage(Stage::Researched)?;

    let body = researcher.write_report(session).await?;
    let report = Report {
        goal: session.goal.clone(),
        body,
        sources: collect_sources(session),
        generated_at: Local::now(),
    };

    let markers = citation_markers(&report.body);
    if markers.is_empty() {
        tracing::warn!("report contains no [n] citation markers");
    }
    let unresolved = report.unresolved_markers();
    if !unresolved.is_empty() {
        tracing::warn!(?unresolved, "report cites markers missing from its reference list");
    }
    tracing::info!(
        chars = report.body.len(),
        markers = markers.len(),
        sources = report.sources.len(),
        "report ready"
    );

    session.report = Some(report.clone());
    session.advance(Stage::Reported);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn report(body: &str) -> Report {
        Report {
            goal: "g".into(),
            body: body.into(),
            sources: vec![],
            generated_at: Local::now(),
        }
    }

    #[test]
    fn test_citation_markers_sorted_unique() {
        let text = "Costs fell [2]. Payback is 8 years [1][2]. See [10].";
        assert_eq!(citation_markers(text), vec![1, 2, 10]);
        assert!(citation_markers("no citations here").is_empty());
    }

    #[test]
    fn test_unresolved_markers() {
        let r = report(
            "Costs fell [1]. Incentives help [2]. Net metering [3].\n\n## References\n[1] https://a.example\n- [2] https://b.example\n",
        );
        assert_eq!(r.unresolved_markers(), vec![3]);
    }

    #[test]
    fn test_all_resolved() {
        let r = report("Claim [1].\n\nReferences:\n1. placeholder\n  [1] https://a.example");
        assert!(r.unresolved_markers().is_empty());
    }
}
