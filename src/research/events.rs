//! 检索循环过程事件：供 TUI 展示进度

use serde::Serialize;

use crate::research::LoopOutcome;

/// 单步过程事件（可序列化为 JSON 写入日志）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 新一轮开始
    RoundStarted { round: usize, queries: usize },
    /// 正在执行搜索
    Searching { round: usize, query: String },
    /// 得到一条检索结果（预览）
    FindingAdded {
        query: String,
        preview: String,
        total: usize,
    },
    /// 正在做充分性判断
    Evaluating { findings: usize },
    /// 判断结果
    Judged { sufficient: bool, verdict: String },
    /// 新一组查询
    Expanded { queries: Vec<String> },
    /// 循环结束
    Finished {
        rounds: usize,
        findings: usize,
        outcome: LoopOutcome,
    },
}
