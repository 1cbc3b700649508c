//! 调研层：会话状态、Prompt 模板、结构化输出解析、澄清 / 规划步骤、检索主循环、报告生成

pub mod events;
pub mod loop_;
pub mod parse;
pub mod prompts;
pub mod report;
pub mod researcher;
pub mod session;

pub use events::ResearchEvent;
pub use loop_::{research_loop, Judgment, LoopOutcome, LoopSummary};
pub use parse::{parse_json_block, parse_string_list};
pub use report::{citation_markers, synthesize_report, Report};
pub use researcher::{ResearchSettings, Researcher};
pub use session::{ExchangeRecord, Finding, Plan, ResearchSession, Stage, Step};
