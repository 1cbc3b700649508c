//! 调研流程错误类型
//!
//! 不做自动重试：服务失败与结构化输出格式错误都以命名错误返回，由界面展示并允许用户重新触发当前步骤。

use thiserror::Error;

use crate::llm::LlmError;
use crate::research::Stage;

/// 调研会话各步骤可能出现的错误
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Language service error: {0}")]
    Service(#[from] LlmError),

    /// 服务返回的结构化输出（问题列表、计划、扩展查询）无法解析
    #[error("Malformed {step} output: {detail}")]
    MalformedOutput { step: &'static str, detail: String },

    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("Every clarifying question needs a non-empty answer")]
    IncompleteAnswers,

    #[error("No clarifying question at index {index} (have {len})")]
    AnswerIndex { index: usize, len: usize },

    #[error("Step requires stage {expected:?}, session is at {actual:?}")]
    OutOfOrder { expected: Stage, actual: Stage },

    #[error("Research cancelled")]
    Cancelled,
}

impl ResearchError {
    pub fn malformed(step: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedOutput {
            step,
            detail: detail.into(),
        }
    }
}
