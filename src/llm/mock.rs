//! Mock 语言服务（用于测试，无需 API）
//!
//! 按顺序弹出预置回复；记录每次收到的请求，便于断言模型选择、链式引用与搜索开关。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Citation, Exchange, ExchangeId, LlmClient, LlmError, LlmRequest};

/// 一条预置回复
#[derive(Clone, Debug)]
pub struct ScriptedReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn cited(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: vec![Citation {
                url: url.into(),
                title: None,
            }],
        }
    }
}

/// Mock 客户端：回复耗尽时返回 LlmError::Exhausted
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<LlmRequest>>,
    counter: AtomicUsize,
}

impl MockLlmClient {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn respond(&self, request: LlmRequest) -> Result<Exchange, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or(LlmError::Exhausted)?;

        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Exchange {
            id: ExchangeId(format!("mock-resp-{}", n)),
            source_ref: format!("mock-msg-{}", n),
            text: reply.text,
            citations: reply.citations,
        })
    }

    fn supports_web_search(&self) -> bool {
        true
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
