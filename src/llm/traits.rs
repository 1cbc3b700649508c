//! 语言服务抽象
//!
//! 所有后端（OpenAI Responses / OpenAI 兼容 Chat / Mock）实现 LlmClient：respond 提交一次请求并返回一次交换（Exchange）。
//! 请求可携带上一次交换的引用（previous）以延续上下文，也可开启 Web 搜索能力。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::Message;

/// 服务端交换 ID（Responses API 的 response id，或兼容后端本地生成的 id）
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 搜索结果中的 URL 引用
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// 单次请求：模型、固定指令、输入消息、可选链式上下文与搜索开关
#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub model: String,
    pub instructions: String,
    pub input: Vec<Message>,
    pub previous: Option<ExchangeId>,
    pub web_search: bool,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            input: Vec::new(),
            previous: None,
            web_search: false,
        }
    }

    pub fn message(mut self, message: Message) -> Self {
        self.input.push(message);
        self
    }

    pub fn chained_to(mut self, previous: Option<ExchangeId>) -> Self {
        self.previous = previous;
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

/// 一次交换的结果：服务端 id、提取出的文本、承载文本的输出项引用与 URL 引用
#[derive(Clone, Debug)]
pub struct Exchange {
    pub id: ExchangeId,
    pub text: String,
    /// 承载回答文本的输出项 id（Responses API 的 message item id）；无则回退为交换 id
    pub source_ref: String,
    pub citations: Vec<Citation>,
}

/// 语言服务调用失败
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Response contained no text output")]
    EmptyOutput,

    #[error("Unknown exchange: {0}")]
    UnknownExchange(ExchangeId),

    #[error("Scripted replies exhausted")]
    Exhausted,
}

/// 语言服务 trait：一次请求得到一次交换
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn respond(&self, request: LlmRequest) -> Result<Exchange, LlmError>;

    /// 后端是否支持服务端 Web 搜索；不支持时 web_search 请求按普通请求处理
    fn supports_web_search(&self) -> bool {
        false
    }

    /// 后端名称（日志用）
    fn provider(&self) -> &str;
}
