//! OpenAI Responses API 客户端
//!
//! 直接用 reqwest 调用 `POST {base}/responses`：支持 previous_response_id 链式上下文与服务端 web_search 工具。
//! 输出中可能先有 web_search_call 项，再有 message 项；文本取所有 message 项的 output_text 拼接，
//! source_ref 取最后一个 message 项的 id，URL 引用取自 url_citation 注解。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{Citation, Exchange, ExchangeId, LlmClient, LlmError, LlmRequest};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// 服务端 Web 搜索工具类型
const WEB_SEARCH_TOOL: &str = "web_search";

#[derive(Debug, Deserialize)]
struct ResponseBody {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        id: String,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    UrlCitation {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    #[serde(other)]
    Other,
}

/// 构建带请求超时的 HTTP Client（timeout_secs 为 0 时不设超时）；构建失败时记录 warn 并退回默认 Client
pub(crate) fn http_client(timeout_secs: u64) -> Client {
    let mut builder = Client::builder();
    if timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_secs));
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(
            error = %e,
            timeout_secs,
            "Failed to build HTTP client, falling back to defaults without request timeout"
        );
        Client::new()
    })
}

/// Responses API 客户端：持有 HTTP Client、base_url 与 API Key
pub struct ResponsesClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ResponsesClient {
    /// timeout_secs 为 0 时不设置请求超时
    pub fn new(base_url: Option<&str>, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            client: http_client(timeout_secs),
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request_body(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "instructions": request.instructions,
            "input": request.input,
        });
        if let Some(prev) = &request.previous {
            body["previous_response_id"] = json!(prev.as_str());
        }
        if request.web_search {
            body["tools"] = json!([{ "type": WEB_SEARCH_TOOL }]);
        }
        body
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 => {
                tracing::debug!(body = %body, "Authentication failed (401)");
                LlmError::AuthFailed {
                    provider: "openai".to_string(),
                }
            }
            code => LlmError::Status {
                status: code,
                body: body.to_string(),
            },
        }
    }

    /// 将 Responses API 返回体解析为 Exchange
    fn parse_response(body: &str) -> Result<Exchange, LlmError> {
        let parsed: ResponseBody =
            serde_json::from_str(body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        let mut texts = Vec::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut source_ref = None;
        for item in parsed.output {
            if let OutputItem::Message { id, content } = item {
                for part in content {
                    if let ContentPart::OutputText { text, annotations } = part {
                        texts.push(text);
                        for ann in annotations {
                            if let Annotation::UrlCitation { url, title } = ann {
                                if !citations.iter().any(|c| c.url == url) {
                                    citations.push(Citation { url, title });
                                }
                            }
                        }
                    }
                }
                source_ref = Some(id);
            }
        }

        if texts.is_empty() {
            return Err(LlmError::EmptyOutput);
        }

        Ok(Exchange {
            source_ref: source_ref.unwrap_or_else(|| parsed.id.clone()),
            id: ExchangeId(parsed.id),
            text: texts.join("\n"),
            citations,
        })
    }
}

#[async_trait]
impl LlmClient for ResponsesClient {
    async fn respond(&self, request: LlmRequest) -> Result<Exchange, LlmError> {
        let url = format!("{}/responses", self.base_url);
        let body = Self::request_body(&request);

        tracing::debug!(
            url = %url,
            model = %request.model,
            web_search = request.web_search,
            chained = request.previous.is_some(),
            "Sending responses request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        Self::parse_response(&response_body)
    }

    fn supports_web_search(&self) -> bool {
        true
    }

    fn provider(&self) -> &str {
        "openai"
    }
}
