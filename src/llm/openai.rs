//! OpenAI 兼容 Chat Completions 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（DeepSeek、自建代理等）。Chat API 没有服务端会话，
//! 因此在本地按交换 id 保存每次请求的完整消息历史，previous 指向某次交换时重放该历史。
//! 兼容端点不提供服务端 Web 搜索，web_search 请求按普通请求发送（首次时记录 warn）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use uuid::Uuid;

use crate::llm::responses::http_client;
use crate::llm::{Exchange, ExchangeId, LlmClient, LlmError, LlmRequest, Message, Role};

/// 本地交换历史：交换 id -> 该交换结束时的完整消息序列（不含 instructions）
#[derive(Debug, Default)]
pub struct ExchangeLog {
    entries: Mutex<HashMap<ExchangeId, Vec<Message>>>,
}

impl ExchangeLog {
    /// previous 对应的历史 + 本次输入；previous 未知时报错
    pub fn conversation(&self, request: &LlmRequest) -> Result<Vec<Message>, LlmError> {
        let mut messages = match &request.previous {
            Some(prev) => {
                let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
                entries
                    .get(prev)
                    .cloned()
                    .ok_or_else(|| LlmError::UnknownExchange(prev.clone()))?
            }
            None => Vec::new(),
        };
        messages.extend(request.input.iter().cloned());
        Ok(messages)
    }

    /// 记录一次交换：conversation + 助手回复，返回新 id
    pub fn record(&self, mut conversation: Vec<Message>, reply: &str) -> ExchangeId {
        let id = ExchangeId(format!("local-{}", Uuid::new_v4()));
        conversation.push(Message::assistant(reply));
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), conversation);
        id
    }
}

/// OpenAI 兼容客户端：持有 Client、本地交换历史与后端名
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    provider: String,
    log: ExchangeLog,
    warned_no_search: AtomicBool,
}

impl OpenAiClient {
    pub fn new(
        provider: &str,
        base_url: Option<&str>,
        api_key: &str,
        timeout_secs: u64,
    ) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        let client = Client::with_config(config).with_http_client(http_client(timeout_secs));

        Self {
            client,
            provider: provider.to_string(),
            log: ExchangeLog::default(),
            warned_no_search: AtomicBool::new(false),
        }
    }

    fn to_openai_messages(
        instructions: &str,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::ApiRequest {
            message: e.to_string(),
        };

        let mut out = Vec::with_capacity(messages.len() + 1);
        if !instructions.trim().is_empty() {
            out.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(instructions.to_string())
                    .build()
                    .map_err(build_err)?,
            ));
        }
        for m in messages {
            let msg = match m.role {
                Role::Developer => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
            };
            out.push(msg);
        }
        Ok(out)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn respond(&self, request: LlmRequest) -> Result<Exchange, LlmError> {
        if request.web_search && !self.warned_no_search.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                provider = %self.provider,
                "Provider has no server-side web search; search requests are answered from the model alone"
            );
        }

        let conversation = self.log.conversation(&request)?;
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(Self::to_openai_messages(&request.instructions, &conversation)?)
            .build()
            .map_err(|e| LlmError::ApiRequest {
                message: e.to_string(),
            })?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| LlmError::ApiRequest {
                message: e.to_string(),
            })?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyOutput);
        }

        let id = self.log.record(conversation, &content);
        Ok(Exchange {
            source_ref: id.to_string(),
            id,
            text: content,
            citations: Vec::new(),
        })
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_log_replays_chain() {
        let log = ExchangeLog::default();
        let first = LlmRequest::new("m", "i").message(Message::user("topic?"));
        let convo = log.conversation(&first).unwrap();
        let id = log.record(convo, "1. Why?");

        let second = LlmRequest::new("m", "i")
            .message(Message::user("plan please"))
            .chained_to(Some(id));
        let convo = log.conversation(&second).unwrap();
        assert_eq!(
            convo,
            vec![
                Message::user("topic?"),
                Message::assistant("1. Why?"),
                Message::user("plan please"),
            ]
        );
    }

    #[test]
    fn test_exchange_log_unknown_previous() {
        let log = ExchangeLog::default();
        let request = LlmRequest::new("m", "i").chained_to(Some(ExchangeId("nope".into())));
        assert!(matches!(
            log.conversation(&request),
            Err(LlmError::UnknownExchange(_))
        ));
    }

    #[test]
    fn test_developer_maps_to_system() {
        let msgs = OpenAiClient::to_openai_messages(
            "be brief",
            &[Message::developer("goal"), Message::user("q")],
        )
        .unwrap();
        assert_eq!(msgs.len(), 3);
        assert!(matches!(msgs[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(msgs[1], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(msgs[2], ChatCompletionRequestMessage::User(_)));
    }
}
