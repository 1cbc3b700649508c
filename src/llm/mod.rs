//! LLM 层：语言服务抽象与实现（OpenAI Responses / OpenAI 兼容 Chat / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod responses;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedReply};
pub use openai::{ExchangeLog, OpenAiClient};
pub use responses::ResponsesClient;
pub use traits::{Citation, Exchange, ExchangeId, LlmClient, LlmError, LlmRequest};
