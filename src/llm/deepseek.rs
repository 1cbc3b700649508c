//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! DeepSeek 提供与 OpenAI 兼容的 Chat API，但没有服务端 Web 搜索。
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use crate::llm::OpenAiClient;

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 客户端；api_key 由调用方解析（配置 / DEEPSEEK_API_KEY / 界面输入）
pub fn create_deepseek_client(api_key: &str, timeout_secs: u64) -> OpenAiClient {
    OpenAiClient::new("deepseek", Some(DEEPSEEK_BASE_URL), api_key, timeout_secs)
}
