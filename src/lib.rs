//! Scout - Rust 人机协作调研助手
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、UI 状态投影、会话驱动
//! - **llm**: 语言服务抽象与实现（OpenAI Responses / OpenAI 兼容 Chat / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **research**: 会话状态、Prompt、澄清 / 规划、检索主循环、报告
//! - **ui**: Ratatui TUI 向导

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod research;
pub mod ui;
