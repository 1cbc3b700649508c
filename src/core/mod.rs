//! 核心编排层：错误类型、UI 状态投影、会话驱动

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::ResearchError;
pub use orchestrator::{
    create_llm_from_config, research_settings, spawn_driver, spawn_driver_with, Command,
};
pub use state::{UiState, WizardStep};
