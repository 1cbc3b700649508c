//! Scout - Rust 人机协作调研助手
//!
//! 入口：加载配置、初始化日志、启动会话驱动与 TUI，并运行主循环。

use anyhow::Context;
use scout::{config::load_config, core::spawn_driver, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    // 日志写入文件：默认 info，可通过 RUST_LOG 覆盖
    observability::init(&cfg.app.log_file).context("Failed to initialize logging")?;
    tracing::info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "scout starting");

    // 会话驱动：返回命令发送端与状态接收端
    let (cmd_tx, state_rx) = spawn_driver(cfg);

    run_app(state_rx, cmd_tx).await.context("App run failed")?;

    Ok(())
}
