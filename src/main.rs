//! Reframe - CBT 认知重构对话
//!
//! 入口：加载配置、初始化日志、创建会话运行时与 TUI，并运行主循环。

use std::path::Path;

use anyhow::Context;
use reframe::{config::load_config, core::create_session_runtime, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TUI 占用终端，日志写文件；默认 info，可通过 RUST_LOG 覆盖
    observability::init(Some(Path::new("logs/reframe.log"))).context("Failed to init logging")?;

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    tracing::info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "Starting session");

    // 命令发送端交给 TUI，状态接收端驱动渲染
    let (cmd_tx, state_rx) = create_session_runtime(cfg);

    run_app(state_rx, cmd_tx).await.context("App run failed")?;

    Ok(())
}
