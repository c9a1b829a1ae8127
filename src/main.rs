//! product-intel 命令行入口
//!
//! 初始化日志与配置，构建 Sidekick；成功标准取第一个参数（或 PINTEL_GOAL），
//! 之后逐行读取 stdin 中的请求并运行循环。Ctrl+C / SIGTERM 取消进行中的 run，任何退出路径都会 cleanup。

use std::sync::Arc;

use anyhow::Context;
use product_intel::config::load_config;
use product_intel::core::{SessionId, ShutdownManager};
use product_intel::memory::ChatTurn;
use product_intel::observability;
use product_intel::sidekick::SidekickEvent;
use product_intel::Sidekick;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let goal = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PINTEL_GOAL").ok())
        .unwrap_or_default();

    let sidekick = Sidekick::setup(&cfg).context("Failed to set up sidekick")?;
    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let result = repl(&sidekick, &shutdown, &goal, cfg.app.session_dir.is_some()).await;
    sidekick.cleanup();
    result
}

async fn repl(sidekick: &Sidekick, shutdown: &ShutdownManager, goal: &str, persistent: bool) -> anyhow::Result<()> {
    let session_id = std::env::var("PINTEL_SESSION")
        .map(|s| SessionId::from(s.as_str()))
        .unwrap_or_default();
    if persistent {
        eprintln!("session: {}", session_id);
    }
    eprintln!("tools: {}", sidekick.tool_names().join(", "));
    eprintln!("Enter a request per line (Ctrl+D to quit).");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SidekickEvent>();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let token = shutdown.token();

    loop {
        let line = tokio::select! {
            _ = shutdown.wait_for_shutdown() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };
        let request = line.trim();
        if request.is_empty() {
            continue;
        }

        let outcome = if persistent {
            sidekick
                .run_session(&session_id, request, goal, &token, Some(&event_tx))
                .await
        } else {
            sidekick
                .run_with(request, goal, &history, &token, Some(&event_tx))
                .await
                .map(|all| {
                    let new_turns = all[history.len()..].to_vec();
                    history = all;
                    new_turns
                })
        };

        match outcome {
            Ok(turns) => {
                for turn in turns.iter().filter(|t| t.role != "user") {
                    println!("\n{}\n", turn.content);
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "run failed");
                if shutdown.is_shutdown() {
                    break;
                }
            }
        }
    }

    drop(event_tx);
    let _ = printer.await;
    Ok(())
}

fn print_event(ev: &SidekickEvent) {
    match ev {
        SidekickEvent::Thinking => eprintln!("... thinking"),
        SidekickEvent::ToolCall { tool, args } => eprintln!("-> {} {}", tool, args),
        SidekickEvent::Observation { tool, preview } => eprintln!("<- {}: {}", tool, preview),
        SidekickEvent::ToolFailure { tool, reason } => eprintln!("!! {}: {}", tool, reason),
        SidekickEvent::LimitReached { detail } => eprintln!("!! {}", detail),
        SidekickEvent::TokenUsage { total_tokens, .. } => eprintln!("tokens: {}", total_tokens),
        SidekickEvent::Error { text } => eprintln!("error: {}", text),
        SidekickEvent::StepUpdate { .. } | SidekickEvent::Verdict { .. } => {
            if let Ok(line) = serde_json::to_string(ev) {
                tracing::debug!(event = %line, "sidekick event");
            }
        }
    }
}
