//! MedAgent - 医疗问答智能体
//!
//! 入口：初始化日志、组装编排器，进入交互问答循环。
//! 命令：`:reset` 清空当前会话，`:quit` 退出。

use std::io::{self, BufRead, Write};

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use medagent::core::{create_orchestrator, load_config_or_default, TurnRequest, TurnStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config_or_default(None);
    let orchestrator = create_orchestrator(&cfg);
    let session_id = uuid::Uuid::new_v4().to_string();

    println!(
        "MedAgent ready (session {}). Tools: {}. Ask a medical question, :reset or :quit.",
        session_id,
        orchestrator.tool_names().join(", ")
    );

    let stdin = io::stdin();
    let mut reset_next = false;
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("stdin read failed")? == 0 {
            break; // EOF
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            ":quit" => break,
            ":reset" => {
                reset_next = true;
                println!("session will be reset on the next question");
                continue;
            }
            _ => {}
        }

        let req = TurnRequest {
            query: input.to_string(),
            session_id: Some(session_id.clone()),
            reset: std::mem::take(&mut reset_next),
        };
        match orchestrator.run_turn(req, CancellationToken::new()).await {
            Ok(report) => {
                let tag = match report.status {
                    TurnStatus::Success => "verified",
                    TurnStatus::Unverified => "UNVERIFIED",
                };
                println!("\n[{}] {}\n", tag, report.answer);
                if !report.safety_rationale.is_empty() {
                    println!("review: {}\n", report.safety_rationale);
                }
            }
            Err(e) => {
                eprintln!("turn failed: {}", e);
            }
        }
    }

    Ok(())
}
