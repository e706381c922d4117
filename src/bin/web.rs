//! MedAgent Web API
//!
//! 启动: cargo run --bin medagent-web --features web
//! POST /run {query, session_id?, reset?} -> {status, answer, safety_verdict, safety_rationale, session_id}

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use medagent::core::{
    create_orchestrator, load_config_or_default, AgentError, Orchestrator, TurnRequest, TurnStatus,
};

struct AppState {
    orchestrator: Orchestrator,
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    query: String,
    session_id: Option<String>,
    #[serde(default)]
    reset: bool,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    status: TurnStatus,
    answer: String,
    safety_verdict: bool,
    safety_rationale: String,
    session_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    detail: String,
}

/// 致命错误到 HTTP 状态码的映射：输入过长 400，生成后端不可达 503，其余 500
fn error_response(e: AgentError) -> Response {
    let code = match &e {
        AgentError::PromptTooLarge { .. } => StatusCode::BAD_REQUEST,
        AgentError::GenerationUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        code,
        Json(ErrorResponse {
            status: "error",
            detail: e.to_string(),
        }),
    )
        .into_response()
}

async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunRequest>,
) -> Response {
    let turn = TurnRequest {
        query: req.query,
        session_id: req.session_id,
        reset: req.reset,
    };
    match state
        .orchestrator
        .run_turn(turn, CancellationToken::new())
        .await
    {
        Ok(report) => Json(RunResponse {
            status: report.status,
            answer: report.answer,
            safety_verdict: report.safety_verdict,
            safety_rationale: report.safety_rationale,
            session_id: report.session_id,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let cfg = load_config_or_default(None);
    let state = Arc::new(AppState {
        orchestrator: create_orchestrator(&cfg),
    });

    let app = Router::new()
        .route("/run", post(run_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = std::env::var("MEDAGENT_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    tracing::info!(%addr, "medagent-web listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
