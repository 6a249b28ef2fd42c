//! HTTP trigger endpoint
//!
//! `POST /webhook` runs one full crawl synchronously and always answers 200;
//! the `status` field tells success from failure. Runs are serialised, so a
//! trigger that arrives mid-run waits for the current run to finish. The
//! log file is reset at the start of each triggered run.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::cleanup::{log_stale_log_removal, truncate_log};
use crate::pipeline::Pipeline;

pub const SERVICE_NAME: &str = "eSIM Crawler Webhook";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the axum router for the trigger endpoints.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(trigger))
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting trigger server on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Webhook endpoint: http://{}/webhook", addr);
    axum::serve(listener, router(state)).await
}

async fn trigger(State(state): State<AppState>, body: Option<Json<Value>>) -> Json<Value> {
    let data = body.map(|Json(value)| value).unwrap_or(Value::Null);

    let _running = state.run_lock.lock().await;
    let config = state.pipeline.config();
    if config.logging.file {
        let removal = truncate_log(&config.files.log_file);
        log_stale_log_removal(&config.files.log_file, &removal);
    }
    info!("Webhook triggered with data: {}", data);

    let response = match state.pipeline.run_once().await {
        Ok(summary) => {
            info!("Crawler completed successfully");
            json!({
                "status": "success",
                "message": "eSIM crawler completed successfully",
                "crawler_output": summary,
                "data": data,
                "timestamp": Utc::now().to_rfc3339(),
            })
        }
        Err(e) => {
            error!("Crawler failed: {}", e);
            json!({
                "status": "error",
                "message": "eSIM crawler failed",
                "error": e.to_string(),
                "data": data,
                "timestamp": Utc::now().to_rfc3339(),
            })
        }
    };
    Json(response)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "webhook": "POST /webhook - Trigger eSIM device crawling",
            "health": "GET /health - Health check",
            "root": "GET / - This information",
        },
        "usage": "Send POST request to /webhook with any JSON data to trigger crawling",
    }))
}
