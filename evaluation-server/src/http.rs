// HTTP surface for the evaluation UI.
//
// Endpoints:
//   GET  /api/bid-evaluation     full document
//   PUT  /api/bid-evaluation     full-document overwrite
//   POST /api/bid-evaluation     {action: "reset" | "resetToDefault"}
//   GET  /api/llm-config         current provider config
//   PUT  /api/llm-config         save provider config
//   POST /api/llm/generate       one-shot text generation
//
// Failure bodies carry generic messages only; underlying causes go to the
// tracing log.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::llm::client::{LlmClient, LlmError};
use crate::llm::config::{LlmConfig, LlmConfigStore, LlmProvider};
use crate::model::EvaluationDocument;
use crate::store::EvaluationStore;

/// Shared state behind every handler. The HTTP client is built once at
/// startup so generation calls reuse its connection pool.
pub struct AppContext {
    pub store: EvaluationStore,
    pub llm_config: LlmConfigStore,
    pub http: reqwest::Client,
}

type ApiError = (StatusCode, Json<Value>);

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route(
            "/api/bid-evaluation",
            get(get_evaluation).put(put_evaluation).post(post_evaluation),
        )
        .route("/api/llm-config", get(get_llm_config).put(put_llm_config))
        .route("/api/llm/generate", post(generate))
        // The UI is served from another origin during development.
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Bind `127.0.0.1:{port}` and serve until the process exits.
pub async fn run_server(ctx: Arc<AppContext>, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse()?;
    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("evaluation API listening on http://{addr}");
    axum::serve(listener, router).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Bid-evaluation handlers
// ---------------------------------------------------------------------------

async fn get_evaluation(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<EvaluationDocument>, ApiError> {
    match ctx.store.fetch() {
        Ok(doc) => Ok(Json(doc)),
        Err(e) => {
            error!("error reading evaluation data: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to read evaluation data" })),
            ))
        }
    }
}

async fn put_evaluation(
    State(ctx): State<Arc<AppContext>>,
    Json(doc): Json<EvaluationDocument>,
) -> Result<Json<Value>, ApiError> {
    match ctx.store.replace(doc) {
        Ok(written) => Ok(Json(json!({ "success": true, "data": written }))),
        Err(e) => {
            error!("error updating evaluation data: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to update evaluation data" })),
            ))
        }
    }
}

async fn post_evaluation(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let action = body.get("action").and_then(|a| a.as_str());

    let (result, message) = match action {
        Some("reset") => (
            ctx.store.reset_to_template(),
            "Evaluation data reset to template",
        ),
        Some("resetToDefault") => (
            ctx.store.reset_to_default_values(),
            "Evaluation data reset to default correct values",
        ),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid action" })),
            ));
        }
    };

    match result {
        Ok(()) => Ok(Json(json!({ "success": true, "message": message }))),
        Err(e) => {
            error!("error resetting evaluation data: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to reset evaluation data" })),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// LLM config handlers
// ---------------------------------------------------------------------------

async fn get_llm_config(State(ctx): State<Arc<AppContext>>) -> Json<LlmConfig> {
    Json(ctx.llm_config.load())
}

async fn put_llm_config(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<LlmConfig>,
) -> Result<Json<Value>, ApiError> {
    match ctx.llm_config.save(config) {
        Ok(()) => Ok(Json(json!({ "success": true }))),
        Err(e) => {
            error!("error saving llm config: {e}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to save LLM configuration" })),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Generation handler
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GenerateRequest {
    prompt: String,
    max_tokens: Option<u32>,
    /// Optional per-call overrides; the UI passes these explicitly.
    provider: Option<LlmProvider>,
    api_key: Option<String>,
}

async fn generate(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut config = ctx.llm_config.load();
    if let Some(provider) = req.provider {
        config.provider = provider;
    }
    if let Some(key) = req.api_key {
        match config.provider {
            LlmProvider::Cdac => config.cdac_api_key = key,
            LlmProvider::Gemini => config.gemini_api_key = key,
        }
    }

    let client = LlmClient::from_config(&config, ctx.http.clone());
    let max_tokens = req.max_tokens.unwrap_or(1024);

    match client.generate(&req.prompt, max_tokens).await {
        Ok(text) => Ok(Json(json!({ "response": text }))),
        Err(LlmError::NotConfigured) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "LLM provider not configured" })),
        )),
        Err(e @ LlmError::Overloaded { .. }) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": e.to_string() })),
        )),
        Err(e) => {
            error!("generation request failed: {e}");
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({ "detail": "Generation request failed" })),
            ))
        }
    }
}
