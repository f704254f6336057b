use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::compare::{ComparisonManager, ComparisonReport};
use crate::engine::{ArticleAnalysis, BatchComparisonEngine};
use crate::registry::ModelDescriptor;

/// Requests above this many texts are rejected.
pub const MAX_BATCH_TEXTS: usize = 256;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<BatchComparisonEngine>,
    manager: Arc<ComparisonManager>,
}

impl AppState {
    pub fn new(engine: Arc<BatchComparisonEngine>, manager: Arc<ComparisonManager>) -> Self {
        Self { engine, manager }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/models", get(models))
        .route("/analyze/batch", post(analyze_batch))
        .route("/compare", post(compare))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct ModelsResp {
    policy: crate::analyze::ScorePolicy,
    models: Vec<ModelDescriptor>,
}

async fn models(State(state): State<AppState>) -> Json<ModelsResp> {
    Json(ModelsResp {
        policy: state.engine.policy(),
        models: state.engine.describe().into_iter().cloned().collect(),
    })
}

#[derive(Deserialize)]
struct BatchReq {
    texts: Vec<String>,
}

#[derive(Serialize)]
struct ErrorResp {
    error: String,
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResp { error: msg })).into_response()
}

async fn analyze_batch(State(state): State<AppState>, Json(body): Json<BatchReq>) -> Response {
    if body.texts.len() > MAX_BATCH_TEXTS {
        return bad_request(format!(
            "batch of {} texts exceeds the limit of {MAX_BATCH_TEXTS}",
            body.texts.len()
        ));
    }
    let out: Vec<ArticleAnalysis> = state.engine.analyze_batch(&body.texts).await;
    Json(out).into_response()
}

#[derive(Deserialize)]
struct CompareReq {
    text: String,
    #[serde(default)]
    title: Option<String>,
}

async fn compare(State(state): State<AppState>, Json(body): Json<CompareReq>) -> Response {
    if body.text.trim().is_empty() {
        return bad_request("text must not be empty".to_string());
    }
    let report: ComparisonReport = state
        .manager
        .comprehensive(&body.text, body.title.as_deref())
        .await;
    Json(report).into_response()
}
