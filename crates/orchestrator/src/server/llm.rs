use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use super::{health, metrics, ApiError, ApiResult};
use crate::llm::{GenerateError, GenerateRequest, GenerateResponse, LlmService, StatsResponse};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateQuery {
    #[serde(default)]
    pub force_refresh: bool,
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::ModelNotLoaded => ApiError::unavailable(err.to_string()),
            GenerateError::Generation(_) => {
                error!("{}", err);
                ApiError::internal(err.to_string())
            }
        }
    }
}

pub struct LlmServer {
    service: Arc<LlmService>,
}

impl LlmServer {
    pub fn new(service: Arc<LlmService>) -> Self {
        Self { service }
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/generate", post(generate))
            .route("/stats", get(stats))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

type LlmState = State<Arc<LlmServer>>;

async fn root(State(state): LlmState) -> Json<Value> {
    let redis_status = if !state.service.cache_enabled() {
        "disconnected"
    } else if state.service.cache_reachable().await {
        "connected"
    } else {
        "unreachable"
    };

    Json(json!({
        "status": "LLM Service is running",
        "model_loaded": state.service.model_name().is_some(),
        "model": state.service.model_name(),
        "redis_status": redis_status,
    }))
}

async fn generate(
    State(state): LlmState,
    Query(query): Query<GenerateQuery>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerateResponse>> {
    let response = state.service.generate(&request, query.force_refresh).await?;
    Ok(Json(response))
}

async fn stats(State(state): LlmState) -> Json<StatsResponse> {
    Json(state.service.stats())
}
