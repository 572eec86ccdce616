use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{health, metrics, ApiError, ApiResult};
use crate::incident::{AgentIdSlot, AnalysisResult, IncidentAnalyzer, IncidentReport};
use crate::store::CacheEntry;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Message envelope the MCP router delivers to `/process`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub content: IncidentReport,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub source_agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheListing {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<CacheEntry>,
}

pub struct IncidentAgentServer {
    analyzer: Arc<IncidentAnalyzer>,
    agent_id: AgentIdSlot,
}

impl IncidentAgentServer {
    pub fn new(analyzer: Arc<IncidentAnalyzer>, agent_id: AgentIdSlot) -> Self {
        Self { analyzer, agent_id }
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/status", get(status))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/api/", get(status))
            .route("/api/analyze", post(analyze))
            .route("/api/process", post(process))
            .route("/api/cache", get(list_cache))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

type AgentState = State<Arc<IncidentAgentServer>>;

async fn status(State(state): AgentState) -> Json<Value> {
    let agent_id = *state.agent_id.read().await;
    Json(json!({
        "status": "Incident Analysis Agent is running",
        "registered": agent_id.is_some(),
        "agent_id": agent_id,
        "cache_enabled": state.analyzer.store().is_some(),
    }))
}

async fn analyze(State(state): AgentState, Json(report): Json<IncidentReport>) -> Json<AnalysisResult> {
    info!("Received analysis request for incident ID: {}", report.incident_id);
    let result = state.analyzer.analyze(&report).await;
    info!(
        "Analysis complete for {}. Source: {}",
        report.incident_id, result.analysis_source
    );
    Json(result)
}

async fn process(State(state): AgentState, Json(request): Json<ProcessRequest>) -> Json<AnalysisResult> {
    info!(
        "Received routed message for incident {} from {}",
        request.content.incident_id,
        request.source_agent_id.as_deref().unwrap_or("unknown source")
    );
    Json(state.analyzer.analyze(&request.content).await)
}

async fn list_cache(State(state): AgentState, Query(query): Query<CacheQuery>) -> ApiResult<Json<CacheListing>> {
    let store = state
        .analyzer
        .store()
        .ok_or_else(|| ApiError::unavailable("Incident cache is not available"))?;

    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let items = store.list_analyses(limit, offset).await?;
    let total = store.count_analyses().await?;

    Ok(Json(CacheListing {
        total,
        limit,
        offset,
        items,
    }))
}
