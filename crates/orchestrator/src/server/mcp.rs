use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{health, metrics, ApiError, ApiResult};
use crate::config::McpConfig;
use crate::registry::{AgentInfo, AgentRegistration, AgentRegistry, RegistrationResponse, StatusUpdate};
use crate::router::{AgentDispatch, MessageRouter};
use crate::sources::{map_gmao_to_incident_report, GmaoWebhookPayload, IncidentForwarder, GMAO_TOKEN_HEADER};

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: Value,
    pub target_capability: String,
    #[serde(default)]
    pub source_agent_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One agent's reply to a routed message.
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentResponseData {
    pub agent_id: String,
    pub status: String,
    pub status_code: Option<u16>,
    pub response_body: Option<Value>,
    pub error: Option<String>,
}

impl AgentResponseData {
    fn from_dispatch(agent_id: String, dispatch: AgentDispatch) -> Self {
        match dispatch {
            AgentDispatch::Success { status_code, data } => Self {
                agent_id,
                status: "success".to_string(),
                status_code: Some(status_code),
                response_body: Some(data),
                error: None,
            },
            AgentDispatch::Failure {
                error,
                details,
                status_code,
            } => Self {
                agent_id,
                status: "error".to_string(),
                status_code,
                response_body: Some(details),
                error: Some(error),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub status: String,
    pub responses: Vec<AgentResponseData>,
}

pub struct McpServer {
    router: MessageRouter,
    forwarder: IncidentForwarder,
    webhook_api_key: Option<String>,
}

impl McpServer {
    pub fn new(config: &McpConfig, registry: AgentRegistry) -> crate::Result<Self> {
        Ok(Self {
            router: MessageRouter::new(registry, config.agent_request_timeout())?,
            forwarder: IncidentForwarder::from_config(config)?,
            webhook_api_key: config.gmao_webhook_api_key.clone(),
        })
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/", get(root))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route("/api/agents/register", post(register_agent))
            .route("/api/agents", get(list_agents))
            .route("/api/agents/{id}", get(get_agent).delete(deregister_agent))
            .route("/api/agents/{id}/heartbeat", put(agent_heartbeat))
            .route("/api/agents/{id}/status", put(update_agent_status))
            .route("/api/message", post(process_message))
            .route("/api/v1/webhooks/gmao/incidents", post(gmao_webhook))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    fn registry(&self) -> &AgentRegistry {
        self.router.registry()
    }
}

type McpState = State<Arc<McpServer>>;

// Unknown or malformed ids are both "not registered"
fn parse_agent_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found(format!("Agent {} not registered", raw)))
}

async fn root(State(state): McpState) -> Json<Value> {
    Json(json!({
        "status": "MCP is running",
        "agents": state.registry().list().await.len(),
    }))
}

async fn register_agent(
    State(state): McpState,
    Json(request): Json<AgentRegistration>,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("Agent name must not be empty"));
    }
    match url::Url::parse(&request.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ApiError::bad_request(format!(
                "Invalid agent endpoint URL: {}",
                request.endpoint
            )))
        }
    }

    let agent_id = state.registry().register(request).await;
    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            agent_id,
            status: "registered".to_string(),
        }),
    ))
}

async fn list_agents(State(state): McpState) -> Json<Vec<AgentInfo>> {
    Json(state.registry().list().await)
}

async fn get_agent(State(state): McpState, Path(id): Path<String>) -> ApiResult<Json<AgentInfo>> {
    let agent_id = parse_agent_id(&id)?;
    state
        .registry()
        .get(&agent_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Agent {} not registered", id)))
}

async fn agent_heartbeat(State(state): McpState, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let agent_id = parse_agent_id(&id)?;
    match state.registry().heartbeat(&agent_id).await {
        Some(agent) => {
            debug!("Heartbeat from agent {} ({})", agent.name, agent.id);
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err(ApiError::not_found(format!("Agent {} not registered", id))),
    }
}

async fn update_agent_status(
    State(state): McpState,
    Path(id): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Value>> {
    let agent_id = parse_agent_id(&id)?;
    if state.registry().update_status(&agent_id, update.status).await {
        Ok(Json(json!({ "agent_id": agent_id, "status": update.status })))
    } else {
        Err(ApiError::not_found(format!("Agent {} not registered", id)))
    }
}

async fn deregister_agent(State(state): McpState, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let agent_id = parse_agent_id(&id)?;
    if state.registry().deregister(&agent_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Agent {} not registered", id)))
    }
}

async fn process_message(
    State(state): McpState,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if request.target_capability.trim().is_empty() {
        return Err(ApiError::bad_request("target_capability is required"));
    }

    let message_id = format!("msg_{}", Uuid::new_v4());
    info!(
        "Received message {} for capability: {}",
        message_id, request.target_capability
    );

    let payload = json!({
        "content": request.content,
        "metadata": request.metadata,
        "source_agent_id": request.source_agent_id,
    });
    let outcomes = state.router.route(&request.target_capability, &payload).await;

    let responses: Vec<AgentResponseData> = outcomes
        .into_iter()
        .map(|(agent_id, dispatch)| AgentResponseData::from_dispatch(agent_id, dispatch))
        .collect();
    info!("Processed message {}. Returning {} responses.", message_id, responses.len());

    Ok(Json(MessageResponse {
        message_id,
        status: "processed".to_string(),
        responses,
    }))
}

async fn gmao_webhook(
    State(state): McpState,
    headers: HeaderMap,
    payload: Result<Json<GmaoWebhookPayload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Some(expected) = state.webhook_api_key.as_deref() else {
        error!("GMAO webhook called but GMAO_WEBHOOK_API_KEY is not configured");
        return Err(ApiError::unavailable("Webhook authentication is not configured"));
    };

    // Compared as raw bytes: a non-UTF-8 token is wrong, not missing
    match headers.get(GMAO_TOKEN_HEADER) {
        None => {
            warn!("GMAO webhook request without {} header", GMAO_TOKEN_HEADER);
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Missing API Key"));
        }
        Some(token) if token.as_bytes() != expected.as_bytes() => {
            warn!("GMAO webhook request with invalid API key");
            return Err(ApiError::new(StatusCode::FORBIDDEN, "Invalid API Key"));
        }
        Some(_) => {}
    }

    let Json(payload) = payload.map_err(|rejection| {
        warn!("Invalid GMAO webhook payload: {}", rejection.body_text());
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text())
    })?;

    let report = map_gmao_to_incident_report(&payload)?;
    let tracking_id = Uuid::new_v4().to_string();
    info!(
        "Accepted GMAO incident {} (tracking id {}), forwarding to {}",
        report.incident_id,
        tracking_id,
        state.forwarder.url()
    );

    let forwarder = state.forwarder.clone();
    tokio::spawn(async move {
        forwarder.forward_incident_to_agent(&report).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "success",
            "message": "Incident received and queued for processing",
            "tracking_id": tracking_id,
        })),
    ))
}
