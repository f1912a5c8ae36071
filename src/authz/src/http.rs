//! HTTP surface
//!
//! ## Endpoints
//!
//! - `POST /v1/authorize` - Authorization decision for the calling actor
//! - `GET /v1/session` - Role and enablement of the calling actor
//! - `GET /v1/rules` - The active rule table
//! - `GET /v1/profiles/:id` - Guarded profile read
//! - `PUT /v1/profiles/:id/role` - Change a profile's role
//! - `PUT /v1/profiles/:id/enabled` - Enable or disable a profile
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! The calling actor comes from the `x-authenticated-actor` header, which the
//! upstream identity layer sets after verifying the session token.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::directory::ProfileDirectory;
use crate::engine::{AuthzDecision, AuthzRequest, MetricsCollector, PolicyEvaluator};
use crate::error::{AuthzError, ResolveError};
use crate::policy::PolicyRule;
use crate::types::{ActorId, Operation, Profile, Role};

/// Header carrying the verified actor id
pub const ACTOR_HEADER: &str = "x-authenticated-actor";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub evaluator: PolicyEvaluator,
    pub directory: ProfileDirectory,
    pub metrics: Arc<MetricsCollector>,
    pub start_time: Instant,
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Unauthenticated,
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                format!("missing or empty {} header", ACTOR_HEADER),
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Forbidden(msg) => AppError::Forbidden(msg),
            AuthzError::ProfileNotFound(msg) => AppError::NotFound(msg),
            AuthzError::InvalidInput(msg) => AppError::BadRequest(msg),
            AuthzError::DatabaseError(msg) => AppError::Unavailable(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Actor id taken from the authentication header
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub ActorId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthenticated)?;

        ActorId::new(raw)
            .map(AuthenticatedActor)
            .map_err(|_| AppError::Unauthenticated)
    }
}

/// Authorization check request
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorizeBody {
    pub operation: Operation,
    pub table: String,
    #[serde(default)]
    pub resource_owner: Option<ActorId>,
    #[serde(default)]
    pub resource_state: Option<String>,
}

/// Resolved session for the calling actor
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub actor_id: ActorId,
    /// `ready` when a profile exists, `no_profile` otherwise
    pub status: String,
    pub role: Option<Role>,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnabledBody {
    pub enabled: bool,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// POST /v1/authorize
async fn authorize(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(body): Json<AuthorizeBody>,
) -> Json<AuthzDecision> {
    let request = AuthzRequest {
        actor,
        operation: body.operation,
        table: body.table,
        resource_owner: body.resource_owner,
        resource_state: body.resource_state,
    };

    Json(state.evaluator.authorize(&request).await)
}

/// GET /v1/session
async fn session(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<SessionResponse>, AppError> {
    match state.evaluator.resolver().resolve(&actor).await {
        Ok(grant) => Ok(Json(SessionResponse {
            actor_id: actor,
            status: "ready".to_string(),
            role: Some(grant.role),
            enabled: grant.enabled,
        })),
        Err(ResolveError::NotFound) => Ok(Json(SessionResponse {
            actor_id: actor,
            status: "no_profile".to_string(),
            role: None,
            enabled: false,
        })),
        Err(ResolveError::Unavailable(reason)) => {
            warn!("Session resolution unavailable: {}", reason);
            Err(AppError::Unavailable("profile store unavailable".to_string()))
        }
    }
}

/// GET /v1/rules
async fn list_rules(State(state): State<AppState>) -> Json<Vec<PolicyRule>> {
    Json(state.evaluator.rules().rules().to_vec())
}

fn target_id(raw: String) -> Result<ActorId, AppError> {
    ActorId::new(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

/// GET /v1/profiles/:id
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedActor(caller): AuthenticatedActor,
    Path(id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    let target = target_id(id)?;
    Ok(Json(state.directory.get(&caller, &target).await?))
}

/// PUT /v1/profiles/:id/role
async fn set_role(
    State(state): State<AppState>,
    AuthenticatedActor(caller): AuthenticatedActor,
    Path(id): Path<String>,
    Json(body): Json<RoleBody>,
) -> Result<Json<Profile>, AppError> {
    let target = target_id(id)?;
    Ok(Json(state.directory.set_role(&caller, &target, body.role).await?))
}

/// PUT /v1/profiles/:id/enabled
async fn set_enabled(
    State(state): State<AppState>,
    AuthenticatedActor(caller): AuthenticatedActor,
    Path(id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> Result<Json<Profile>, AppError> {
    let target = target_id(id)?;
    Ok(Json(state.directory.set_enabled(&caller, &target, body.enabled).await?))
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
        .into_response()
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/authorize", post(authorize))
        .route("/v1/session", get(session))
        .route("/v1/rules", get(list_rules))
        .route("/v1/profiles/:id", get(get_profile))
        .route("/v1/profiles/:id/role", put(set_role))
        .route("/v1/profiles/:id/enabled", put(set_enabled))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}
