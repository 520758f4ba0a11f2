//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::deployment::DeploymentRequest;
use crate::server::auth::Caller;
use crate::server::error::ApiError;
use crate::server::state::ServerState;
use crate::services::deployment::DEFAULT_HISTORY_LIMIT;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub pipelines_in_flight: usize,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "blend-deploy".to_string(),
        version: version.version,
        pipelines_in_flight: state.service.tracker().in_flight(),
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ============================== DEPLOYMENTS ============================== //

pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Caller(identity): Caller,
    payload: Result<Json<DeploymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_deployer()?;
    let Json(request) = payload.map_err(|e| DeployError::ValidationError(e.body_text()))?;

    let deployment = state
        .service
        .deploy_to_hosting(request, &identity.user_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub target: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let deployments = state
        .service
        .get_deployment_history(
            query.target.as_deref(),
            query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        )
        .await?;
    Ok(Json(deployments))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_deployment(&id).await?))
}

/// Optional body of approve and reject calls
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub comments: Option<String>,
}

pub async fn approve_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_admin()?;
    let decision: DecisionRequest = optional_json(&body)?;

    let deployment = state
        .service
        .approve_deployment(&id, &identity.user_id, decision.comments)
        .await?;
    Ok(Json(deployment))
}

pub async fn reject_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_admin()?;
    let decision: DecisionRequest = optional_json(&body)?;

    let deployment = state
        .service
        .reject_deployment(&id, &identity.user_id, decision.comments)
        .await?;
    Ok(Json(deployment))
}

#[derive(Debug, Default, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn rollback_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Caller(identity): Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_deployer()?;
    let request: RollbackRequest = optional_json(&body)?;

    let deployment = state
        .service
        .rollback_deployment(&id, &identity.user_id, request.reason)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

// =============================== APPROVALS =============================== //

pub async fn pending_approvals_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.list_pending_approvals().await?))
}

// ============================= NOTIFICATIONS ============================= //

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn list_notifications_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
    Query(query): Query<NotificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.list_notifications(query.unread).await?))
}

pub async fn mark_notification_read_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.mark_notification_read(&id).await?))
}

// ============================== BUILD CACHE ============================== //

pub async fn get_cached_build_handler(
    State(state): State<Arc<ServerState>>,
    Caller(_): Caller,
    Path((commit_sha, target)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .service
        .get_cached_build(&commit_sha, &target)
        .await?
        .ok_or_else(|| {
            DeployError::NotFound(format!("No cached build of {} for {}", commit_sha, target))
        })?;
    Ok(Json(entry))
}

pub async fn invalidate_cached_build_handler(
    State(state): State<Arc<ServerState>>,
    Caller(identity): Caller,
    Path((commit_sha, target)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_deployer()?;
    state
        .service
        .invalidate_cached_build(&commit_sha, &target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Parse a JSON body that may be empty
fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, DeployError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| DeployError::ValidationError(format!("Invalid request body: {}", e)))
}
