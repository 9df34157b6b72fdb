// Copyright (c) 2026 Guildhost
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API for the lifecycle services.
//!
//! Thin layer: extract the caller from `x-user-id`, dispatch to the
//! application service, map the error taxonomy onto HTTP statuses.
//! Authentication happens upstream (gateway); this layer trusts the
//! forwarded identity header.

use crate::application::deprovisioning::DeprovisioningService;
use crate::application::operations::OperationsService;
use crate::application::provisioning::ProvisioningService;
use crate::domain::error::OrchestratorError;
use crate::domain::guild::{GuildId, UserId};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub provisioning: Arc<dyn ProvisioningService>,
    pub operations: Arc<dyn OperationsService>,
    pub deprovisioning: Arc<dyn DeprovisioningService>,
}

pub fn app(
    provisioning: Arc<dyn ProvisioningService>,
    operations: Arc<dyn OperationsService>,
    deprovisioning: Arc<dyn DeprovisioningService>,
) -> Router {
    let state = Arc::new(AppState {
        provisioning,
        operations,
        deprovisioning,
    });

    Router::new()
        .route("/guilds/{id}/provision", post(provision))
        .route("/guilds/{id}/provision-free", post(provision_free))
        .route("/guilds/{id}/restart", post(restart))
        .route("/guilds/{id}/repair", post(repair))
        .route("/guilds/{id}/deploy", post(deploy))
        .route("/guilds/{id}/status", get(status))
        .route("/guilds/{id}/logs", get(logs))
        .route("/guilds/{id}", delete(deprovision))
        .route("/admin/guilds/{id}/deploy", post(admin_deploy))
        .route("/account", delete(delete_account))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// API-facing error: the taxonomy mapped onto HTTP statuses.
struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
            OrchestratorError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            OrchestratorError::FailedPrecondition(_) => StatusCode::PRECONDITION_FAILED,
            OrchestratorError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            OrchestratorError::AlreadyExists(_) => StatusCode::CONFLICT,
            OrchestratorError::RemoteApi { .. } => StatusCode::BAD_GATEWAY,
            OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(UserId::new)
        .ok_or_else(|| {
            ApiError(OrchestratorError::PermissionDenied(
                "missing x-user-id header".to_string(),
            ))
        })
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn provision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provisioned = state.provisioning.provision(&GuildId::new(id)).await?;
    Ok(Json(json!({
        "app_name": provisioned.app_name,
        "machine_id": provisioned.machine_id,
        "volume_id": provisioned.volume_id,
        "region": provisioned.region,
    })))
}

async fn provision_free(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provisioned = state
        .provisioning
        .provision_free_tier(&GuildId::new(id))
        .await?;
    Ok(Json(json!({
        "app_name": provisioned.app_name,
        "machine_id": provisioned.machine_id,
        "volume_id": provisioned.volume_id,
        "region": provisioned.region,
    })))
}

async fn restart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    state.operations.restart(&user, &GuildId::new(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn repair(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    state.operations.repair(&user, &GuildId::new(id)).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct DeployRequest {
    version: String,
}

async fn deploy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    state
        .operations
        .deploy_update(&user, &GuildId::new(id), &payload.version)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn admin_deploy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .operations
        .admin_deploy(&GuildId::new(id), &payload.version)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    let report = state.operations.status(&user, &GuildId::new(id)).await?;
    Ok(Json(report))
}

async fn logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    let entries = state.operations.logs(&user, &GuildId::new(id)).await?;
    Ok(Json(entries))
}

async fn deprovision(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    state
        .deprovisioning
        .deprovision(&user, &GuildId::new(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = caller(&headers)?;
    let report = state.deprovisioning.delete_account(&user).await?;
    Ok(Json(report))
}
