use axum::{extract::State, http::StatusCode, Json};
use tracing::{info, warn};
use utoipa::OpenApi;

use super::{
    dto::{EventAcceptedDto, StatusDto, UnpairDto},
    errors::AppError,
    AppState,
};
use crate::{
    events::{EntityState, StateChangedEvent},
    sync::{Diagnostics, SyncSnapshot, SyncStatus},
};

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Latest synchronization snapshot, with savings in major currency units.
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Current sync snapshot", body = StatusDto),
    ),
    tag = "sync"
)]
pub async fn get_status(State(state): State<AppState>) -> Json<StatusDto> {
    Json(state.coordinator.snapshot().into())
}

/// Publish one state-change notification onto the local state bus.
#[utoipa::path(
    post,
    path = "/events/state_changed",
    request_body = StateChangedEvent,
    responses(
        (status = 202, description = "Notification published", body = EventAcceptedDto),
        (status = 422, description = "Malformed notification"),
    ),
    tag = "events"
)]
pub async fn post_state_changed(
    State(state): State<AppState>,
    Json(event): Json<StateChangedEvent>,
) -> (StatusCode, Json<EventAcceptedDto>) {
    let delivered = state.bus.publish(event);
    (StatusCode::ACCEPTED, Json(EventAcceptedDto { delivered }))
}

/// Ask for a refresh. Requests within the cooldown are merged.
#[utoipa::path(
    post,
    path = "/refresh",
    responses(
        (status = 202, description = "Refresh scheduled"),
    ),
    tag = "sync"
)]
pub async fn post_refresh(State(state): State<AppState>) -> StatusCode {
    state.coordinator.request_refresh().await;
    StatusCode::ACCEPTED
}

/// Coordinator internals. The API token is redacted.
#[utoipa::path(
    get,
    path = "/diagnostics",
    responses(
        (status = 200, description = "Coordinator diagnostics", body = Diagnostics),
    ),
    tag = "sync"
)]
pub async fn get_diagnostics(State(state): State<AppState>) -> Json<Diagnostics> {
    Json(state.coordinator.diagnostics().await)
}

/// Revoke this installation with the cloud. On success the stored
/// credentials are removed and synchronization stops.
#[utoipa::path(
    delete,
    path = "/pairing",
    responses(
        (status = 200, description = "Unpair outcome", body = UnpairDto),
        (status = 401, description = "Token already rejected by the cloud"),
        (status = 502, description = "Cloud unreachable or failed"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "pairing"
)]
pub async fn delete_pairing(State(state): State<AppState>) -> Result<Json<UnpairDto>, AppError> {
    let unpaired = state
        .coordinator
        .unpair()
        .await
        .map_err(AppError::upstream)?;

    if !unpaired {
        warn!("Cloud did not confirm unpair; keeping credentials");
        return Ok(Json(UnpairDto {
            unpaired,
            credentials_cleared: false,
        }));
    }

    state.coordinator.stop().await;
    state.store.clear().await?;
    info!(path = %state.store.path().display(), "Credentials removed after unpair");

    Ok(Json(UnpairDto {
        unpaired,
        credentials_cleared: true,
    }))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(get_status, post_state_changed, post_refresh, get_diagnostics, delete_pairing, health),
    components(schemas(
        StatusDto,
        EventAcceptedDto,
        UnpairDto,
        Diagnostics,
        SyncSnapshot,
        SyncStatus,
        StateChangedEvent,
        EntityState
    )),
    tags(
        (name = "sync",    description = "Cloud synchronization state"),
        (name = "events",  description = "Local state-change ingest"),
        (name = "pairing", description = "Installation pairing"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Green Energy Bridge API",
        version = "0.1.0",
        description = "Local bridge between home energy sensors and the Green Energy cloud"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
