pub mod dto;
pub mod errors;
pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use handlers::ApiDoc;

use crate::{credentials::CredentialStore, events::StateBus, sync::SyncCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: SyncCoordinator,
    pub bus: StateBus,
    pub store: CredentialStore,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/status", get(handlers::get_status))
        .route("/events/state_changed", post(handlers::post_state_changed))
        .route("/refresh", post(handlers::post_refresh))
        .route("/diagnostics", get(handlers::get_diagnostics))
        .route("/pairing", delete(handlers::delete_pairing))
        .with_state(state)
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
