//! System API handlers: liveness and the change feed.
//!
//! # Key invariants and assumptions
//! - Health checks must be fast and side-effect free. They probe the store
//!   under the store timeout (503 on failure) and never touch the
//!   registries, the resolver or the bundle compiler.
//! - The change feed is a window over the bounded store log; callers that
//!   fall behind the window must reload full state.
use crate::api::error::ApiError;
use crate::api::types::{ChangesQuery, ChangesResponse, HealthStatus};
use crate::app::AppState;
use crate::error::PolicyError;
use crate::store::{PolicyStore, bounded};
use axum::Json;
use axum::extract::{Query, State};

#[utoipa::path(
    get,
    path = "/healthz",
    tag = "system",
    responses(
        (status = 200, description = "Policy service health", body = HealthStatus),
        (status = 503, description = "Store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
/// Return policy service health.
///
/// # Errors
/// - Returns 503 if the store probe fails or times out.
pub(crate) async fn healthz(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    bounded(state.timeout, "health_check", state.store.health_check())
        .await
        .map_err(PolicyError::from)?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        backend: state.store.backend_name().to_string(),
        durable: state.store.is_durable(),
    }))
}

#[utoipa::path(
    get,
    path = "/changes",
    tag = "system",
    params(ChangesQuery),
    responses(
        (status = 200, description = "Policy changes since a sequence", body = ChangesResponse)
    )
)]
pub(crate) async fn changes(
    State(state): State<AppState>,
    Query(query): Query<ChangesQuery>,
) -> Result<Json<ChangesResponse>, ApiError> {
    let since = query.since.unwrap_or(0);
    let change_set = bounded(state.timeout, "changes", state.store.changes(since))
        .await
        .map_err(PolicyError::from)?;
    Ok(Json(ChangesResponse {
        items: change_set.items,
        next_seq: change_set.next_seq,
    }))
}
