//! Policy definition API handlers.
//!
//! External services register their resource types here. `PUT
//! /policies/{resourceName}` is last-writer-wins.
use crate::api::error::ApiError;
use crate::api::types::{PolicyDefinitionListResponse, PolicyDefinitionRequest};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, State};
use warden_authz::PolicyDefinition;

#[utoipa::path(
    put,
    path = "/policies/{resource_name}",
    tag = "policies",
    params(("resource_name" = String, Path, description = "Resource type")),
    request_body = PolicyDefinitionRequest,
    responses(
        (status = 200, description = "Definition stored", body = PolicyDefinition),
        (status = 400, description = "Invalid definition", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn put_policy_definition(
    State(state): State<AppState>,
    Path(resource_name): Path<String>,
    Json(body): Json<PolicyDefinitionRequest>,
) -> Result<Json<PolicyDefinition>, ApiError> {
    let definition = PolicyDefinition {
        resource: resource_name.clone(),
        alias: body.alias,
        description: body.description,
        verbs: body.verbs,
    };
    let stored = state
        .definitions
        .create_or_update(&resource_name, definition)
        .await?;
    Ok(Json(stored))
}

#[utoipa::path(
    get,
    path = "/policy-definitions",
    tag = "policies",
    responses(
        (status = 200, description = "All definitions by resource", body = PolicyDefinitionListResponse)
    )
)]
pub(crate) async fn list_policy_definitions(
    State(state): State<AppState>,
) -> Result<Json<PolicyDefinitionListResponse>, ApiError> {
    let items = state.definitions.list().await?;
    Ok(Json(PolicyDefinitionListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/policy-definitions/{resource_name}",
    tag = "policies",
    params(("resource_name" = String, Path, description = "Resource type")),
    responses(
        (status = 200, description = "Definition of one resource", body = PolicyDefinition),
        (status = 404, description = "Resource not registered", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_policy_definition(
    State(state): State<AppState>,
    Path(resource_name): Path<String>,
) -> Result<Json<PolicyDefinition>, ApiError> {
    let definition = state.definitions.get(&resource_name).await?;
    Ok(Json(definition))
}
