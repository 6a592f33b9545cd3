//! Permission resolution endpoints.
//!
//! # Purpose
//! Answer "what may this user do here" and "may this user do this" for
//! enforcement points that do not evaluate bundles locally.
//!
//! # Notes
//! Without `?namespace=` only system bindings are considered.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{
    CheckQuery, CheckResponse, PermissionQuery, PermissionResponse, parse_groups,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use warden_authz::{Principal, Scope, WILDCARD};

#[utoipa::path(
    get,
    path = "/permission/{uid}",
    tag = "permissions",
    params(("uid" = String, Path, description = "User id"), PermissionQuery),
    responses(
        (status = 200, description = "Effective permissions", body = PermissionResponse),
        (status = 503, description = "Store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_permissions(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<PermissionQuery>,
) -> Result<Json<PermissionResponse>, ApiError> {
    let principal = Principal::user(uid.clone()).with_groups(parse_groups(query.groups.as_deref()));
    let scope = Scope::from_optional(query.namespace.as_deref());
    let permissions = state.resolver.resolve(&principal, &scope).await?;
    Ok(Json(PermissionResponse {
        uid,
        namespace: scope.as_namespace().map(str::to_string),
        permissions: permissions.into_vec(),
    }))
}

#[utoipa::path(
    get,
    path = "/permission/{uid}/check",
    tag = "permissions",
    params(("uid" = String, Path, description = "User id"), CheckQuery),
    responses(
        (status = 200, description = "Whether the action is allowed", body = CheckResponse),
        (status = 400, description = "Missing resource or verb", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn check_permission(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    if query.resource.is_empty() || query.verb.is_empty() {
        return Err(api_validation_error("resource and verb are required"));
    }
    let principal = Principal::user(uid).with_groups(parse_groups(query.groups.as_deref()));
    let scope = Scope::from_optional(query.namespace.as_deref());
    let resource_name = query.name.as_deref().unwrap_or(WILDCARD);
    let allowed = state
        .resolver
        .check(&principal, &scope, &query.resource, resource_name, &query.verb)
        .await?;
    tracing::debug!(
        uid = %principal.uid,
        resource = %query.resource,
        verb = %query.verb,
        allowed,
        "permission check"
    );
    Ok(Json(CheckResponse { allowed }))
}
