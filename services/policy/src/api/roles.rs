//! Role API handlers.
//!
//! # Purpose
//! Exposes the role registry for the three role kinds under `/roles`
//! (custom, namespaced through `?namespace=`), `/public-roles` and
//! `/system-roles`. System roles are replace-only: there is no PATCH route.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{
    BulkDeleteRequest, BulkDeleteResponse, DeleteQuery, NamespaceQuery, RoleListResponse,
    RoleRequest,
};
use crate::app::AppState;
use crate::registry::RolePatch;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use warden_authz::{Role, RoleKey, RoleKind};

fn role_key(kind: RoleKind, namespace: Option<&str>, name: &str) -> Result<RoleKey, ApiError> {
    if !kind.is_namespaced() {
        return Ok(RoleKey::global(name));
    }
    match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => Ok(RoleKey::namespaced(ns, name)),
        None => Err(api_validation_error("namespace is required for custom roles")),
    }
}

fn role_from_request(kind: RoleKind, key: RoleKey, request: RoleRequest) -> Role {
    Role {
        namespace: key.namespace,
        name: key.name,
        kind,
        description: request.description,
        rules: request.rules,
        revision: 0,
    }
}

async fn create(
    state: &AppState,
    kind: RoleKind,
    namespace: Option<&str>,
    request: RoleRequest,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let key = role_key(kind, namespace, &request.name)?;
    let created = state
        .roles
        .create(role_from_request(kind, key, request))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn replace(
    state: &AppState,
    kind: RoleKind,
    name: String,
    namespace: Option<&str>,
    request: RoleRequest,
) -> Result<Json<Role>, ApiError> {
    if !request.name.is_empty() && request.name != name {
        return Err(api_validation_error("role name in body does not match path"));
    }
    let key = role_key(kind, namespace, &name)?;
    let role = state
        .roles
        .create_or_update(role_from_request(kind, key, request))
        .await?;
    Ok(Json(role))
}

async fn patch(
    state: &AppState,
    kind: RoleKind,
    name: &str,
    namespace: Option<&str>,
    patch: RolePatch,
) -> Result<Json<Role>, ApiError> {
    let key = role_key(kind, namespace, name)?;
    Ok(Json(state.roles.update(kind, &key, patch).await?))
}

async fn list(
    state: &AppState,
    kind: RoleKind,
    namespace: Option<&str>,
) -> Result<Json<RoleListResponse>, ApiError> {
    let namespace = namespace.filter(|ns| kind.is_namespaced() && !ns.is_empty());
    let items = state.roles.list(kind, namespace).await?;
    Ok(Json(RoleListResponse { items }))
}

async fn get(
    state: &AppState,
    kind: RoleKind,
    name: &str,
    namespace: Option<&str>,
) -> Result<Json<Role>, ApiError> {
    let key = role_key(kind, namespace, name)?;
    Ok(Json(state.roles.get(kind, &key).await?))
}

async fn delete(
    state: &AppState,
    kind: RoleKind,
    name: &str,
    query: DeleteQuery,
) -> Result<StatusCode, ApiError> {
    let key = role_key(kind, query.namespace.as_deref(), name)?;
    state.roles.delete(kind, &key, query.cascade).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_delete(
    state: &AppState,
    kind: RoleKind,
    namespace: Option<&str>,
    request: BulkDeleteRequest,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let namespace = if kind.is_namespaced() {
        role_key(kind, namespace, "")?.namespace
    } else {
        String::new()
    };
    let items = state
        .roles
        .bulk_delete(kind, &namespace, &request.names, request.cascade)
        .await;
    Ok(Json(BulkDeleteResponse { items }))
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "roles",
    params(NamespaceQuery),
    request_body = RoleRequest,
    responses(
        (status = 201, description = "Custom role created", body = Role),
        (status = 400, description = "Invalid role", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Role already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_role(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<RoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    create(&state, RoleKind::Custom, query.namespace.as_deref(), body).await
}

#[utoipa::path(
    post,
    path = "/roles/bulk-delete",
    tag = "roles",
    params(NamespaceQuery),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-name delete outcome", body = BulkDeleteResponse)
    )
)]
pub(crate) async fn bulk_delete_roles(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    bulk_delete(&state, RoleKind::Custom, query.namespace.as_deref(), body).await
}

#[utoipa::path(
    patch,
    path = "/roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), NamespaceQuery),
    request_body = RolePatch,
    responses(
        (status = 200, description = "Custom role updated", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Concurrent update", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<RolePatch>,
) -> Result<Json<Role>, ApiError> {
    patch(&state, RoleKind::Custom, &name, query.namespace.as_deref(), body).await
}

#[utoipa::path(
    put,
    path = "/roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), NamespaceQuery),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Custom role created or replaced", body = Role),
        (status = 400, description = "Invalid role", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn put_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<Role>, ApiError> {
    replace(&state, RoleKind::Custom, name, query.namespace.as_deref(), body).await
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "roles",
    params(NamespaceQuery),
    responses(
        (status = 200, description = "List custom roles", body = RoleListResponse)
    )
)]
pub(crate) async fn list_roles(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<RoleListResponse>, ApiError> {
    list(&state, RoleKind::Custom, query.namespace.as_deref()).await
}

#[utoipa::path(
    get,
    path = "/roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), NamespaceQuery),
    responses(
        (status = 200, description = "Fetch custom role", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Role>, ApiError> {
    get(&state, RoleKind::Custom, &name, query.namespace.as_deref()).await
}

#[utoipa::path(
    delete,
    path = "/roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), DeleteQuery),
    responses(
        (status = 204, description = "Custom role deleted"),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse),
        (status = 409, description = "Role still bound", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    delete(&state, RoleKind::Custom, &name, query).await
}

#[utoipa::path(
    post,
    path = "/public-roles",
    tag = "roles",
    request_body = RoleRequest,
    responses(
        (status = 201, description = "Public role created", body = Role),
        (status = 409, description = "Role already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_public_role(
    State(state): State<AppState>,
    Json(body): Json<RoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    create(&state, RoleKind::Public, None, body).await
}

#[utoipa::path(
    post,
    path = "/public-roles/bulk-delete",
    tag = "roles",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-name delete outcome", body = BulkDeleteResponse)
    )
)]
pub(crate) async fn bulk_delete_public_roles(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    bulk_delete(&state, RoleKind::Public, None, body).await
}

#[utoipa::path(
    patch,
    path = "/public-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name")),
    request_body = RolePatch,
    responses(
        (status = 200, description = "Public role updated", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn patch_public_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RolePatch>,
) -> Result<Json<Role>, ApiError> {
    patch(&state, RoleKind::Public, &name, None, body).await
}

#[utoipa::path(
    put,
    path = "/public-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Public role created or replaced", body = Role)
    )
)]
pub(crate) async fn put_public_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<Role>, ApiError> {
    replace(&state, RoleKind::Public, name, None, body).await
}

#[utoipa::path(
    get,
    path = "/public-roles",
    tag = "roles",
    responses(
        (status = 200, description = "List public roles", body = RoleListResponse)
    )
)]
pub(crate) async fn list_public_roles(
    State(state): State<AppState>,
) -> Result<Json<RoleListResponse>, ApiError> {
    list(&state, RoleKind::Public, None).await
}

#[utoipa::path(
    get,
    path = "/public-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Fetch public role", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_public_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Role>, ApiError> {
    get(&state, RoleKind::Public, &name, None).await
}

#[utoipa::path(
    delete,
    path = "/public-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), DeleteQuery),
    responses(
        (status = 204, description = "Public role deleted"),
        (status = 409, description = "Role still bound", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_public_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    delete(&state, RoleKind::Public, &name, query).await
}

#[utoipa::path(
    post,
    path = "/system-roles",
    tag = "roles",
    request_body = RoleRequest,
    responses(
        (status = 201, description = "System role created", body = Role),
        (status = 409, description = "Role already exists", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_system_role(
    State(state): State<AppState>,
    Json(body): Json<RoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    create(&state, RoleKind::System, None, body).await
}

#[utoipa::path(
    post,
    path = "/system-roles/bulk-delete",
    tag = "roles",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-name delete outcome", body = BulkDeleteResponse)
    )
)]
pub(crate) async fn bulk_delete_system_roles(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    bulk_delete(&state, RoleKind::System, None, body).await
}

#[utoipa::path(
    put,
    path = "/system-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "System role created or replaced", body = Role)
    )
)]
pub(crate) async fn put_system_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<RoleRequest>,
) -> Result<Json<Role>, ApiError> {
    replace(&state, RoleKind::System, name, None, body).await
}

#[utoipa::path(
    get,
    path = "/system-roles",
    tag = "roles",
    responses(
        (status = 200, description = "List system roles", body = RoleListResponse)
    )
)]
pub(crate) async fn list_system_roles(
    State(state): State<AppState>,
) -> Result<Json<RoleListResponse>, ApiError> {
    list(&state, RoleKind::System, None).await
}

#[utoipa::path(
    get,
    path = "/system-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name")),
    responses(
        (status = 200, description = "Fetch system role", body = Role),
        (status = 404, description = "Role not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_system_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Role>, ApiError> {
    get(&state, RoleKind::System, &name, None).await
}

#[utoipa::path(
    delete,
    path = "/system-roles/{name}",
    tag = "roles",
    params(("name" = String, Path, description = "Role name"), DeleteQuery),
    responses(
        (status = 204, description = "System role deleted"),
        (status = 409, description = "Role still bound", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_system_role(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    delete(&state, RoleKind::System, &name, query).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_role_keys_require_namespace() {
        let err = role_key(RoleKind::Custom, None, "viewer").expect_err("missing");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = role_key(RoleKind::Custom, Some(""), "viewer").expect_err("empty");
        assert_eq!(err.body.code, "validation_error");
        assert_eq!(
            role_key(RoleKind::Custom, Some("proj1"), "viewer").expect("key"),
            RoleKey::namespaced("proj1", "viewer")
        );
    }

    #[test]
    fn global_role_keys_ignore_namespace() {
        assert_eq!(
            role_key(RoleKind::Public, Some("proj1"), "reader").expect("key"),
            RoleKey::global("reader")
        );
        assert!(role_key(RoleKind::System, None, "admin").expect("key").is_global());
    }
}
