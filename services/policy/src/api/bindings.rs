//! Role binding API handlers.
//!
//! # Purpose
//! Namespaced bindings live under `/rolebindings?namespace=`, service-wide
//! bindings under `/system-rolebindings`. `/userbindings` lists the bindings
//! naming one principal.
//!
//! # Notes
//! PUT on a namespaced binding replaces an existing one; PUT on a system
//! binding also creates it.
use crate::api::error::{ApiError, api_validation_error};
use crate::api::types::{
    BindingListResponse, BindingRequest, BulkDeleteRequest, BulkDeleteResponse, NamespaceQuery,
    UserBindingsQuery, parse_groups,
};
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use warden_authz::{Binding, BindingKey, Principal};

fn required_namespace(query: &NamespaceQuery) -> Result<&str, ApiError> {
    query
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| api_validation_error("namespace is required for role bindings"))
}

fn binding_from_request(namespace: &str, name: String, request: BindingRequest) -> Binding {
    Binding::new(namespace, name, request.role, request.subjects)
}

fn path_name(path: String, request: &BindingRequest) -> Result<String, ApiError> {
    if !request.name.is_empty() && request.name != path {
        return Err(api_validation_error("binding name in body does not match path"));
    }
    Ok(path)
}

#[utoipa::path(
    post,
    path = "/rolebindings",
    tag = "bindings",
    params(NamespaceQuery),
    request_body = BindingRequest,
    responses(
        (status = 201, description = "Binding created", body = Binding),
        (status = 409, description = "Binding already exists", body = crate::api::types::ErrorResponse),
        (status = 422, description = "Role missing or not referenceable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_binding(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<BindingRequest>,
) -> Result<(StatusCode, Json<Binding>), ApiError> {
    let namespace = required_namespace(&query)?;
    let name = body.name.clone();
    let created = state
        .bindings
        .create(binding_from_request(namespace, name, body))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/rolebindings/bulk-delete",
    tag = "bindings",
    params(NamespaceQuery),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-name delete outcome", body = BulkDeleteResponse)
    )
)]
pub(crate) async fn bulk_delete_bindings(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let namespace = required_namespace(&query)?;
    let items = state.bindings.bulk_delete(namespace, &body.names).await;
    Ok(Json(BulkDeleteResponse { items }))
}

#[utoipa::path(
    put,
    path = "/rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name"), NamespaceQuery),
    request_body = BindingRequest,
    responses(
        (status = 200, description = "Binding replaced", body = Binding),
        (status = 404, description = "Binding not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn put_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
    Json(body): Json<BindingRequest>,
) -> Result<Json<Binding>, ApiError> {
    let namespace = required_namespace(&query)?;
    let name = path_name(name, &body)?;
    let binding = state
        .bindings
        .update(binding_from_request(namespace, name, body))
        .await?;
    Ok(Json(binding))
}

#[utoipa::path(
    get,
    path = "/rolebindings",
    tag = "bindings",
    params(NamespaceQuery),
    responses(
        (status = 200, description = "List bindings of a namespace", body = BindingListResponse)
    )
)]
pub(crate) async fn list_bindings(
    State(state): State<AppState>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<BindingListResponse>, ApiError> {
    let namespace = required_namespace(&query)?;
    let items = state.bindings.list(namespace).await?;
    Ok(Json(BindingListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name"), NamespaceQuery),
    responses(
        (status = 200, description = "Fetch binding", body = Binding),
        (status = 404, description = "Binding not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Binding>, ApiError> {
    let namespace = required_namespace(&query)?;
    let binding = state.bindings.get(&BindingKey::new(namespace, name)).await?;
    Ok(Json(binding))
}

#[utoipa::path(
    delete,
    path = "/rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name"), NamespaceQuery),
    responses(
        (status = 204, description = "Binding deleted"),
        (status = 404, description = "Binding not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<StatusCode, ApiError> {
    let namespace = required_namespace(&query)?;
    state
        .bindings
        .delete(&BindingKey::new(namespace, name))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/system-rolebindings",
    tag = "bindings",
    request_body = BindingRequest,
    responses(
        (status = 201, description = "System binding created", body = Binding),
        (status = 422, description = "Role missing or not referenceable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn create_system_binding(
    State(state): State<AppState>,
    Json(body): Json<BindingRequest>,
) -> Result<(StatusCode, Json<Binding>), ApiError> {
    let name = body.name.clone();
    let created = state
        .bindings
        .create(binding_from_request("", name, body))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    post,
    path = "/system-rolebindings/bulk-delete",
    tag = "bindings",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Per-name delete outcome", body = BulkDeleteResponse)
    )
)]
pub(crate) async fn bulk_delete_system_bindings(
    State(state): State<AppState>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    let items = state.bindings.bulk_delete("", &body.names).await;
    Ok(Json(BulkDeleteResponse { items }))
}

#[utoipa::path(
    put,
    path = "/system-rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name")),
    request_body = BindingRequest,
    responses(
        (status = 200, description = "System binding created or replaced", body = Binding)
    )
)]
pub(crate) async fn put_system_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<BindingRequest>,
) -> Result<Json<Binding>, ApiError> {
    let name = path_name(name, &body)?;
    let binding = state
        .bindings
        .create_or_update(binding_from_request("", name, body))
        .await?;
    Ok(Json(binding))
}

#[utoipa::path(
    get,
    path = "/system-rolebindings",
    tag = "bindings",
    responses(
        (status = 200, description = "List system bindings", body = BindingListResponse)
    )
)]
pub(crate) async fn list_system_bindings(
    State(state): State<AppState>,
) -> Result<Json<BindingListResponse>, ApiError> {
    let items = state.bindings.list("").await?;
    Ok(Json(BindingListResponse { items }))
}

#[utoipa::path(
    get,
    path = "/system-rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name")),
    responses(
        (status = 200, description = "Fetch system binding", body = Binding),
        (status = 404, description = "Binding not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_system_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Binding>, ApiError> {
    let binding = state.bindings.get(&BindingKey::system(name)).await?;
    Ok(Json(binding))
}

#[utoipa::path(
    delete,
    path = "/system-rolebindings/{name}",
    tag = "bindings",
    params(("name" = String, Path, description = "Binding name")),
    responses(
        (status = 204, description = "System binding deleted"),
        (status = 404, description = "Binding not found", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn delete_system_binding(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.bindings.delete(&BindingKey::system(name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/userbindings",
    tag = "bindings",
    params(UserBindingsQuery),
    responses(
        (status = 200, description = "Bindings naming the principal", body = BindingListResponse)
    )
)]
pub(crate) async fn list_user_bindings(
    State(state): State<AppState>,
    Query(query): Query<UserBindingsQuery>,
) -> Result<Json<BindingListResponse>, ApiError> {
    if query.uid.is_empty() {
        return Err(api_validation_error("uid is required"));
    }
    let principal = Principal::user(query.uid).with_groups(parse_groups(query.groups.as_deref()));
    let namespace = query.namespace.as_deref().filter(|ns| !ns.is_empty());
    let items = state
        .bindings
        .list_for_subject(&principal, namespace)
        .await?;
    Ok(Json(BindingListResponse { items }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_authz::{RoleKey, Subject};

    #[test]
    fn namespace_is_required() {
        let err = required_namespace(&NamespaceQuery { namespace: None }).expect_err("missing");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let query = NamespaceQuery {
            namespace: Some("proj1".to_string()),
        };
        assert_eq!(required_namespace(&query).expect("namespace"), "proj1");
    }

    #[test]
    fn path_name_must_match_body() {
        let request = BindingRequest {
            name: "b1".to_string(),
            role: RoleKey::global("reader"),
            subjects: vec![Subject::user("alice")],
        };
        assert_eq!(path_name("b1".to_string(), &request).expect("same"), "b1");
        assert!(path_name("b2".to_string(), &request).is_err());
    }
}
