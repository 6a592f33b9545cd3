//! HTTP API request/response types.
//!
//! # Purpose
//! Payload and query shapes of the policy REST API, shared with OpenAPI
//! schema generation. Model types from `warden-authz` are used directly
//! where the wire shape matches.
use crate::registry::BulkDeleteItem;
use crate::store::PolicyChange;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use warden_authz::{
    Binding, Permission, PolicyDefinition, Role, RoleKey, Rule, Subject, VerbDefinition,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub backend: String,
    pub durable: bool,
}

/// Body of role create and replace. On replace the name comes from the
/// path and may be omitted here.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct RoleRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleListResponse {
    pub items: Vec<Role>,
}

/// Body of binding create and replace.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct BindingRequest {
    #[serde(default)]
    pub name: String,
    /// A role with an empty namespace is a public or system role.
    pub role: RoleKey,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BindingListResponse {
    pub items: Vec<Binding>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct BulkDeleteRequest {
    pub names: Vec<String>,
    /// Remove bindings that still reference a deleted role.
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkDeleteResponse {
    pub items: Vec<BulkDeleteItem>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PolicyDefinitionRequest {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    pub verbs: Vec<VerbDefinition>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PolicyDefinitionListResponse {
    pub items: Vec<PolicyDefinition>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    pub uid: String,
    pub namespace: Option<String>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChangesResponse {
    pub items: Vec<PolicyChange>,
    pub next_seq: u64,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NamespaceQuery {
    /// Target namespace.
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteQuery {
    pub namespace: Option<String>,
    /// Remove referencing bindings together with the role.
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserBindingsQuery {
    pub uid: String,
    /// Comma-separated group ids.
    pub groups: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PermissionQuery {
    pub namespace: Option<String>,
    /// Comma-separated group ids.
    pub groups: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CheckQuery {
    pub namespace: Option<String>,
    pub groups: Option<String>,
    pub resource: String,
    /// Resource name; `*` when omitted.
    pub name: Option<String>,
    pub verb: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChangesQuery {
    /// First sequence to return.
    pub since: Option<u64>,
}

/// Split a comma-separated group list, ignoring blanks.
pub fn parse_groups(groups: Option<&str>) -> Vec<String> {
    groups
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_string)
        .collect()
}
