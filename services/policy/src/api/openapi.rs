//! OpenAPI schema aggregation for the policy API.
//!
//! # Purpose
//! Collects all routes and schema types into the document served at
//! `/openapi.json`.
use crate::api::{
    bindings, bundles, permissions, policies, roles, system,
    types::{
        BindingListResponse, BindingRequest, BulkDeleteRequest, BulkDeleteResponse,
        ChangesResponse, CheckResponse, ErrorResponse, HealthStatus, PermissionResponse,
        PolicyDefinitionListResponse, PolicyDefinitionRequest, RoleListResponse, RoleRequest,
    },
};
use crate::registry::{BulkDeleteItem, BulkDeleteStatus, RolePatch};
use crate::store::{ChangeOp, ChangedEntity, PolicyChange};
use utoipa::OpenApi;
use warden_authz::{
    Binding, BindingKey, Bundle, BundleContent, Permission, PolicyDefinition, Role, RoleKey,
    RoleKind, Rule, Subject, SubjectKind, VerbDefinition,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "warden-policy",
        version = "v1",
        description = "Warden role-based authorization HTTP API"
    ),
    paths(
        system::healthz,
        system::changes,
        roles::create_role,
        roles::bulk_delete_roles,
        roles::patch_role,
        roles::put_role,
        roles::list_roles,
        roles::get_role,
        roles::delete_role,
        roles::create_public_role,
        roles::bulk_delete_public_roles,
        roles::patch_public_role,
        roles::put_public_role,
        roles::list_public_roles,
        roles::get_public_role,
        roles::delete_public_role,
        roles::create_system_role,
        roles::bulk_delete_system_roles,
        roles::put_system_role,
        roles::list_system_roles,
        roles::get_system_role,
        roles::delete_system_role,
        bindings::create_binding,
        bindings::bulk_delete_bindings,
        bindings::put_binding,
        bindings::list_bindings,
        bindings::get_binding,
        bindings::delete_binding,
        bindings::create_system_binding,
        bindings::bulk_delete_system_bindings,
        bindings::put_system_binding,
        bindings::list_system_bindings,
        bindings::get_system_binding,
        bindings::delete_system_binding,
        bindings::list_user_bindings,
        bundles::download_bundle,
        policies::put_policy_definition,
        policies::list_policy_definitions,
        policies::get_policy_definition,
        permissions::get_permissions,
        permissions::check_permission
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        Role,
        RoleKind,
        RoleKey,
        Rule,
        RoleRequest,
        RolePatch,
        RoleListResponse,
        Binding,
        BindingKey,
        Subject,
        SubjectKind,
        BindingRequest,
        BindingListResponse,
        BulkDeleteRequest,
        BulkDeleteResponse,
        BulkDeleteItem,
        BulkDeleteStatus,
        PolicyDefinition,
        VerbDefinition,
        PolicyDefinitionRequest,
        PolicyDefinitionListResponse,
        Permission,
        PermissionResponse,
        CheckResponse,
        Bundle,
        BundleContent,
        PolicyChange,
        ChangeOp,
        ChangedEntity,
        ChangesResponse
    )),
    tags(
        (name = "system", description = "Health and change feed"),
        (name = "roles", description = "Custom, public and system roles"),
        (name = "bindings", description = "Role bindings"),
        (name = "bundles", description = "Compiled policy bundles"),
        (name = "policies", description = "Resource type definitions"),
        (name = "permissions", description = "Permission resolution")
    )
)]
pub struct ApiDoc;
