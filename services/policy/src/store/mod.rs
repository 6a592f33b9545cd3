//! Policy storage abstraction.
//!
//! # Purpose
//! Defines the [`PolicyStore`] trait the registries and resolver run against,
//! plus the value types it returns.
//!
//! # Key invariants
//! - Referential checks (a binding's role exists and may be referenced) are
//!   enforced by the store under its own locks, so they cannot race a delete.
//! - Every committed mutation appends one [`PolicyChange`] per touched entity;
//!   the change log's `next_seq` is the write watermark.
//! - No-op writes (identical content) record nothing and return
//!   `changed == false`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;
use warden_authz::{Binding, BindingKey, PolicyDefinition, PolicySnapshot, Role, RoleKey, RoleKind};

pub mod memory;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub changes_limit: u64,
    pub change_retention_max_rows: Option<i64>,
}

impl StoreConfig {
    /// Entries the change log retains: the larger of the page limit and the
    /// retention bound. Negative retention counts as zero; values beyond
    /// `usize` saturate.
    pub fn change_window(&self) -> usize {
        let limit = usize::try_from(self.changes_limit).unwrap_or(usize::MAX);
        let retention = self
            .change_retention_max_rows
            .and_then(|rows| usize::try_from(rows).ok())
            .unwrap_or(0);
        limit.max(retention)
    }
}

/// Consistent copy of all policy state plus the watermark it reflects.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub policy: PolicySnapshot,
    pub next_seq: u64,
}

#[derive(Debug, Clone)]
pub struct ChangeSet<T> {
    pub items: Vec<T>,
    pub next_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOp {
    Created,
    Updated,
    Deleted,
}

impl ChangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangedEntity {
    Role { key: RoleKey },
    Binding { key: BindingKey },
    Definition { resource: String },
}

impl ChangedEntity {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::Binding { .. } => "binding",
            Self::Definition { .. } => "definition",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PolicyChange {
    pub seq: u64,
    pub op: ChangeOp,
    pub entity: ChangedEntity,
}

/// Result of a create or replace.
#[derive(Debug, Clone)]
pub struct Written<T> {
    /// State after the write.
    pub value: T,
    pub previous: Option<T>,
    /// `false` when the write was a no-op.
    pub changed: bool,
    /// Watermark after the write.
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct Removed<T> {
    pub value: T,
    pub seq: u64,
}

/// A deleted role together with the bindings removed by a cascade.
#[derive(Debug, Clone)]
pub struct RoleDeletion {
    pub role: Role,
    pub bindings: Vec<Binding>,
    pub seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub namespace: Option<String>,
    pub kind: Option<RoleKind>,
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        self.kind.is_none_or(|kind| role.kind == kind)
            && self
                .namespace
                .as_deref()
                .is_none_or(|namespace| role.namespace == namespace)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Run a store call with a deadline; expiry maps to [`StoreError::Unavailable`].
pub async fn bounded<T, F>(timeout: Duration, operation: &'static str, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "store call timed out");
            metrics::counter!("warden_store_timeouts_total", "operation" => operation).increment(1);
            Err(StoreError::Unavailable(format!("{operation} timed out")))
        }
    }
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_role(&self, key: &RoleKey) -> StoreResult<Role>;
    /// Roles matching `filter`, ordered by `(namespace, name)`.
    async fn list_roles(&self, filter: &RoleFilter) -> StoreResult<Vec<Role>>;
    /// Insert a new role at revision 1; `AlreadyExists` if the key is taken.
    async fn create_role(&self, role: Role) -> StoreResult<Written<Role>>;
    /// Insert or replace a role. With `expected_revision`, the role must exist
    /// at exactly that revision (`NotFound` / `Conflict` otherwise). Replacing
    /// a role of a different kind is a `Conflict`.
    async fn put_role(&self, role: Role, expected_revision: Option<u64>)
    -> StoreResult<Written<Role>>;
    /// Delete a role of `kind`. Referencing bindings make this a `Conflict`
    /// unless `cascade` is set, in which case they are removed atomically.
    async fn delete_role(
        &self,
        key: &RoleKey,
        kind: RoleKind,
        cascade: bool,
    ) -> StoreResult<RoleDeletion>;

    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Binding>;
    /// Bindings of one namespace (`Some("")` for system bindings) or of all,
    /// ordered by `(namespace, name)`.
    async fn list_bindings(&self, namespace: Option<&str>) -> StoreResult<Vec<Binding>>;
    async fn create_binding(&self, binding: Binding) -> StoreResult<Written<Binding>>;
    /// Insert or replace; with `must_exist` a missing binding is `NotFound`.
    async fn put_binding(&self, binding: Binding, must_exist: bool)
    -> StoreResult<Written<Binding>>;
    async fn delete_binding(&self, key: &BindingKey) -> StoreResult<Removed<Binding>>;

    async fn get_definition(&self, resource: &str) -> StoreResult<PolicyDefinition>;
    async fn list_definitions(&self) -> StoreResult<Vec<PolicyDefinition>>;
    async fn put_definition(
        &self,
        definition: PolicyDefinition,
    ) -> StoreResult<Written<PolicyDefinition>>;

    async fn snapshot(&self) -> StoreResult<Snapshot>;
    async fn changes(&self, since: u64) -> StoreResult<ChangeSet<PolicyChange>>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
