//! Role, binding and policy-definition registries.
//!
//! # Purpose
//! Validate input, run store calls under the configured timeout, and keep
//! derived state in step with every committed write.
//!
//! # Write path
//! 1. Validate (`ValidationFailed` before touching the store).
//! 2. Commit through the store, which enforces references and optimistic
//!    concurrency.
//! 3. If the write changed anything: invalidate affected resolver cache
//!    entries, then publish the new watermark to the bundle compiler.
//! 4. Acknowledge.
use crate::bundle::BundleTrigger;
use crate::error::{PolicyError, PolicyResult};
use crate::resolver::PermissionResolver;
use crate::store::{PolicyStore, StoreResult, bounded};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

pub mod bindings;
pub mod definitions;
pub mod roles;

pub use bindings::BindingRegistry;
pub use definitions::DefinitionRegistry;
pub use roles::{RolePatch, RoleRegistry};

/// Dependencies shared by all registries.
#[derive(Clone)]
pub struct RegistryContext {
    pub store: Arc<dyn PolicyStore>,
    pub resolver: Arc<PermissionResolver>,
    pub trigger: BundleTrigger,
    pub timeout: Duration,
}

impl RegistryContext {
    async fn call<T, F>(&self, operation: &'static str, call: F) -> PolicyResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        Ok(bounded(self.timeout, operation, call).await?)
    }

    fn committed(&self, seq: u64) {
        self.trigger.notify(seq);
    }
}

/// Per-name outcome of a bulk delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkDeleteStatus {
    Deleted,
    NotFound,
    Conflict,
    Invalid,
    Unavailable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkDeleteItem {
    pub name: String,
    pub status: BulkDeleteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BulkDeleteItem {
    fn from_result<T>(name: &str, result: PolicyResult<T>) -> Self {
        let (status, message) = match result {
            Ok(_) => (BulkDeleteStatus::Deleted, None),
            Err(err) => {
                let status = match &err {
                    PolicyError::NotFound(_) => BulkDeleteStatus::NotFound,
                    PolicyError::Conflict(_) | PolicyError::AlreadyExists(_) => {
                        BulkDeleteStatus::Conflict
                    }
                    PolicyError::ValidationFailed(_) | PolicyError::InvalidReference(_) => {
                        BulkDeleteStatus::Invalid
                    }
                    PolicyError::Unavailable(_) => BulkDeleteStatus::Unavailable,
                    PolicyError::Unexpected(_) => BulkDeleteStatus::Failed,
                };
                (status, Some(err.to_string()))
            }
        };
        Self {
            name: name.to_string(),
            status,
            message,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::store::StoreConfig;
    use crate::store::memory::InMemoryStore;
    use tokio::sync::watch;

    pub(crate) fn context() -> (RegistryContext, watch::Receiver<u64>) {
        let store: Arc<dyn PolicyStore> = Arc::new(InMemoryStore::new(StoreConfig {
            changes_limit: 100,
            change_retention_max_rows: None,
        }));
        let timeout = Duration::from_secs(1);
        let resolver = Arc::new(PermissionResolver::new(store.clone(), timeout, 64));
        let (trigger, rx) = BundleTrigger::new();
        (
            RegistryContext {
                store,
                resolver,
                trigger,
                timeout,
            },
            rx,
        )
    }
}
