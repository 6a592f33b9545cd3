//! In-memory implementation of the policy store.
//!
//! # Purpose
//! Implements [`PolicyStore`] with ordered maps guarded by
//! `tokio::sync::RwLock`. It backs local development, tests and deployments
//! that rebuild policy from an external source on start.
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - Locks are always taken in the order roles, bindings, definitions,
//!   change log. Writers hold every lock they touch until the change log
//!   entry is appended, so a snapshot never observes half of a cascade.
//! - Binding writes hold the roles read lock while checking the role
//!   reference; a concurrent role delete either sees the new binding (and
//!   conflicts or cascades) or runs first (and the binding is rejected).
//!
//! # Change log
//! One bounded log covers all entity types, so its `next_seq` is a single
//! write watermark. Consumers that fall behind the retention window must
//! re-bootstrap from [`PolicyStore::snapshot`].
//!
//! # Metrics
//! Entity gauges and a per-entity change counter mirror what a durable
//! backend would report.
use super::{
    ChangeOp, ChangeSet, ChangedEntity, PolicyChange, PolicyStore, Removed, RoleDeletion,
    RoleFilter, Snapshot, StoreConfig, StoreError, StoreResult, Written,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::RwLock;
use warden_authz::{
    Binding, BindingKey, PolicyDefinition, PolicySnapshot, Role, RoleKey, RoleKind,
};

/// Upper bound on change-log slots allocated up front; the log grows past it
/// on demand up to its capacity.
const PREALLOCATED_CHANGES: usize = 1024;

/// Bounded, append-only log of changes.
///
/// `record()` assigns the next sequence number and evicts the oldest entries
/// once `capacity` is exceeded.
#[derive(Debug)]
struct ChangeLog<T> {
    next_seq: u64,
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> ChangeLog<T> {
    fn new(capacity: usize) -> Self {
        Self {
            next_seq: 0,
            capacity,
            items: VecDeque::with_capacity(capacity.min(PREALLOCATED_CHANGES)),
        }
    }

    fn record(&mut self, item: impl FnOnce(u64) -> T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.push_back(item(seq));
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
        seq
    }
}

pub struct InMemoryStore {
    config: StoreConfig,
    roles: RwLock<BTreeMap<RoleKey, Role>>,
    bindings: RwLock<BTreeMap<BindingKey, Binding>>,
    definitions: RwLock<BTreeMap<String, PolicyDefinition>>,
    changes: RwLock<ChangeLog<PolicyChange>>,
}

impl InMemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        let capacity = config.change_window();
        Self {
            config,
            roles: RwLock::new(BTreeMap::new()),
            bindings: RwLock::new(BTreeMap::new()),
            definitions: RwLock::new(BTreeMap::new()),
            changes: RwLock::new(ChangeLog::new(capacity)),
        }
    }

    fn limit(&self) -> usize {
        usize::try_from(self.config.changes_limit).unwrap_or(usize::MAX)
    }

    /// Append changes and return the new watermark. Callers still hold the
    /// entity locks they mutated.
    async fn record(&self, entries: Vec<(ChangeOp, ChangedEntity)>) -> u64 {
        let mut log = self.changes.write().await;
        for (op, entity) in entries {
            metrics::counter!(
                "warden_policy_changes_total",
                "entity" => entity.label(),
                "op" => op.as_str()
            )
            .increment(1);
            log.record(|seq| PolicyChange { seq, op, entity });
        }
        log.next_seq
    }

    async fn watermark(&self) -> u64 {
        self.changes.read().await.next_seq
    }

    fn check_reference(
        roles: &BTreeMap<RoleKey, Role>,
        binding: &Binding,
    ) -> StoreResult<()> {
        let role = roles.get(&binding.role).ok_or_else(|| {
            StoreError::InvalidReference(format!(
                "binding {} references missing role {}",
                binding.key(),
                binding.role
            ))
        })?;
        binding
            .check_role(role)
            .map_err(|err| StoreError::InvalidReference(err.to_string()))
    }
}

#[async_trait]
impl PolicyStore for InMemoryStore {
    async fn get_role(&self, key: &RoleKey) -> StoreResult<Role> {
        self.roles
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("role {key}")))
    }

    async fn list_roles(&self, filter: &RoleFilter) -> StoreResult<Vec<Role>> {
        let items = self
            .roles
            .read()
            .await
            .values()
            .filter(|role| filter.matches(role))
            .cloned()
            .collect();
        Ok(items)
    }

    async fn create_role(&self, mut role: Role) -> StoreResult<Written<Role>> {
        let key = role.key();
        let mut roles = self.roles.write().await;
        if roles.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("role {key}")));
        }
        role.revision = 1;
        roles.insert(key.clone(), role.clone());
        let seq = self
            .record(vec![(ChangeOp::Created, ChangedEntity::Role { key })])
            .await;
        metrics::gauge!("warden_roles_total").set(roles.len() as f64);
        Ok(Written {
            value: role,
            previous: None,
            changed: true,
            seq,
        })
    }

    async fn put_role(
        &self,
        mut role: Role,
        expected_revision: Option<u64>,
    ) -> StoreResult<Written<Role>> {
        let key = role.key();
        let mut roles = self.roles.write().await;
        let previous = roles.get(&key).cloned();
        match (&previous, expected_revision) {
            (None, Some(_)) => return Err(StoreError::NotFound(format!("role {key}"))),
            (Some(existing), Some(revision)) if existing.revision != revision => {
                return Err(StoreError::Conflict(format!(
                    "role {key} changed concurrently (revision {} != {revision})",
                    existing.revision
                )));
            }
            (Some(existing), _) if existing.kind != role.kind => {
                return Err(StoreError::Conflict(format!(
                    "role {key} already exists as a {} role",
                    existing.kind
                )));
            }
            _ => {}
        }

        if let Some(existing) = previous.as_ref().filter(|existing| existing.same_content(&role)) {
            let value = existing.clone();
            drop(roles);
            return Ok(Written {
                value,
                previous,
                changed: false,
                seq: self.watermark().await,
            });
        }

        role.revision = previous.as_ref().map_or(1, |existing| existing.revision + 1);
        roles.insert(key.clone(), role.clone());
        let op = if previous.is_some() {
            ChangeOp::Updated
        } else {
            ChangeOp::Created
        };
        let seq = self.record(vec![(op, ChangedEntity::Role { key })]).await;
        metrics::gauge!("warden_roles_total").set(roles.len() as f64);
        Ok(Written {
            value: role,
            previous,
            changed: true,
            seq,
        })
    }

    async fn delete_role(
        &self,
        key: &RoleKey,
        kind: RoleKind,
        cascade: bool,
    ) -> StoreResult<RoleDeletion> {
        let mut roles = self.roles.write().await;
        if roles.get(key).is_none_or(|role| role.kind != kind) {
            return Err(StoreError::NotFound(format!("{kind} role {key}")));
        }
        let mut bindings = self.bindings.write().await;
        let dependents: Vec<BindingKey> = bindings
            .values()
            .filter(|binding| &binding.role == key)
            .map(Binding::key)
            .collect();
        if !dependents.is_empty() && !cascade {
            return Err(StoreError::Conflict(format!(
                "role {key} is referenced by {} binding(s)",
                dependents.len()
            )));
        }

        let role = roles
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(format!("role {key}")))?;
        let removed: Vec<Binding> = dependents
            .iter()
            .filter_map(|binding_key| bindings.remove(binding_key))
            .collect();

        // Dependent bindings first, so a change consumer never sees a binding
        // outlive its role.
        let mut entries: Vec<_> = dependents
            .into_iter()
            .map(|key| (ChangeOp::Deleted, ChangedEntity::Binding { key }))
            .collect();
        entries.push((ChangeOp::Deleted, ChangedEntity::Role { key: key.clone() }));
        let seq = self.record(entries).await;
        metrics::gauge!("warden_roles_total").set(roles.len() as f64);
        metrics::gauge!("warden_bindings_total").set(bindings.len() as f64);
        Ok(RoleDeletion {
            role,
            bindings: removed,
            seq,
        })
    }

    async fn get_binding(&self, key: &BindingKey) -> StoreResult<Binding> {
        self.bindings
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("binding {key}")))
    }

    async fn list_bindings(&self, namespace: Option<&str>) -> StoreResult<Vec<Binding>> {
        let items = self
            .bindings
            .read()
            .await
            .values()
            .filter(|binding| namespace.is_none_or(|ns| binding.namespace == ns))
            .cloned()
            .collect();
        Ok(items)
    }

    async fn create_binding(&self, binding: Binding) -> StoreResult<Written<Binding>> {
        let roles = self.roles.read().await;
        let key = binding.key();
        let mut bindings = self.bindings.write().await;
        if bindings.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("binding {key}")));
        }
        Self::check_reference(&roles, &binding)?;
        bindings.insert(key.clone(), binding.clone());
        let seq = self
            .record(vec![(ChangeOp::Created, ChangedEntity::Binding { key })])
            .await;
        metrics::gauge!("warden_bindings_total").set(bindings.len() as f64);
        Ok(Written {
            value: binding,
            previous: None,
            changed: true,
            seq,
        })
    }

    async fn put_binding(
        &self,
        binding: Binding,
        must_exist: bool,
    ) -> StoreResult<Written<Binding>> {
        let roles = self.roles.read().await;
        let key = binding.key();
        let mut bindings = self.bindings.write().await;
        let previous = bindings.get(&key).cloned();
        if must_exist && previous.is_none() {
            return Err(StoreError::NotFound(format!("binding {key}")));
        }
        Self::check_reference(&roles, &binding)?;
        if previous.as_ref() == Some(&binding) {
            drop(bindings);
            drop(roles);
            return Ok(Written {
                value: binding,
                previous,
                changed: false,
                seq: self.watermark().await,
            });
        }

        bindings.insert(key.clone(), binding.clone());
        let op = if previous.is_some() {
            ChangeOp::Updated
        } else {
            ChangeOp::Created
        };
        let seq = self.record(vec![(op, ChangedEntity::Binding { key })]).await;
        metrics::gauge!("warden_bindings_total").set(bindings.len() as f64);
        Ok(Written {
            value: binding,
            previous,
            changed: true,
            seq,
        })
    }

    async fn delete_binding(&self, key: &BindingKey) -> StoreResult<Removed<Binding>> {
        let mut bindings = self.bindings.write().await;
        let value = bindings
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(format!("binding {key}")))?;
        let seq = self
            .record(vec![(
                ChangeOp::Deleted,
                ChangedEntity::Binding { key: key.clone() },
            )])
            .await;
        metrics::gauge!("warden_bindings_total").set(bindings.len() as f64);
        Ok(Removed { value, seq })
    }

    async fn get_definition(&self, resource: &str) -> StoreResult<PolicyDefinition> {
        self.definitions
            .read()
            .await
            .get(resource)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("policy definition {resource}")))
    }

    async fn list_definitions(&self) -> StoreResult<Vec<PolicyDefinition>> {
        Ok(self.definitions.read().await.values().cloned().collect())
    }

    async fn put_definition(
        &self,
        definition: PolicyDefinition,
    ) -> StoreResult<Written<PolicyDefinition>> {
        let mut definitions = self.definitions.write().await;
        let previous = definitions.get(&definition.resource).cloned();
        if previous.as_ref() == Some(&definition) {
            drop(definitions);
            return Ok(Written {
                value: definition,
                previous,
                changed: false,
                seq: self.watermark().await,
            });
        }

        let resource = definition.resource.clone();
        definitions.insert(resource.clone(), definition.clone());
        let op = if previous.is_some() {
            ChangeOp::Updated
        } else {
            ChangeOp::Created
        };
        let seq = self
            .record(vec![(op, ChangedEntity::Definition { resource })])
            .await;
        metrics::gauge!("warden_policy_definitions_total").set(definitions.len() as f64);
        Ok(Written {
            value: definition,
            previous,
            changed: true,
            seq,
        })
    }

    async fn snapshot(&self) -> StoreResult<Snapshot> {
        let roles = self.roles.read().await;
        let bindings = self.bindings.read().await;
        let definitions = self.definitions.read().await;
        let next_seq = self.changes.read().await.next_seq;
        let policy = PolicySnapshot::new(
            roles.values().cloned().collect(),
            bindings.values().cloned().collect(),
            definitions.values().cloned().collect(),
        );
        Ok(Snapshot { policy, next_seq })
    }

    async fn changes(&self, since: u64) -> StoreResult<ChangeSet<PolicyChange>> {
        // Inclusive `since`; a caller older than the retained window gets a
        // partial history and should re-bootstrap from a snapshot.
        let guard = self.changes.read().await;
        let items = guard
            .items
            .iter()
            .filter(|item| item.seq >= since)
            .take(self.limit())
            .cloned()
            .collect();
        Ok(ChangeSet {
            items,
            next_seq: guard.next_seq,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
