//! Cached permission resolution.
//!
//! # Purpose
//! Answers "what may this principal do in this scope" from a consistent store
//! snapshot, caching results per `(uid, groups, scope)`.
//!
//! # Key invariants
//! - Registries invalidate affected entries after their store commit and
//!   before acknowledging the write, so a read issued after an acknowledged
//!   write never returns older state.
//! - Every invalidation bumps `epoch`. A resolution only populates the cache
//!   when the epoch it started under is still current, which keeps a result
//!   computed from a pre-write snapshot out of the cache.
//! - Dangling bindings and unregistered tuples never fail a request; they are
//!   logged and counted.
use crate::error::PolicyResult;
use crate::store::{PolicyStore, bounded};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use warden_authz::{PermissionSet, Principal, Resolution, Scope, Subject, SubjectKind, WILDCARD};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    uid: String,
    groups: BTreeSet<String>,
    scope: Scope,
}

impl CacheKey {
    fn new(principal: &Principal, scope: &Scope) -> Self {
        Self {
            uid: principal.uid.clone(),
            groups: principal.groups.clone(),
            scope: scope.clone(),
        }
    }

    fn affected_by(&self, subject: &Subject) -> bool {
        match subject.kind {
            SubjectKind::User => subject.id == WILDCARD || subject.id == self.uid,
            SubjectKind::Group => self.groups.contains(&subject.id),
        }
    }
}

pub struct PermissionResolver {
    store: Arc<dyn PolicyStore>,
    timeout: Duration,
    /// Zero disables caching.
    capacity: usize,
    epoch: AtomicU64,
    cache: RwLock<HashMap<CacheKey, PermissionSet>>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn PolicyStore>, timeout: Duration, capacity: usize) -> Self {
        Self {
            store,
            timeout,
            capacity,
            epoch: AtomicU64::new(0),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Effective permissions of `principal` in `scope`.
    ///
    /// # Errors
    /// - `Unavailable` when the snapshot read exceeds the store timeout.
    pub async fn resolve(&self, principal: &Principal, scope: &Scope) -> PolicyResult<PermissionSet> {
        let key = CacheKey::new(principal, scope);
        if let Some(cached) = self.cache.read().await.get(&key) {
            metrics::counter!("warden_resolver_cache_hits_total").increment(1);
            return Ok(cached.clone());
        }
        metrics::counter!("warden_resolver_cache_misses_total").increment(1);

        let epoch = self.epoch.load(Ordering::Acquire);
        let snapshot = bounded(self.timeout, "snapshot", self.store.snapshot()).await?;
        let resolution = snapshot.policy.resolve(principal, scope);
        report_anomalies(principal, scope, &resolution);
        let permissions = resolution.permissions;
        self.insert_if_current(key, permissions.clone(), epoch).await;
        Ok(permissions)
    }

    pub async fn check(
        &self,
        principal: &Principal,
        scope: &Scope,
        resource: &str,
        resource_name: &str,
        verb: &str,
    ) -> PolicyResult<bool> {
        Ok(self
            .resolve(principal, scope)
            .await?
            .allows(resource, resource_name, verb))
    }

    /// Drop cached results of every principal any of `subjects` matches.
    pub async fn invalidate_subjects<'a, I>(&self, subjects: I)
    where
        I: IntoIterator<Item = &'a Subject>,
    {
        let subjects: Vec<&Subject> = subjects.into_iter().collect();
        if subjects.iter().any(|subject| subject.is_all_users()) {
            self.invalidate_all().await;
            return;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let mut cache = self.cache.write().await;
        cache.retain(|key, _| !subjects.iter().any(|subject| key.affected_by(subject)));
    }

    /// Drop every cached result, e.g. after a role or definition change.
    pub async fn invalidate_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.cache.write().await.clear();
    }

    async fn insert_if_current(&self, key: CacheKey, permissions: PermissionSet, epoch: u64) {
        if self.capacity == 0 {
            return;
        }
        let mut cache = self.cache.write().await;
        // Checked under the write lock: an invalidation either bumped the
        // epoch already, or will take this lock after us and evict the entry.
        if self.epoch.load(Ordering::Acquire) != epoch {
            return;
        }
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            cache.clear();
        }
        cache.insert(key, permissions);
    }

    #[cfg(test)]
    async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

fn report_anomalies(principal: &Principal, scope: &Scope, resolution: &Resolution) {
    if !resolution.dangling.is_empty() {
        metrics::counter!("warden_resolver_dangling_bindings_total")
            .increment(resolution.dangling.len() as u64);
        for binding in &resolution.dangling {
            tracing::warn!(
                uid = %principal.uid,
                %scope,
                %binding,
                "binding references a missing or unusable role"
            );
        }
    }
    if !resolution.dropped.is_empty() {
        metrics::counter!("warden_resolver_dropped_permissions_total")
            .increment(resolution.dropped.len() as u64);
        tracing::warn!(
            uid = %principal.uid,
            %scope,
            dropped = resolution.dropped.len(),
            first = %resolution.dropped[0],
            "dropped permissions for unregistered resource verbs"
        );
    }
}
