//! Policy bundles: versioned, content-addressed snapshots for offline use.
//!
//! # Purpose
//! Defines the artifact the policy service publishes and the evaluator remote
//! enforcement points use to answer checks without calling the service.
//!
//! # Key invariants
//! - `revision` is the lowercase hex SHA-256 of the canonical JSON encoding of
//!   [`BundleContent`]. Name, version and timestamp are not part of it.
//! - Content collections are kept in canonical order, so equal policy state
//!   always yields the same revision.
//! - A namespace-scoped bundle carries only system bindings plus the bindings
//!   of its namespace, and only the roles those bindings reference.
//!
//! # Examples
//! ```rust
//! use warden_authz::{
//!     Binding, Bundle, BundleContent, BundleEvaluator, PolicyDefinition, PolicySnapshot,
//!     Principal, Role, Rule, Scope, Subject,
//! };
//!
//! let viewer = Role::public("viewer", vec![Rule::new("build", ["read"])]);
//! let binding = Binding::new("proj1", "b1", viewer.key(), [Subject::user("alice")]);
//! let snapshot = PolicySnapshot::new(
//!     vec![viewer],
//!     vec![binding],
//!     vec![PolicyDefinition::new("build", ["read"])],
//! );
//! let content = BundleContent::from_snapshot(&snapshot, None);
//! let bundle = Bundle::new("authz", 1, content, 0).expect("bundle");
//!
//! let evaluator = BundleEvaluator::new(bundle).expect("verified");
//! let alice = Principal::user("alice");
//! assert!(evaluator.check(&alice, &Scope::namespace("proj1"), "build", "api", "read"));
//! ```
use crate::{
    AuthzError, AuthzResult, Binding, PermissionSet, PolicyDefinition, PolicySnapshot, Principal,
    Role, Scope,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Name of the global bundle every deployment publishes.
pub const DEFAULT_BUNDLE_NAME: &str = "authz";

/// The closure of policy state a bundle needs to resolve permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BundleContent {
    /// `None` for a global bundle.
    pub namespace: Option<String>,
    pub roles: Vec<Role>,
    pub bindings: Vec<Binding>,
    pub definitions: Vec<PolicyDefinition>,
}

impl BundleContent {
    /// Select the part of `snapshot` a bundle scoped to `namespace` needs.
    pub fn from_snapshot(snapshot: &PolicySnapshot, namespace: Option<&str>) -> Self {
        let bindings: Vec<Binding> = snapshot
            .bindings
            .iter()
            .filter(|binding| {
                binding.is_system() || namespace.is_none_or(|ns| binding.namespace == ns)
            })
            .cloned()
            .collect();
        let referenced: BTreeSet<(&str, &str)> = bindings
            .iter()
            .map(|binding| (binding.role.namespace.as_str(), binding.role.name.as_str()))
            .collect();
        let roles = snapshot
            .roles
            .iter()
            .filter(|role| referenced.contains(&(role.namespace.as_str(), role.name.as_str())))
            .cloned()
            .collect();

        let canonical = PolicySnapshot::new(roles, bindings, snapshot.definitions.clone());
        Self {
            namespace: namespace.map(str::to_string),
            roles: canonical.roles,
            bindings: canonical.bindings,
            definitions: canonical.definitions,
        }
    }

    /// Hex SHA-256 of the canonical JSON encoding.
    pub fn digest(&self) -> AuthzResult<String> {
        let encoded = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::new(
            self.roles.clone(),
            self.bindings.clone(),
            self.definitions.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Bundle {
    pub name: String,
    pub version: u64,
    pub revision: String,
    /// Unix epoch milliseconds.
    pub created_at_ms: u64,
    pub content: BundleContent,
}

impl Bundle {
    pub fn new(
        name: impl Into<String>,
        version: u64,
        content: BundleContent,
        created_at_ms: u64,
    ) -> AuthzResult<Self> {
        let revision = content.digest()?;
        Ok(Self {
            name: name.into(),
            version,
            revision,
            created_at_ms,
            content,
        })
    }

    /// Recompute the digest and compare it with `revision`.
    ///
    /// # Errors
    /// - [`AuthzError::DigestMismatch`] if the content was altered.
    pub fn verify(&self) -> AuthzResult<()> {
        let actual = self.content.digest()?;
        if actual != self.revision {
            return Err(AuthzError::DigestMismatch {
                expected: self.revision.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> AuthzResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> AuthzResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Offline evaluator over a verified bundle.
///
/// Resolving in a scope the bundle was not compiled for only sees the
/// bundle's system bindings.
#[derive(Debug, Clone)]
pub struct BundleEvaluator {
    name: String,
    version: u64,
    revision: String,
    snapshot: PolicySnapshot,
}

impl BundleEvaluator {
    /// # Errors
    /// - [`AuthzError::DigestMismatch`] if the bundle fails verification.
    pub fn new(bundle: Bundle) -> AuthzResult<Self> {
        bundle.verify()?;
        let snapshot = bundle.content.snapshot();
        Ok(Self {
            name: bundle.name,
            version: bundle.version,
            revision: bundle.revision,
            snapshot,
        })
    }

    pub fn from_json(bytes: &[u8]) -> AuthzResult<Self> {
        Self::new(Bundle::from_json(bytes)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Swap in `bundle` if it is newer than the loaded one.
    ///
    /// # Returns
    /// - `Ok(true)` when replaced, `Ok(false)` for an older or equal version.
    pub fn replace_if_newer(&mut self, bundle: Bundle) -> AuthzResult<bool> {
        if bundle.version <= self.version {
            return Ok(false);
        }
        *self = Self::new(bundle)?;
        Ok(true)
    }

    pub fn resolve(&self, principal: &Principal, scope: &Scope) -> PermissionSet {
        self.snapshot.resolve(principal, scope).permissions
    }

    pub fn check(
        &self,
        principal: &Principal,
        scope: &Scope,
        resource: &str,
        resource_name: &str,
        verb: &str,
    ) -> bool {
        self.resolve(principal, scope)
            .allows(resource, resource_name, verb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Rule, Subject};

    fn snapshot() -> PolicySnapshot {
        let admin = Role::system("admin", vec![Rule::new("*", ["*"])]);
        let viewer_a = Role::custom("a", "viewer", vec![Rule::new("build", ["read"])]);
        let viewer_b = Role::custom("b", "viewer", vec![Rule::new("build", ["read"])]);
        let unused = Role::public("unused", vec![Rule::new("build", ["run"])]);
        PolicySnapshot::new(
            vec![admin.clone(), viewer_a.clone(), viewer_b.clone(), unused],
            vec![
                Binding::system("admins", admin.key(), [Subject::user("root")]),
                Binding::new("a", "view", viewer_a.key(), [Subject::user("alice")]),
                Binding::new("b", "view", viewer_b.key(), [Subject::user("bob")]),
            ],
            vec![PolicyDefinition::new("build", ["read", "run"])],
        )
    }

    #[test]
    fn scoped_content_keeps_system_and_own_namespace() {
        let content = BundleContent::from_snapshot(&snapshot(), Some("a"));
        assert_eq!(content.namespace.as_deref(), Some("a"));
        let bindings: Vec<_> = content.bindings.iter().map(Binding::key).collect();
        assert_eq!(
            bindings,
            vec![
                crate::BindingKey::system("admins"),
                crate::BindingKey::new("a", "view"),
            ]
        );
        let roles: Vec<_> = content.roles.iter().map(Role::key).collect();
        assert_eq!(
            roles,
            vec![
                crate::RoleKey::global("admin"),
                crate::RoleKey::namespaced("a", "viewer"),
            ]
        );
        assert_eq!(content.definitions.len(), 1);
    }

    #[test]
    fn global_content_keeps_all_bindings_and_referenced_roles() {
        let content = BundleContent::from_snapshot(&snapshot(), None);
        assert_eq!(content.bindings.len(), 3);
        assert_eq!(content.roles.len(), 3);
        assert!(content.roles.iter().all(|role| role.name != "unused"));
    }

    #[test]
    fn digest_is_order_independent() {
        let mut shuffled = snapshot();
        shuffled.roles.reverse();
        shuffled.bindings.reverse();
        let a = BundleContent::from_snapshot(&snapshot(), None);
        let b = BundleContent::from_snapshot(&shuffled, None);
        assert_eq!(a.digest().expect("digest"), b.digest().expect("digest"));
        assert_eq!(a.digest().expect("digest").len(), 64);
    }

    #[test]
    fn digest_changes_with_content() {
        let a = BundleContent::from_snapshot(&snapshot(), None);
        let mut changed = snapshot();
        changed.definitions[0].verbs.pop();
        let b = BundleContent::from_snapshot(&changed, None);
        assert_ne!(a.digest().expect("digest"), b.digest().expect("digest"));
    }

    #[test]
    fn tampered_bundle_fails_verification() {
        let content = BundleContent::from_snapshot(&snapshot(), None);
        let mut bundle = Bundle::new(DEFAULT_BUNDLE_NAME, 1, content, 42).expect("bundle");
        bundle.verify().expect("untouched bundle verifies");
        bundle.content.bindings.pop();
        let err = BundleEvaluator::new(bundle).expect_err("tampered");
        assert!(matches!(err, AuthzError::DigestMismatch { .. }));
    }

    #[test]
    fn evaluator_matches_snapshot_resolution() {
        let source = snapshot();
        let bundle = Bundle::new(
            DEFAULT_BUNDLE_NAME,
            3,
            BundleContent::from_snapshot(&source, None),
            0,
        )
        .expect("bundle");
        let bytes = bundle.to_json().expect("encode");
        let evaluator = BundleEvaluator::from_json(&bytes).expect("decode");
        assert_eq!(evaluator.name(), DEFAULT_BUNDLE_NAME);
        assert_eq!(evaluator.version(), 3);
        assert_eq!(evaluator.revision(), bundle.revision);

        for (uid, scope) in [
            ("alice", Scope::namespace("a")),
            ("alice", Scope::namespace("b")),
            ("bob", Scope::namespace("b")),
            ("root", Scope::System),
        ] {
            let principal = Principal::user(uid);
            assert_eq!(
                evaluator.resolve(&principal, &scope),
                source.resolve(&principal, &scope).permissions,
                "{uid} in {scope}"
            );
        }
        assert!(evaluator.check(&Principal::user("root"), &Scope::System, "build", "x", "run"));
    }

    #[test]
    fn replace_if_newer_ignores_stale_versions() {
        let content = BundleContent::from_snapshot(&snapshot(), None);
        let v2 = Bundle::new(DEFAULT_BUNDLE_NAME, 2, content.clone(), 0).expect("bundle");
        let v1 = Bundle::new(DEFAULT_BUNDLE_NAME, 1, content.clone(), 0).expect("bundle");
        let v3 = Bundle::new(DEFAULT_BUNDLE_NAME, 3, content, 0).expect("bundle");

        let mut evaluator = BundleEvaluator::new(v2).expect("evaluator");
        assert!(!evaluator.replace_if_newer(v1).expect("stale"));
        assert_eq!(evaluator.version(), 2);
        assert!(evaluator.replace_if_newer(v3).expect("newer"));
        assert_eq!(evaluator.version(), 3);
    }
}
