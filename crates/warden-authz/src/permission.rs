//! Permission tuples and deduplicated permission sets.
//!
//! # Purpose
//! Defines the unit a resolution produces, `(resource, resource_name, verb)`,
//! and the ordered set used to answer checks.
//!
//! # Key invariants
//! - `resource` and `verb` are concrete (never `*`) once resolved.
//! - `resource_name` keeps its glob form (`*`, `proj-*`); matching happens in
//!   [`PermissionSet::allows`].
//! - Sets are ordered, so serialized output is deterministic.
//!
//! # Examples
//! ```rust
//! use warden_authz::Permission;
//!
//! let permission = Permission::new("build", "*", "read");
//! assert_eq!(permission.as_string(), "read:build/*");
//! ```
use crate::wildcard_match;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allow-permission for one verb on a resource type and name pattern.
///
/// # Example
/// ```rust
/// use warden_authz::Permission;
///
/// let permission = Permission::new("workflow", "deploy-*", "run");
/// assert_eq!(permission.verb, "run");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Permission {
    pub resource: String,
    pub resource_name: String,
    pub verb: String,
}

impl Permission {
    pub fn new(
        resource: impl Into<String>,
        resource_name: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            resource_name: resource_name.into(),
            verb: verb.into(),
        }
    }

    /// Render as `verb:resource/resource_name`.
    ///
    /// # Performance
    /// - Allocates a new `String` each call.
    pub fn as_string(&self) -> String {
        format!("{}:{}/{}", self.verb, self.resource, self.resource_name)
    }

    /// Whether this permission covers `verb` on the named resource.
    pub fn allows(&self, resource: &str, resource_name: &str, verb: &str) -> bool {
        self.resource == resource
            && self.verb == verb
            && wildcard_match(&self.resource_name, resource_name)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Deduplicated, ordered collection of [`Permission`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Insert a permission; returns `false` if it was already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.0.contains(permission)
    }

    /// Answer a check, matching the requested name against stored globs.
    pub fn allows(&self, resource: &str, resource_name: &str, verb: &str) -> bool {
        self.0
            .iter()
            .any(|permission| permission.allows(resource, resource_name, verb))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Permission> {
        self.0.into_iter().collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Permission> for PermissionSet {
    fn extend<I: IntoIterator<Item = Permission>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for PermissionSet {
    type Item = Permission;
    type IntoIter = std::collections::btree_set::IntoIter<Permission>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
