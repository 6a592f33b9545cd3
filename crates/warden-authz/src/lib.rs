//! Warden RBAC primitives shared by the policy service and enforcement points.
//!
//! # Purpose
//! Centralizes the role/binding model, the wildcard matcher, permission
//! tuples, the resolution algorithm and the policy bundle format.
//!
//! # How it fits
//! The policy service stores and validates these types, resolves permissions
//! through [`PolicySnapshot::resolve`] and compiles [`Bundle`]s. Remote
//! enforcement points download those bundles and evaluate them offline with
//! [`BundleEvaluator`], which runs the exact same resolution code.
//!
//! # Key invariants
//! - Resolution is additive-only: there are no deny rules and no precedence.
//! - Permissions are `(resource, resource_name, verb)` tuples; resource names
//!   keep their glob form and are matched at check time.
//! - Bundle revisions are the SHA-256 digest of the canonical content.
//!
//! # Examples
//! ```rust
//! use warden_authz::{Permission, PermissionSet};
//!
//! let mut set = PermissionSet::default();
//! set.insert(Permission::new("build", "proj-*", "read"));
//! assert!(set.allows("build", "proj-api", "read"));
//! assert!(!set.allows("build", "proj-api", "delete"));
//! ```
//!
//! # Common pitfalls
//! - Skipping [`Role::validate`] lets malformed rules into the store.
//! - Comparing bundles by version alone; compare revisions to detect content.

mod binding;
mod bundle;
mod definition;
mod errors;
mod matcher;
mod permission;
mod resolve;
mod role;
mod types;

pub use binding::{Binding, Principal, Subject, SubjectKind};
pub use bundle::{Bundle, BundleContent, BundleEvaluator, DEFAULT_BUNDLE_NAME};
pub use definition::{PolicyDefinition, VerbDefinition};
pub use errors::{AuthzError, AuthzResult};
pub use matcher::wildcard_match;
pub use permission::{Permission, PermissionSet};
pub use resolve::{PolicySnapshot, Resolution};
pub use role::{Role, RoleKind, Rule};
pub use types::{BindingKey, RoleKey, Scope, WILDCARD, validate_name};
