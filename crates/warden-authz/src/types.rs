//! Identifiers and scopes for roles and bindings.
//!
//! # Purpose
//! Gives roles and bindings a typed `(namespace, name)` identity and defines
//! the resolution [`Scope`].
//!
//! # Key invariants
//! - The empty namespace is the global space shared by public roles, system
//!   roles and system bindings.
//! - Names accepted by [`validate_name`] are ASCII alphanumerics plus `-`, `_`
//!   and `.`, at most [`MAX_NAME_LEN`] bytes.
//!
//! # Examples
//! ```rust
//! use warden_authz::{RoleKey, Scope};
//!
//! let key = RoleKey::namespaced("proj1", "viewer");
//! assert_eq!(key.to_string(), "proj1/viewer");
//! assert!(Scope::namespace("proj1").includes(""));
//! assert!(!Scope::System.includes("proj1"));
//! ```
use crate::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};

/// Wildcard token for verbs, resource types and resource names.
pub const WILDCARD: &str = "*";

/// Maximum length of a role, binding, namespace, resource or verb name.
pub const MAX_NAME_LEN: usize = 128;

/// Validate a name used as part of an identity.
///
/// # Errors
/// - [`AuthzError::InvalidName`] when the value is empty, too long or holds a
///   character outside `[A-Za-z0-9._-]`.
pub fn validate_name(kind: &'static str, value: &str) -> AuthzResult<()> {
    let well_formed = !value.is_empty()
        && value.len() <= MAX_NAME_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
    if well_formed {
        Ok(())
    } else {
        Err(AuthzError::InvalidName {
            kind,
            value: value.to_string(),
        })
    }
}

fn render_key(f: &mut std::fmt::Formatter<'_>, namespace: &str, name: &str) -> std::fmt::Result {
    if namespace.is_empty() {
        f.write_str(name)
    } else {
        write!(f, "{namespace}/{name}")
    }
}

/// Identity of a role.
///
/// # Invariants
/// - `namespace` is empty for public and system roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleKey {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl RoleKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name)
    }

    /// Key of a public or system role.
    pub fn global(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    pub fn is_global(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl std::fmt::Display for RoleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        render_key(f, &self.namespace, &self.name)
    }
}

/// Identity of a binding; the empty namespace marks a system binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BindingKey {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

impl BindingKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    pub fn is_system(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        render_key(f, &self.namespace, &self.name)
    }
}

/// Where a resolution happens.
///
/// System bindings apply in every scope; namespaced bindings only in their
/// own namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// No namespace: only system bindings apply.
    System,
    Namespace(String),
}

impl Scope {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::Namespace(namespace.into())
    }

    /// Map an optional query parameter to a scope. An empty value is treated
    /// as absent.
    pub fn from_optional(namespace: Option<&str>) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self::Namespace(ns.to_string()),
            _ => Self::System,
        }
    }

    /// Whether a binding living in `binding_namespace` applies in this scope.
    pub fn includes(&self, binding_namespace: &str) -> bool {
        if binding_namespace.is_empty() {
            return true;
        }
        match self {
            Self::System => false,
            Self::Namespace(ns) => ns == binding_namespace,
        }
    }

    pub fn as_namespace(&self) -> Option<&str> {
        match self {
            Self::System => None,
            Self::Namespace(ns) => Some(ns),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => f.write_str("<system>"),
            Self::Namespace(ns) => f.write_str(ns),
        }
    }
}
