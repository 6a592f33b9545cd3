//! Roles: named, kind-tagged sets of allow rules.
//!
//! # Key invariants
//! - Custom roles carry a non-empty namespace; public and system roles carry
//!   the empty namespace and share one global identity space.
//! - Every rule names a resource type (or `*`) and at least one verb.
//! - `revision` is maintained by the store and ignored by [`Role::same_content`].
use crate::{AuthzError, AuthzResult, RoleKey, WILDCARD, validate_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Defined inside one namespace.
    Custom,
    /// Global template any namespace may bind.
    Public,
    /// Global role, typically bound service-wide.
    System,
}

impl RoleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Public => "public",
            Self::System => "system",
        }
    }

    pub fn is_namespaced(self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_resource_name() -> String {
    WILDCARD.to_string()
}

/// Allow rule: `verbs` on resources of type `resource` whose name matches
/// `resource_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Rule {
    pub resource: String,
    #[serde(default = "default_resource_name")]
    pub resource_name: String,
    pub verbs: BTreeSet<String>,
}

impl Rule {
    pub fn new<I, V>(resource: impl Into<String>, verbs: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            resource: resource.into(),
            resource_name: default_resource_name(),
            verbs: verbs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_resource_name(mut self, resource_name: impl Into<String>) -> Self {
        self.resource_name = resource_name.into();
        self
    }

    pub fn all_resources(&self) -> bool {
        self.resource == WILDCARD
    }

    pub fn all_verbs(&self) -> bool {
        self.verbs.contains(WILDCARD)
    }

    pub fn validate(&self) -> AuthzResult<()> {
        if !self.all_resources() {
            validate_name("resource type", &self.resource)?;
        }
        if self.resource_name.is_empty() || self.resource_name.contains(char::is_whitespace) {
            return Err(AuthzError::InvalidName {
                kind: "resource name",
                value: self.resource_name.clone(),
            });
        }
        if self.verbs.is_empty() {
            return Err(AuthzError::InvalidRole(format!(
                "rule on {} has no verbs",
                self.resource
            )));
        }
        for verb in &self.verbs {
            if verb != WILDCARD {
                validate_name("verb", verb)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Role {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub kind: RoleKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub revision: u64,
}

impl Role {
    pub fn custom(namespace: impl Into<String>, name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self::with_kind(RoleKind::Custom, namespace.into(), name.into(), rules)
    }

    pub fn public(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self::with_kind(RoleKind::Public, String::new(), name.into(), rules)
    }

    pub fn system(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self::with_kind(RoleKind::System, String::new(), name.into(), rules)
    }

    fn with_kind(kind: RoleKind, namespace: String, name: String, rules: Vec<Rule>) -> Self {
        Self {
            namespace,
            name,
            kind,
            description: String::new(),
            rules,
            revision: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn key(&self) -> RoleKey {
        RoleKey::new(self.namespace.clone(), self.name.clone())
    }

    /// Content equality, ignoring the store-managed revision.
    pub fn same_content(&self, other: &Role) -> bool {
        self.namespace == other.namespace
            && self.name == other.name
            && self.kind == other.kind
            && self.description == other.description
            && self.rules == other.rules
    }

    /// Check shape invariants. Registration of resource types is not checked
    /// here.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidName`] for malformed names, resources or verbs.
    /// - [`AuthzError::InvalidRole`] for namespace/kind mismatches and
    ///   verb-less rules.
    pub fn validate(&self) -> AuthzResult<()> {
        validate_name("role name", &self.name)?;
        match (self.kind.is_namespaced(), self.namespace.is_empty()) {
            (true, true) => {
                return Err(AuthzError::InvalidRole(format!(
                    "custom role {} requires a namespace",
                    self.name
                )));
            }
            (false, false) => {
                return Err(AuthzError::InvalidRole(format!(
                    "{} role {} must not carry a namespace",
                    self.kind, self.name
                )));
            }
            (true, false) => validate_name("namespace", &self.namespace)?,
            (false, true) => {}
        }
        self.rules.iter().try_for_each(Rule::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_defaults_resource_name_to_wildcard() {
        let rule: Rule =
            serde_json::from_str(r#"{"resource":"build","verbs":["read"]}"#).expect("parse");
        assert_eq!(rule.resource_name, "*");
        assert!(!rule.all_verbs());
    }

    #[test]
    fn role_kind_serializes_snake_case() {
        let json = serde_json::to_string(&RoleKind::System).expect("serialize");
        assert_eq!(json, "\"system\"");
        assert_eq!(RoleKind::Public.to_string(), "public");
    }

    #[test]
    fn custom_role_requires_namespace() {
        let role = Role::custom("", "viewer", vec![Rule::new("build", ["read"])]);
        assert!(matches!(role.validate(), Err(AuthzError::InvalidRole(_))));
        let role = Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])]);
        role.validate().expect("valid custom role");
    }

    #[test]
    fn global_roles_reject_namespace() {
        let mut role = Role::system("admin", vec![Rule::new("*", ["*"])]);
        role.validate().expect("valid system role");
        role.namespace = "proj1".to_string();
        assert!(matches!(role.validate(), Err(AuthzError::InvalidRole(_))));
    }

    #[test]
    fn rules_need_verbs_and_valid_names() {
        let empty = Role::public("r", vec![Rule::new("build", Vec::<String>::new())]);
        assert!(matches!(empty.validate(), Err(AuthzError::InvalidRole(_))));

        let bad_verb = Role::public("r", vec![Rule::new("build", ["read all"])]);
        assert!(matches!(
            bad_verb.validate(),
            Err(AuthzError::InvalidName { kind: "verb", .. })
        ));

        let bad_name = Role::public("r", vec![Rule::new("build", ["read"]).with_resource_name("")]);
        assert!(matches!(
            bad_name.validate(),
            Err(AuthzError::InvalidName {
                kind: "resource name",
                ..
            })
        ));
    }

    #[test]
    fn same_content_ignores_revision() {
        let a = Role::public("r", vec![Rule::new("build", ["read"])]);
        let mut b = a.clone();
        b.revision = 7;
        assert!(a.same_content(&b));
        b.description = "changed".to_string();
        assert!(!a.same_content(&b));
    }
}
