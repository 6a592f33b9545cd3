//! Bindings: grants of one role to a set of subjects.
//!
//! # Key invariants
//! - A binding has at least one subject.
//! - The user `*` matches every principal.
//! - A system binding (empty namespace) may not reference a custom role; a
//!   namespaced binding may reference a custom role only from its own
//!   namespace. See [`Binding::check_role`].
use crate::{AuthzError, AuthzResult, BindingKey, Role, RoleKey, RoleKind, WILDCARD, validate_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: String,
}

impl Subject {
    pub fn user(uid: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::User,
            id: uid.into(),
        }
    }

    pub fn group(gid: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Group,
            id: gid.into(),
        }
    }

    /// Subject granting to every principal.
    pub fn all_users() -> Self {
        Self::user(WILDCARD)
    }

    pub fn is_all_users(&self) -> bool {
        self.kind == SubjectKind::User && self.id == WILDCARD
    }

    pub fn matches(&self, principal: &Principal) -> bool {
        match self.kind {
            SubjectKind::User => self.id == WILDCARD || self.id == principal.uid,
            SubjectKind::Group => principal.groups.contains(&self.id),
        }
    }
}

/// An already-authenticated caller: a user id plus its group memberships.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Principal {
    pub uid: String,
    pub groups: BTreeSet<String>,
}

impl Principal {
    pub fn user(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            groups: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Binding {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub role: RoleKey,
    pub subjects: BTreeSet<Subject>,
}

impl Binding {
    pub fn new<I>(namespace: impl Into<String>, name: impl Into<String>, role: RoleKey, subjects: I) -> Self
    where
        I: IntoIterator<Item = Subject>,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            role,
            subjects: subjects.into_iter().collect(),
        }
    }

    pub fn system<I>(name: impl Into<String>, role: RoleKey, subjects: I) -> Self
    where
        I: IntoIterator<Item = Subject>,
    {
        Self::new(String::new(), name, role, subjects)
    }

    pub fn key(&self) -> BindingKey {
        BindingKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn is_system(&self) -> bool {
        self.namespace.is_empty()
    }

    pub fn includes(&self, principal: &Principal) -> bool {
        self.subjects.iter().any(|subject| subject.matches(principal))
    }

    /// Check shape invariants; the role reference is checked separately by
    /// [`Binding::check_role`] once the role is looked up.
    pub fn validate(&self) -> AuthzResult<()> {
        validate_name("binding name", &self.name)?;
        if !self.namespace.is_empty() {
            validate_name("namespace", &self.namespace)?;
        }
        validate_name("role name", &self.role.name)?;
        if !self.role.namespace.is_empty() {
            validate_name("role namespace", &self.role.namespace)?;
        }
        if self.subjects.is_empty() {
            return Err(AuthzError::InvalidBinding(format!(
                "binding {} has no subjects",
                self.key()
            )));
        }
        for subject in &self.subjects {
            let id = subject.id.trim();
            if id.is_empty() || id.len() != subject.id.len() {
                return Err(AuthzError::InvalidBinding(format!(
                    "binding {} has a blank or padded subject id",
                    self.key()
                )));
            }
        }
        Ok(())
    }

    /// Check that `role` may be referenced from this binding's scope.
    ///
    /// # Errors
    /// - [`AuthzError::InvalidReference`] when the role is a custom role of
    ///   another namespace, or a custom role referenced by a system binding.
    pub fn check_role(&self, role: &Role) -> AuthzResult<()> {
        if role.key() != self.role {
            return Err(AuthzError::InvalidReference(format!(
                "binding {} references {} but was given {}",
                self.key(),
                self.role,
                role.key()
            )));
        }
        if role.kind != RoleKind::Custom {
            return Ok(());
        }
        if self.is_system() {
            return Err(AuthzError::InvalidReference(format!(
                "system binding {} cannot reference custom role {}",
                self.name, self.role
            )));
        }
        if role.namespace != self.namespace {
            return Err(AuthzError::InvalidReference(format!(
                "binding {} cannot reference custom role {} from another namespace",
                self.key(),
                self.role
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rule;

    fn binding(namespace: &str, role: RoleKey) -> Binding {
        Binding::new(namespace, "b1", role, [Subject::user("alice")])
    }

    #[test]
    fn subject_matching() {
        let alice = Principal::user("alice").with_groups(["devs"]);
        assert!(Subject::user("alice").matches(&alice));
        assert!(!Subject::user("bob").matches(&alice));
        assert!(Subject::group("devs").matches(&alice));
        assert!(!Subject::group("ops").matches(&alice));
        assert!(Subject::all_users().matches(&alice));
        assert!(Subject::all_users().is_all_users());
        // A group literally named `*` is not a wildcard.
        assert!(!Subject::group("*").matches(&alice));
    }

    #[test]
    fn subject_serializes_tagged() {
        let json = serde_json::to_value(Subject::group("devs")).expect("serialize");
        assert_eq!(json["kind"], "group");
        assert_eq!(json["id"], "devs");
    }

    #[test]
    fn validate_requires_subjects() {
        let mut b = binding("proj1", RoleKey::namespaced("proj1", "viewer"));
        b.validate().expect("valid binding");
        b.subjects.clear();
        assert!(matches!(b.validate(), Err(AuthzError::InvalidBinding(_))));
    }

    #[test]
    fn validate_rejects_blank_subject_ids() {
        let b = Binding::new("p", "b1", RoleKey::global("r"), [Subject::user(" ")]);
        assert!(matches!(b.validate(), Err(AuthzError::InvalidBinding(_))));
    }

    #[test]
    fn namespaced_binding_role_references() {
        let own = Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])]);
        let foreign = Role::custom("proj2", "viewer", vec![Rule::new("build", ["read"])]);
        let public = Role::public("reader", vec![Rule::new("build", ["read"])]);
        let system = Role::system("admin", vec![Rule::new("*", ["*"])]);

        binding("proj1", own.key()).check_role(&own).expect("own namespace");
        binding("proj1", public.key())
            .check_role(&public)
            .expect("public role");
        binding("proj1", system.key())
            .check_role(&system)
            .expect("system role");
        let err = binding("proj1", foreign.key())
            .check_role(&foreign)
            .expect_err("foreign namespace");
        assert!(matches!(err, AuthzError::InvalidReference(_)));
    }

    #[test]
    fn system_binding_rejects_custom_roles() {
        let custom = Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])]);
        let system = Role::system("admin", vec![Rule::new("*", ["*"])]);
        let err = binding("", custom.key())
            .check_role(&custom)
            .expect_err("custom role");
        assert!(matches!(err, AuthzError::InvalidReference(_)));
        binding("", system.key())
            .check_role(&system)
            .expect("system role");
    }
}
