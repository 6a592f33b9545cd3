//! Permission resolution over an immutable policy snapshot.
//!
//! # Purpose
//! Turns roles, bindings and policy definitions into the effective
//! [`PermissionSet`] of a principal in a [`Scope`].
//!
//! # How it fits
//! The policy service resolves against snapshots taken from its store; the
//! [`crate::BundleEvaluator`] resolves against the snapshot carried by a
//! bundle. Both go through [`PolicySnapshot::resolve`].
//!
//! # Key invariants
//! - Union only: a permission granted by any applicable binding is kept.
//! - Bindings whose role is missing (or not referenceable from the binding's
//!   scope) contribute nothing and are reported in [`Resolution::dangling`].
//! - Tuples whose `(resource, verb)` pair is not registered are dropped and
//!   reported in [`Resolution::dropped`]; the rest of the rule still applies.
//! - `*` verbs and `*` resource types expand against registered definitions;
//!   resource names are kept as written.
//!
//! # Examples
//! ```rust
//! use warden_authz::{
//!     Binding, PolicyDefinition, PolicySnapshot, Principal, Role, Rule, Scope, Subject,
//! };
//!
//! let viewer = Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])]);
//! let binding = Binding::new("proj1", "b1", viewer.key(), [Subject::user("alice")]);
//! let snapshot = PolicySnapshot::new(
//!     vec![viewer],
//!     vec![binding],
//!     vec![PolicyDefinition::new("build", ["read", "run"])],
//! );
//!
//! let alice = Principal::user("alice");
//! let resolved = snapshot.resolve(&alice, &Scope::namespace("proj1"));
//! assert!(resolved.permissions.allows("build", "api", "read"));
//! assert!(snapshot.resolve(&alice, &Scope::namespace("proj2")).permissions.is_empty());
//! ```
use crate::{
    Binding, BindingKey, Permission, PermissionSet, PolicyDefinition, Principal, Role, Rule,
    Scope,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Point-in-time copy of all policy state needed to resolve permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub roles: Vec<Role>,
    pub bindings: Vec<Binding>,
    pub definitions: Vec<PolicyDefinition>,
}

/// Outcome of a resolution, including the anomalies encountered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub permissions: PermissionSet,
    /// Applicable bindings whose role could not be used.
    pub dangling: Vec<BindingKey>,
    /// Tuples discarded because their `(resource, verb)` is unregistered.
    pub dropped: Vec<Permission>,
}

impl PolicySnapshot {
    /// Build a snapshot with every collection in canonical order.
    pub fn new(
        mut roles: Vec<Role>,
        mut bindings: Vec<Binding>,
        mut definitions: Vec<PolicyDefinition>,
    ) -> Self {
        roles.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        bindings.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        definitions.sort_by(|a, b| a.resource.cmp(&b.resource));
        Self {
            roles,
            bindings,
            definitions,
        }
    }

    pub fn role(&self, namespace: &str, name: &str) -> Option<&Role> {
        self.roles
            .iter()
            .find(|role| role.namespace == namespace && role.name == name)
    }

    /// Bindings that name `principal` as a subject, ordered by
    /// `(namespace, name)`. With a scope, only bindings applying in that scope
    /// are returned.
    pub fn bindings_for(&self, principal: &Principal, scope: Option<&Scope>) -> Vec<&Binding> {
        let mut bindings: Vec<&Binding> = self
            .bindings
            .iter()
            .filter(|binding| scope.is_none_or(|scope| scope.includes(&binding.namespace)))
            .filter(|binding| binding.includes(principal))
            .collect();
        bindings.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
        bindings
    }

    pub fn resolve(&self, principal: &Principal, scope: &Scope) -> Resolution {
        let roles: HashMap<(&str, &str), &Role> = self
            .roles
            .iter()
            .map(|role| ((role.namespace.as_str(), role.name.as_str()), role))
            .collect();
        let definitions: BTreeMap<&str, &PolicyDefinition> = self
            .definitions
            .iter()
            .map(|definition| (definition.resource.as_str(), definition))
            .collect();

        let mut resolution = Resolution::default();
        for binding in self.bindings_for(principal, Some(scope)) {
            let role = roles
                .get(&(binding.role.namespace.as_str(), binding.role.name.as_str()))
                .filter(|role| binding.check_role(role).is_ok());
            let Some(role) = role else {
                resolution.dangling.push(binding.key());
                continue;
            };
            for rule in &role.rules {
                expand_rule(rule, &definitions, &mut resolution);
            }
        }
        resolution
    }
}

fn expand_rule(
    rule: &Rule,
    definitions: &BTreeMap<&str, &PolicyDefinition>,
    out: &mut Resolution,
) {
    if rule.all_resources() {
        // Verbs a given resource type does not register are simply not
        // applicable to it.
        for definition in definitions.values() {
            for verb in definition.verb_names() {
                if rule.all_verbs() || rule.verbs.contains(verb) {
                    out.permissions
                        .insert(Permission::new(&definition.resource, &rule.resource_name, verb));
                }
            }
        }
        return;
    }

    let Some(definition) = definitions.get(rule.resource.as_str()) else {
        out.dropped.extend(
            rule.verbs
                .iter()
                .map(|verb| Permission::new(&rule.resource, &rule.resource_name, verb)),
        );
        return;
    };

    if rule.all_verbs() {
        out.permissions.extend(
            definition
                .verb_names()
                .map(|verb| Permission::new(&rule.resource, &rule.resource_name, verb)),
        );
        return;
    }

    for verb in &rule.verbs {
        let permission = Permission::new(&rule.resource, &rule.resource_name, verb);
        if definition.supports(verb) {
            out.permissions.insert(permission);
        } else {
            out.dropped.push(permission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RoleKey, Subject};

    fn definitions() -> Vec<PolicyDefinition> {
        vec![
            PolicyDefinition::new("build", ["read", "run"]),
            PolicyDefinition::new("env", ["read", "deploy"]),
        ]
    }

    fn user_binding(namespace: &str, name: &str, role: RoleKey, uid: &str) -> Binding {
        Binding::new(namespace, name, role, [Subject::user(uid)])
    }

    #[test]
    fn viewer_scenario_is_namespace_scoped() {
        let viewer = Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])]);
        let b1 = user_binding("proj1", "b1", viewer.key(), "alice");
        let snapshot = PolicySnapshot::new(vec![viewer], vec![b1], definitions());
        let alice = Principal::user("alice");

        let resolved = snapshot.resolve(&alice, &Scope::namespace("proj1"));
        let expected: PermissionSet = [Permission::new("build", "*", "read")].into_iter().collect();
        assert_eq!(resolved.permissions, expected);
        assert!(
            snapshot
                .resolve(&alice, &Scope::namespace("proj2"))
                .permissions
                .is_empty()
        );
        assert!(snapshot.resolve(&alice, &Scope::System).permissions.is_empty());
    }

    #[test]
    fn union_of_roles_is_monotonic() {
        let r1 = Role::public("r1", vec![Rule::new("build", ["read"])]);
        let r2 = Role::public("r2", vec![Rule::new("build", ["read", "run"])]);
        let snapshot = PolicySnapshot::new(
            vec![r1.clone(), r2.clone()],
            vec![
                user_binding("p", "via-r1", r1.key(), "alice"),
                user_binding("p", "via-r2", r2.key(), "bob"),
                user_binding("p", "both-1", r1.key(), "carol"),
                user_binding("p", "both-2", r2.key(), "carol"),
            ],
            definitions(),
        );
        let scope = Scope::namespace("p");
        for uid in ["alice", "bob", "carol"] {
            let resolved = snapshot.resolve(&Principal::user(uid), &scope);
            assert!(resolved.permissions.allows("build", "x", "read"), "{uid}");
        }
        let carol = snapshot.resolve(&Principal::user("carol"), &scope);
        assert_eq!(carol.permissions.len(), 2);
    }

    #[test]
    fn system_bindings_apply_in_every_scope() {
        let admin = Role::system("admin", vec![Rule::new("env", ["deploy"])]);
        let binding = Binding::system("admins", admin.key(), [Subject::group("ops")]);
        let snapshot = PolicySnapshot::new(vec![admin], vec![binding], definitions());
        let ops = Principal::user("u1").with_groups(["ops"]);

        for scope in [Scope::System, Scope::namespace("a"), Scope::namespace("b")] {
            assert!(snapshot.resolve(&ops, &scope).permissions.allows("env", "prod", "deploy"));
        }
        assert!(
            snapshot
                .resolve(&Principal::user("u2"), &Scope::System)
                .permissions
                .is_empty()
        );
    }

    #[test]
    fn wildcard_user_grants_everyone() {
        let reader = Role::public("reader", vec![Rule::new("build", ["read"])]);
        let binding = Binding::new("p", "everyone", reader.key(), [Subject::all_users()]);
        let snapshot = PolicySnapshot::new(vec![reader], vec![binding], definitions());
        let resolved = snapshot.resolve(&Principal::user("anyone"), &Scope::namespace("p"));
        assert!(resolved.permissions.allows("build", "x", "read"));
    }

    #[test]
    fn wildcards_expand_against_definitions() {
        let all_verbs = Role::public("builder", vec![Rule::new("build", ["*"])]);
        let all_resources = Role::public("reader", vec![Rule::new("*", ["read"])]);
        let everything = Role::system("root", vec![Rule::new("*", ["*"])]);
        let snapshot = PolicySnapshot::new(
            vec![all_verbs.clone(), all_resources.clone(), everything.clone()],
            vec![
                user_binding("p", "b1", all_verbs.key(), "a"),
                user_binding("p", "b2", all_resources.key(), "b"),
                user_binding("", "b3", everything.key(), "c"),
            ],
            definitions(),
        );
        let scope = Scope::namespace("p");

        let a = snapshot.resolve(&Principal::user("a"), &scope).permissions;
        assert_eq!(
            a.into_vec(),
            vec![
                Permission::new("build", "*", "read"),
                Permission::new("build", "*", "run"),
            ]
        );

        let b = snapshot.resolve(&Principal::user("b"), &scope);
        assert_eq!(b.permissions.len(), 2);
        assert!(b.permissions.allows("env", "x", "read"));
        assert!(b.dropped.is_empty());

        let c = snapshot.resolve(&Principal::user("c"), &scope).permissions;
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn unregistered_tuples_are_dropped_per_tuple() {
        let role = Role::public(
            "mixed",
            vec![
                Rule::new("build", ["read", "teleport"]),
                Rule::new("unknown", ["read"]),
            ],
        );
        let binding = user_binding("p", "b", role.key(), "alice");
        let snapshot = PolicySnapshot::new(vec![role], vec![binding], definitions());
        let resolved = snapshot.resolve(&Principal::user("alice"), &Scope::namespace("p"));

        assert_eq!(
            resolved.permissions.into_vec(),
            vec![Permission::new("build", "*", "read")]
        );
        assert_eq!(
            resolved.dropped,
            vec![
                Permission::new("build", "*", "teleport"),
                Permission::new("unknown", "*", "read"),
            ]
        );
    }

    #[test]
    fn dangling_roles_contribute_nothing() {
        let binding = user_binding("p", "b", RoleKey::namespaced("p", "gone"), "alice");
        let snapshot = PolicySnapshot::new(Vec::new(), vec![binding], definitions());
        let resolved = snapshot.resolve(&Principal::user("alice"), &Scope::namespace("p"));
        assert!(resolved.permissions.is_empty());
        assert_eq!(resolved.dangling, vec![BindingKey::new("p", "b")]);
    }

    #[test]
    fn foreign_custom_role_is_treated_as_dangling() {
        let foreign = Role::custom("other", "viewer", vec![Rule::new("build", ["read"])]);
        let binding = user_binding("p", "b", foreign.key(), "alice");
        let snapshot = PolicySnapshot::new(vec![foreign], vec![binding], definitions());
        let resolved = snapshot.resolve(&Principal::user("alice"), &Scope::namespace("p"));
        assert!(resolved.permissions.is_empty());
        assert_eq!(resolved.dangling.len(), 1);
    }

    #[test]
    fn resource_name_globs_are_preserved() {
        let role = Role::public(
            "scoped",
            vec![Rule::new("build", ["read"]).with_resource_name("proj-*")],
        );
        let binding = user_binding("p", "b", role.key(), "alice");
        let snapshot = PolicySnapshot::new(vec![role], vec![binding], definitions());
        let resolved = snapshot.resolve(&Principal::user("alice"), &Scope::namespace("p"));
        assert!(
            resolved
                .permissions
                .contains(&Permission::new("build", "proj-*", "read"))
        );
        assert!(resolved.permissions.allows("build", "proj-api", "read"));
        assert!(!resolved.permissions.allows("build", "api", "read"));
    }

    #[test]
    fn bindings_for_orders_and_filters() {
        let role = Role::public("r", vec![Rule::new("build", ["read"])]);
        let snapshot = PolicySnapshot::new(
            vec![role.clone()],
            vec![
                user_binding("b", "x", role.key(), "alice"),
                user_binding("a", "y", role.key(), "alice"),
                user_binding("", "sys", role.key(), "alice"),
                user_binding("a", "other", role.key(), "bob"),
            ],
            definitions(),
        );
        let alice = Principal::user("alice");
        let keys: Vec<_> = snapshot
            .bindings_for(&alice, None)
            .into_iter()
            .map(Binding::key)
            .collect();
        assert_eq!(
            keys,
            vec![
                BindingKey::system("sys"),
                BindingKey::new("a", "y"),
                BindingKey::new("b", "x"),
            ]
        );
        let scoped = snapshot.bindings_for(&alice, Some(&Scope::namespace("a")));
        assert_eq!(scoped.len(), 2);
    }
}
