//! Role registry.
//!
//! Custom, public and system roles share one code path; the caller names the
//! kind it expects and a role of another kind behaves as absent.
use super::{BulkDeleteItem, RegistryContext};
use crate::error::{PolicyError, PolicyResult};
use crate::store::{PolicyStore, RoleDeletion, RoleFilter, Written};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use warden_authz::{PolicyDefinition, Role, RoleKey, RoleKind, Rule, WILDCARD, validate_name};

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RolePatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
}

#[derive(Clone)]
pub struct RoleRegistry {
    ctx: RegistryContext,
    /// Reject rules naming unregistered resource types or verbs.
    strict_rules: bool,
}

impl RoleRegistry {
    pub fn new(ctx: RegistryContext, strict_rules: bool) -> Self {
        Self { ctx, strict_rules }
    }

    /// # Errors
    /// - `ValidationFailed` for malformed roles.
    /// - `AlreadyExists` if `(namespace, name)` is taken by any kind.
    pub async fn create(&self, role: Role) -> PolicyResult<Role> {
        self.validate(&role).await?;
        let written = self
            .ctx
            .call("create_role", self.ctx.store.create_role(role))
            .await?;
        Ok(self.finish(written).await)
    }

    /// Apply `patch` to an existing role of `kind`.
    ///
    /// # Errors
    /// - `NotFound` if no role of `kind` exists under `key`.
    /// - `Conflict` if the role changed between read and write.
    pub async fn update(&self, kind: RoleKind, key: &RoleKey, patch: RolePatch) -> PolicyResult<Role> {
        let current = self.get(kind, key).await?;
        let revision = current.revision;
        let mut role = current;
        if let Some(description) = patch.description {
            role.description = description;
        }
        if let Some(rules) = patch.rules {
            role.rules = rules;
        }
        self.validate(&role).await?;
        let written = self
            .ctx
            .call("put_role", self.ctx.store.put_role(role, Some(revision)))
            .await?;
        Ok(self.finish(written).await)
    }

    /// Idempotent upsert; an identical payload keeps the current revision.
    pub async fn create_or_update(&self, role: Role) -> PolicyResult<Role> {
        self.validate(&role).await?;
        let written = self
            .ctx
            .call("put_role", self.ctx.store.put_role(role, None))
            .await?;
        Ok(self.finish(written).await)
    }

    /// Roles of `kind`, optionally limited to one namespace, ordered by
    /// `(namespace, name)`.
    pub async fn list(&self, kind: RoleKind, namespace: Option<&str>) -> PolicyResult<Vec<Role>> {
        let filter = RoleFilter {
            namespace: namespace.map(str::to_string),
            kind: Some(kind),
        };
        self.ctx
            .call("list_roles", self.ctx.store.list_roles(&filter))
            .await
    }

    pub async fn get(&self, kind: RoleKind, key: &RoleKey) -> PolicyResult<Role> {
        let role = self.ctx.call("get_role", self.ctx.store.get_role(key)).await?;
        if role.kind != kind {
            return Err(PolicyError::NotFound(format!("{kind} role {key}")));
        }
        Ok(role)
    }

    /// # Errors
    /// - `Conflict` while bindings reference the role and `cascade` is unset.
    pub async fn delete(&self, kind: RoleKind, key: &RoleKey, cascade: bool) -> PolicyResult<RoleDeletion> {
        let deletion = self
            .ctx
            .call(
                "delete_role",
                self.ctx.store.delete_role(key, kind, cascade),
            )
            .await?;
        self.ctx.resolver.invalidate_all().await;
        self.ctx.committed(deletion.seq);
        tracing::info!(
            role = %key,
            %kind,
            cascaded_bindings = deletion.bindings.len(),
            "role deleted"
        );
        Ok(deletion)
    }

    /// Delete each name independently and report every outcome.
    pub async fn bulk_delete(
        &self,
        kind: RoleKind,
        namespace: &str,
        names: &[String],
        cascade: bool,
    ) -> Vec<BulkDeleteItem> {
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let result = match validate_name("role name", name) {
                Ok(()) => self
                    .delete(kind, &RoleKey::new(namespace, name.as_str()), cascade)
                    .await
                    .map(drop),
                Err(err) => Err(err.into()),
            };
            items.push(BulkDeleteItem::from_result(name, result));
        }
        items
    }

    async fn validate(&self, role: &Role) -> PolicyResult<()> {
        role.validate()?;
        if self.strict_rules {
            let definitions = self
                .ctx
                .call("list_definitions", self.ctx.store.list_definitions())
                .await?;
            check_registered(role, &definitions)?;
        }
        Ok(())
    }

    async fn finish(&self, written: Written<Role>) -> Role {
        if written.changed {
            // Role changes can affect any principal bound to it.
            self.ctx.resolver.invalidate_all().await;
            self.ctx.committed(written.seq);
            tracing::info!(
                role = %written.value.key(),
                kind = %written.value.kind,
                revision = written.value.revision,
                "role written"
            );
        }
        written.value
    }
}

fn check_registered(role: &Role, definitions: &[PolicyDefinition]) -> PolicyResult<()> {
    for rule in &role.rules {
        let verbs = rule.verbs.iter().filter(|verb| verb.as_str() != WILDCARD);
        if rule.all_resources() {
            for verb in verbs {
                if !definitions.iter().any(|definition| definition.supports(verb)) {
                    return Err(PolicyError::ValidationFailed(format!(
                        "role {}: verb {verb} is not registered for any resource",
                        role.name
                    )));
                }
            }
            continue;
        }
        let definition = definitions
            .iter()
            .find(|definition| definition.resource == rule.resource)
            .ok_or_else(|| {
                PolicyError::ValidationFailed(format!(
                    "role {}: resource {} is not registered",
                    role.name, rule.resource
                ))
            })?;
        for verb in verbs {
            if !definition.supports(verb) {
                return Err(PolicyError::ValidationFailed(format!(
                    "role {}: verb {verb} is not registered for {}",
                    role.name, rule.resource
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BulkDeleteStatus;
    use crate::registry::testing::context;
    use warden_authz::{Binding, Principal, Scope, Subject};

    fn viewer() -> Role {
        Role::custom("proj1", "viewer", vec![Rule::new("build", ["read"])])
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let (ctx, rx) = context();
        let registry = RoleRegistry::new(ctx, false);

        let err = registry
            .create(Role::custom("", "viewer", vec![Rule::new("build", ["read"])]))
            .await
            .expect_err("namespace required");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));

        let created = registry.create(viewer()).await.expect("create");
        assert_eq!(created.revision, 1);
        assert_eq!(*rx.borrow(), 1);

        let err = registry.create(viewer()).await.expect_err("duplicate");
        assert!(matches!(err, PolicyError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_patches_existing_role() {
        let (ctx, _rx) = context();
        let registry = RoleRegistry::new(ctx, false);
        let key = RoleKey::namespaced("proj1", "viewer");

        let err = registry
            .update(RoleKind::Custom, &key, RolePatch::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, PolicyError::NotFound(_)));

        registry.create(viewer()).await.expect("create");
        let updated = registry
            .update(
                RoleKind::Custom,
                &key,
                RolePatch {
                    description: Some("reads builds".to_string()),
                    rules: None,
                },
            )
            .await
            .expect("patch");
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.description, "reads builds");
        assert_eq!(updated.rules, viewer().rules);

        let err = registry
            .update(RoleKind::Public, &key, RolePatch::default())
            .await
            .expect_err("wrong kind");
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_or_update_is_idempotent() {
        let (ctx, rx) = context();
        let registry = RoleRegistry::new(ctx.clone(), false);
        let first = registry.create_or_update(viewer()).await.expect("first");
        let watermark = *rx.borrow();
        let second = registry.create_or_update(viewer()).await.expect("second");
        assert_eq!(first.revision, second.revision);
        assert_eq!(*rx.borrow(), watermark);
    }

    #[tokio::test]
    async fn strict_rules_require_registered_pairs() {
        let (ctx, _rx) = context();
        ctx.store
            .put_definition(warden_authz::PolicyDefinition::new("build", ["read"]))
            .await
            .expect("definition");
        let registry = RoleRegistry::new(ctx, true);

        registry.create(viewer()).await.expect("registered pair");
        let err = registry
            .create(Role::public("runner", vec![Rule::new("build", ["run"])]))
            .await
            .expect_err("unregistered verb");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));
        let err = registry
            .create(Role::public("deployer", vec![Rule::new("deploy", ["*"])]))
            .await
            .expect_err("unregistered resource");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));
        registry
            .create(Role::system("admin", vec![Rule::new("*", ["*"])]))
            .await
            .expect("wildcards are always allowed");
    }

    #[tokio::test]
    async fn bulk_delete_reports_per_name() {
        let (ctx, _rx) = context();
        let registry = RoleRegistry::new(ctx, false);
        registry
            .create(Role::public("r1", vec![Rule::new("build", ["read"])]))
            .await
            .expect("r1");

        let items = registry
            .bulk_delete(
                RoleKind::Public,
                "",
                &["r1".to_string(), "r2".to_string(), "bad name".to_string()],
                false,
            )
            .await;
        let statuses: Vec<_> = items.iter().map(|item| item.status).collect();
        assert_eq!(
            statuses,
            vec![
                BulkDeleteStatus::Deleted,
                BulkDeleteStatus::NotFound,
                BulkDeleteStatus::Invalid
            ]
        );
        let err = registry
            .get(RoleKind::Public, &RoleKey::global("r1"))
            .await
            .expect_err("deleted");
        assert!(matches!(err, PolicyError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_invalidates_cached_permissions() {
        let (ctx, _rx) = context();
        let registry = RoleRegistry::new(ctx.clone(), false);
        ctx.store
            .put_definition(warden_authz::PolicyDefinition::new("build", ["read"]))
            .await
            .expect("definition");
        registry.create(viewer()).await.expect("role");
        ctx.store
            .create_binding(Binding::new(
                "proj1",
                "b1",
                RoleKey::namespaced("proj1", "viewer"),
                [Subject::user("alice")],
            ))
            .await
            .expect("binding");

        let alice = Principal::user("alice");
        let scope = Scope::namespace("proj1");
        assert_eq!(ctx.resolver.resolve(&alice, &scope).await.expect("resolve").len(), 1);

        let key = RoleKey::namespaced("proj1", "viewer");
        let err = registry
            .delete(RoleKind::Custom, &key, false)
            .await
            .expect_err("still bound");
        assert!(matches!(err, PolicyError::Conflict(_)));

        let deletion = registry
            .delete(RoleKind::Custom, &key, true)
            .await
            .expect("cascade");
        assert_eq!(deletion.bindings.len(), 1);
        assert!(ctx.resolver.resolve(&alice, &scope).await.expect("resolve").is_empty());
    }
}
