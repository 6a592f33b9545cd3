//! Policy definition registry: resource types and the verbs they support.
//!
//! Definitions are last-writer-wins per resource name. Changing one can widen
//! or narrow every `*` rule, so writes drop the whole resolver cache.
use super::RegistryContext;
use crate::error::{PolicyError, PolicyResult};
use crate::store::PolicyStore;
use warden_authz::PolicyDefinition;

#[derive(Clone)]
pub struct DefinitionRegistry {
    ctx: RegistryContext,
}

impl DefinitionRegistry {
    pub fn new(ctx: RegistryContext) -> Self {
        Self { ctx }
    }

    /// Register or replace the definition of `resource`. An empty
    /// `definition.resource` takes the name from `resource`.
    ///
    /// # Errors
    /// - `ValidationFailed` for a mismatched name, an empty or duplicated
    ///   verb list, or malformed names.
    pub async fn create_or_update(
        &self,
        resource: &str,
        mut definition: PolicyDefinition,
    ) -> PolicyResult<PolicyDefinition> {
        if definition.resource.is_empty() {
            definition.resource = resource.to_string();
        }
        if definition.resource != resource {
            return Err(PolicyError::ValidationFailed(format!(
                "definition for {} sent to {resource}",
                definition.resource
            )));
        }
        definition.validate()?;
        let written = self
            .ctx
            .call("put_definition", self.ctx.store.put_definition(definition))
            .await?;
        if written.changed {
            self.ctx.resolver.invalidate_all().await;
            self.ctx.committed(written.seq);
            tracing::info!(
                resource,
                verbs = written.value.verbs.len(),
                "policy definition registered"
            );
        }
        Ok(written.value)
    }

    pub async fn get(&self, resource: &str) -> PolicyResult<PolicyDefinition> {
        self.ctx
            .call("get_definition", self.ctx.store.get_definition(resource))
            .await
    }

    /// All definitions ordered by resource name.
    pub async fn list(&self) -> PolicyResult<Vec<PolicyDefinition>> {
        self.ctx
            .call("list_definitions", self.ctx.store.list_definitions())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::testing::context;
    use warden_authz::{Binding, Principal, Role, RoleKey, Rule, Scope, Subject};

    #[tokio::test]
    async fn rejects_invalid_definitions() {
        let (ctx, _rx) = context();
        let registry = DefinitionRegistry::new(ctx);

        let err = registry
            .create_or_update("build", PolicyDefinition::new("build", Vec::<String>::new()))
            .await
            .expect_err("no verbs");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));

        let err = registry
            .create_or_update("build", PolicyDefinition::new("build", ["read", "read"]))
            .await
            .expect_err("duplicate verbs");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));

        let err = registry
            .create_or_update("build", PolicyDefinition::new("deploy", ["read"]))
            .await
            .expect_err("name mismatch");
        assert!(matches!(err, PolicyError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_listed_in_order() {
        let (ctx, rx) = context();
        let registry = DefinitionRegistry::new(ctx);
        let mut unnamed = PolicyDefinition::new("", ["read"]);
        unnamed.alias = "Workflows".to_string();
        let stored = registry
            .create_or_update("workflow", unnamed)
            .await
            .expect("named from path");
        assert_eq!(stored.resource, "workflow");
        registry
            .create_or_update("build", PolicyDefinition::new("build", ["read"]))
            .await
            .expect("build");
        let watermark = *rx.borrow();
        registry
            .create_or_update("build", PolicyDefinition::new("build", ["read"]))
            .await
            .expect("same");
        assert_eq!(*rx.borrow(), watermark);

        let names: Vec<_> = registry
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|definition| definition.resource)
            .collect();
        assert_eq!(names, vec!["build", "workflow"]);
        assert_eq!(registry.get("workflow").await.expect("get").alias, "Workflows");
    }

    #[tokio::test]
    async fn new_verbs_widen_wildcard_rules() {
        let (ctx, _rx) = context();
        let registry = DefinitionRegistry::new(ctx.clone());
        registry
            .create_or_update("build", PolicyDefinition::new("build", ["read"]))
            .await
            .expect("definition");
        ctx.store
            .create_role(Role::public("all-builds", vec![Rule::new("build", ["*"])]))
            .await
            .expect("role");
        ctx.store
            .create_binding(Binding::new(
                "proj1",
                "b1",
                RoleKey::global("all-builds"),
                [Subject::user("alice")],
            ))
            .await
            .expect("binding");

        let alice = Principal::user("alice");
        let scope = Scope::namespace("proj1");
        assert_eq!(ctx.resolver.resolve(&alice, &scope).await.expect("resolve").len(), 1);

        registry
            .create_or_update("build", PolicyDefinition::new("build", ["read", "run"]))
            .await
            .expect("widen");
        assert_eq!(ctx.resolver.resolve(&alice, &scope).await.expect("resolve").len(), 2);
    }
}
