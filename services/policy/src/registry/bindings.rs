//! Binding registry: namespaced and system role bindings.
use super::{BulkDeleteItem, RegistryContext};
use crate::error::PolicyResult;
use crate::store::{PolicyStore, Written};
use std::collections::BTreeSet;
use warden_authz::{Binding, BindingKey, Principal, Scope, Subject, validate_name};

#[derive(Clone)]
pub struct BindingRegistry {
    ctx: RegistryContext,
}

impl BindingRegistry {
    pub fn new(ctx: RegistryContext) -> Self {
        Self { ctx }
    }

    /// # Errors
    /// - `ValidationFailed` for malformed bindings.
    /// - `InvalidReference` when the role is missing or not referenceable.
    /// - `AlreadyExists` if the key is taken.
    pub async fn create(&self, binding: Binding) -> PolicyResult<Binding> {
        binding.validate()?;
        let written = self
            .ctx
            .call("create_binding", self.ctx.store.create_binding(binding))
            .await?;
        Ok(self.finish(written).await)
    }

    /// Replace an existing binding; `NotFound` if it does not exist.
    pub async fn update(&self, binding: Binding) -> PolicyResult<Binding> {
        binding.validate()?;
        let written = self
            .ctx
            .call("put_binding", self.ctx.store.put_binding(binding, true))
            .await?;
        Ok(self.finish(written).await)
    }

    pub async fn create_or_update(&self, binding: Binding) -> PolicyResult<Binding> {
        binding.validate()?;
        let written = self
            .ctx
            .call("put_binding", self.ctx.store.put_binding(binding, false))
            .await?;
        Ok(self.finish(written).await)
    }

    /// Bindings of one namespace; the empty namespace lists system bindings.
    pub async fn list(&self, namespace: &str) -> PolicyResult<Vec<Binding>> {
        self.ctx
            .call("list_bindings", self.ctx.store.list_bindings(Some(namespace)))
            .await
    }

    pub async fn get(&self, key: &BindingKey) -> PolicyResult<Binding> {
        self.ctx
            .call("get_binding", self.ctx.store.get_binding(key))
            .await
    }

    pub async fn delete(&self, key: &BindingKey) -> PolicyResult<Binding> {
        let removed = self
            .ctx
            .call("delete_binding", self.ctx.store.delete_binding(key))
            .await?;
        self.ctx
            .resolver
            .invalidate_subjects(&removed.value.subjects)
            .await;
        self.ctx.committed(removed.seq);
        tracing::info!(binding = %key, "binding deleted");
        Ok(removed.value)
    }

    pub async fn bulk_delete(&self, namespace: &str, names: &[String]) -> Vec<BulkDeleteItem> {
        let mut items = Vec::with_capacity(names.len());
        for name in names {
            let result = match validate_name("binding name", name) {
                Ok(()) => self
                    .delete(&BindingKey::new(namespace, name.as_str()))
                    .await
                    .map(drop),
                Err(err) => Err(err.into()),
            };
            items.push(BulkDeleteItem::from_result(name, result));
        }
        items
    }

    /// Bindings naming `principal` (directly, through a group, or through the
    /// `*` user), ordered by `(namespace, name)`. With a namespace, only
    /// system bindings and that namespace's bindings are returned.
    pub async fn list_for_subject(
        &self,
        principal: &Principal,
        namespace: Option<&str>,
    ) -> PolicyResult<Vec<Binding>> {
        let scope = namespace.map(|ns| Scope::from_optional(Some(ns)));
        let bindings = self
            .ctx
            .call("list_bindings", self.ctx.store.list_bindings(None))
            .await?;
        Ok(bindings
            .into_iter()
            .filter(|binding| {
                scope
                    .as_ref()
                    .is_none_or(|scope| scope.includes(&binding.namespace))
            })
            .filter(|binding| binding.includes(principal))
            .collect())
    }

    async fn finish(&self, written: Written<Binding>) -> Binding {
        if written.changed {
            let affected: BTreeSet<&Subject> = written
                .previous
                .iter()
                .flat_map(|previous| previous.subjects.iter())
                .chain(written.value.subjects.iter())
                .collect();
            self.ctx.resolver.invalidate_subjects(affected).await;
            self.ctx.committed(written.seq);
            tracing::info!(
                binding = %written.value.key(),
                role = %written.value.role,
                subjects = written.value.subjects.len(),
                "binding written"
            );
        }
        written.value
    }
}
