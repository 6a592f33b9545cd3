//! Policy definitions: externally registered resource types and their verbs.
//!
//! Definitions are the vocabulary roles are expanded against. A `*` verb in a
//! rule means every verb registered here for the resource type.
use crate::{AuthzError, AuthzResult, validate_name};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VerbDefinition {
    pub action: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
}

impl VerbDefinition {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            alias: String::new(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PolicyDefinition {
    pub resource: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    pub verbs: Vec<VerbDefinition>,
}

impl PolicyDefinition {
    pub fn new<I, V>(resource: impl Into<String>, verbs: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            resource: resource.into(),
            alias: String::new(),
            description: String::new(),
            verbs: verbs.into_iter().map(VerbDefinition::new).collect(),
        }
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.verbs.iter().any(|candidate| candidate.action == verb)
    }

    pub fn verb_names(&self) -> impl Iterator<Item = &str> {
        self.verbs.iter().map(|verb| verb.action.as_str())
    }

    /// # Errors
    /// - [`AuthzError::InvalidName`] for a malformed resource type or verb.
    /// - [`AuthzError::InvalidDefinition`] for an empty or duplicated verb set.
    pub fn validate(&self) -> AuthzResult<()> {
        validate_name("resource type", &self.resource)?;
        if self.verbs.is_empty() {
            return Err(AuthzError::InvalidDefinition(format!(
                "{} declares no verbs",
                self.resource
            )));
        }
        let mut seen = HashSet::with_capacity(self.verbs.len());
        for verb in &self.verbs {
            validate_name("verb", &verb.action)?;
            if !seen.insert(verb.action.as_str()) {
                return Err(AuthzError::InvalidDefinition(format!(
                    "{} declares verb {} twice",
                    self.resource, verb.action
                )));
            }
        }
        Ok(())
    }
}
