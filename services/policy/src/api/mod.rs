//! Policy service HTTP API module.
//!
//! # Purpose
//! Route handler modules plus the shared error and payload types. Handlers
//! stay thin: they map HTTP shapes onto registry, resolver and bundle calls.
pub mod bindings;
pub mod bundles;
pub mod error;
pub mod openapi;
pub mod permissions;
pub mod policies;
pub mod roles;
pub mod system;
pub mod types;
