//! Warden policy service library crate.
//!
//! # Purpose
//! Exposes the policy API surface, registries, the cached permission
//! resolver, bundle compilation, configuration and storage for use by the
//! binary and tests.
//!
//! # Notes
//! Model types and pure resolution live in `warden-authz`; this crate adds
//! persistence, caching and HTTP.
pub mod api;
pub mod app;
pub mod bundle;
pub mod config;
pub mod error;
pub mod observability;
pub mod registry;
pub mod resolver;
pub mod store;
