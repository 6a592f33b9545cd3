//! Policy service HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and assembles the shared
//! application state injected into handlers.
//!
//! # Notes
//! The registries, the resolver and the compiler all share one store handle.
//! The watermark receiver returned by [`AppState::new`] feeds the background
//! bundle worker.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::bundle::{BundleCompiler, BundleTrigger};
use crate::config::PolicyServiceConfig;
use crate::observability;
use crate::registry::{BindingRegistry, DefinitionRegistry, RegistryContext, RoleRegistry};
use crate::resolver::PermissionResolver;
use crate::store::PolicyStore;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PolicyStore>,
    pub roles: RoleRegistry,
    pub bindings: BindingRegistry,
    pub definitions: DefinitionRegistry,
    pub resolver: Arc<PermissionResolver>,
    pub bundles: Arc<BundleCompiler>,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        config: &PolicyServiceConfig,
    ) -> (Self, watch::Receiver<u64>) {
        let timeout = config.store_timeout();
        let resolver = Arc::new(PermissionResolver::new(
            store.clone(),
            timeout,
            config.resolver_cache_capacity,
        ));
        let (trigger, watermarks) = BundleTrigger::new();
        let ctx = RegistryContext {
            store: store.clone(),
            resolver: resolver.clone(),
            trigger,
            timeout,
        };
        let bundles = Arc::new(BundleCompiler::new(store.clone(), timeout, &config.bundles));
        let state = Self {
            store,
            roles: RoleRegistry::new(ctx.clone(), config.strict_rule_validation),
            bindings: BindingRegistry::new(ctx.clone()),
            definitions: DefinitionRegistry::new(ctx),
            resolver,
            bundles,
            timeout,
        };
        (state, watermarks)
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/healthz", get(api::system::healthz))
        .route("/changes", get(api::system::changes))
        .route(
            "/roles",
            get(api::roles::list_roles).post(api::roles::create_role),
        )
        .route("/roles/bulk-delete", post(api::roles::bulk_delete_roles))
        .route(
            "/roles/:name",
            get(api::roles::get_role)
                .put(api::roles::put_role)
                .patch(api::roles::patch_role)
                .delete(api::roles::delete_role),
        )
        .route(
            "/public-roles",
            get(api::roles::list_public_roles).post(api::roles::create_public_role),
        )
        .route(
            "/public-roles/bulk-delete",
            post(api::roles::bulk_delete_public_roles),
        )
        .route(
            "/public-roles/:name",
            get(api::roles::get_public_role)
                .put(api::roles::put_public_role)
                .patch(api::roles::patch_public_role)
                .delete(api::roles::delete_public_role),
        )
        .route(
            "/system-roles",
            get(api::roles::list_system_roles).post(api::roles::create_system_role),
        )
        .route(
            "/system-roles/bulk-delete",
            post(api::roles::bulk_delete_system_roles),
        )
        .route(
            "/system-roles/:name",
            get(api::roles::get_system_role)
                .put(api::roles::put_system_role)
                .delete(api::roles::delete_system_role),
        )
        .route(
            "/rolebindings",
            get(api::bindings::list_bindings).post(api::bindings::create_binding),
        )
        .route(
            "/rolebindings/bulk-delete",
            post(api::bindings::bulk_delete_bindings),
        )
        .route(
            "/rolebindings/:name",
            get(api::bindings::get_binding)
                .put(api::bindings::put_binding)
                .delete(api::bindings::delete_binding),
        )
        .route(
            "/system-rolebindings",
            get(api::bindings::list_system_bindings).post(api::bindings::create_system_binding),
        )
        .route(
            "/system-rolebindings/bulk-delete",
            post(api::bindings::bulk_delete_system_bindings),
        )
        .route(
            "/system-rolebindings/:name",
            get(api::bindings::get_system_binding)
                .put(api::bindings::put_system_binding)
                .delete(api::bindings::delete_system_binding),
        )
        .route("/userbindings", get(api::bindings::list_user_bindings))
        .route("/bundles/:name", get(api::bundles::download_bundle))
        .route(
            "/policies/:resource_name",
            axum::routing::put(api::policies::put_policy_definition),
        )
        .route(
            "/policy-definitions",
            get(api::policies::list_policy_definitions),
        )
        .route(
            "/policy-definitions/:resource_name",
            get(api::policies::get_policy_definition),
        )
        .route("/permission/:uid", get(api::permissions::get_permissions))
        .route(
            "/permission/:uid/check",
            get(api::permissions::check_permission),
        )
        .route("/openapi.json", get(openapi_json))
        .route_layer(axum::middleware::from_fn(observability::track_api_latency))
        .layer(trace_layer)
        .with_state(state)
}
