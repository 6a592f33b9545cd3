//! Warden policy HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, storage, the bundle compiler worker and the HTTP
//! routers, then serves until interrupted.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use warden_policy::app::{AppState, build_router};
use warden_policy::bundle::run_compiler;
use warden_policy::config::PolicyServiceConfig;
use warden_policy::observability;
use warden_policy::store::PolicyStore;
use warden_policy::store::memory::InMemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = PolicyServiceConfig::from_env_or_yaml().context("policy service config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: PolicyServiceConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("warden-policy");
    let (state, watermarks) = build_state(&config);
    tracing::info!(
        backend = state.store.backend_name(),
        durable = state.store.is_durable(),
        bundles = state.bundles.targets().len(),
        "policy store ready"
    );
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let (stop_compiler, compiler_stopped) = oneshot::channel::<()>();
    let compiler_task = tokio::spawn(run_compiler(
        state.bundles.clone(),
        watermarks,
        config.compiler_settings(),
        async move {
            let _ = compiler_stopped.await;
        },
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "policy service listening");
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    let _ = stop_compiler.send(());
    let _ = compiler_task.await;
    metrics_task.abort();
    let _ = metrics_task.await;
    tracing::info!("policy service stopped");
    Ok(())
}

fn build_state(config: &PolicyServiceConfig) -> (AppState, watch::Receiver<u64>) {
    let store: Arc<dyn PolicyStore> = Arc::new(InMemoryStore::new(config.store_config()));
    AppState::new(store, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use warden_policy::config::BundleTarget;

    fn local_config() -> PolicyServiceConfig {
        PolicyServiceConfig {
            bind_addr: "127.0.0.1:0".parse().expect("bind"),
            metrics_bind: "127.0.0.1:0".parse().expect("metrics"),
            bundle_debounce_ms: 10,
            bundles: vec![BundleTarget::scoped("proj1", "proj1")],
            ..PolicyServiceConfig::default()
        }
    }

    #[test]
    fn build_state_memory_backend() {
        let (state, watermarks) = build_state(&local_config());
        assert_eq!(state.store.backend_name(), "memory");
        assert!(!state.store.is_durable());
        let names: Vec<_> = state
            .bundles
            .targets()
            .iter()
            .map(|target| target.name.as_str())
            .collect();
        assert_eq!(names, vec!["authz", "proj1"]);
        assert_eq!(*watermarks.borrow(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn run_with_shutdown_starts_and_stops() {
        run_with_shutdown(local_config(), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        })
        .await
        .expect("run should stop cleanly");
    }
}
