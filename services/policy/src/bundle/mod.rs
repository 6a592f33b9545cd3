//! Bundle compilation and distribution.
//!
//! # Purpose
//! Compiles the store's policy state into one bundle per configured target
//! and keeps the latest bundle of each target ready for download.
//!
//! # Key invariants
//! - All targets of one compile are cut from the same store snapshot.
//! - A target whose content digest did not change keeps its bundle and
//!   version; otherwise the version is the previous one plus one.
//! - Versions never decrease, and a failed compile leaves the previous
//!   bundles servable.
use crate::config::BundleTarget;
use crate::error::{PolicyError, PolicyResult};
use crate::store::{PolicyStore, bounded};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{RwLock, watch};
use warden_authz::{AuthzResult, Bundle, BundleContent, DEFAULT_BUNDLE_NAME};

pub mod worker;

pub use worker::{CompilerSettings, run_compiler};

/// Write-watermark channel between the registries and the compile task.
///
/// Registries publish the store sequence of every committed write; the
/// watermark only moves forward.
#[derive(Clone)]
pub struct BundleTrigger {
    tx: Arc<watch::Sender<u64>>,
}

impl BundleTrigger {
    pub fn new() -> (Self, watch::Receiver<u64>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn notify(&self, watermark: u64) {
        self.tx.send_if_modified(|current| {
            if watermark > *current {
                *current = watermark;
                true
            } else {
                false
            }
        });
    }

    pub fn watermark(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// Outcome of one compile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Store watermark the snapshot reflected.
    pub watermark: u64,
    /// Names of targets that received a new version.
    pub published: Vec<String>,
}

pub struct BundleCompiler {
    store: Arc<dyn PolicyStore>,
    timeout: Duration,
    targets: Vec<BundleTarget>,
    bundles: RwLock<HashMap<String, Arc<Bundle>>>,
}

impl BundleCompiler {
    /// The global [`DEFAULT_BUNDLE_NAME`] target is always compiled, in
    /// addition to `targets`.
    pub fn new(store: Arc<dyn PolicyStore>, timeout: Duration, targets: &[BundleTarget]) -> Self {
        let mut all = vec![BundleTarget::global(DEFAULT_BUNDLE_NAME)];
        all.extend(
            targets
                .iter()
                .filter(|target| target.name != DEFAULT_BUNDLE_NAME)
                .cloned(),
        );
        Self {
            store,
            timeout,
            targets: all,
            bundles: RwLock::new(HashMap::new()),
        }
    }

    pub fn targets(&self) -> &[BundleTarget] {
        &self.targets
    }

    /// Compile every target from one snapshot. Either every changed target
    /// is published or, on error, none is.
    ///
    /// # Errors
    /// - `Unavailable` if the snapshot read times out.
    /// - `Unexpected` if a bundle cannot be encoded.
    pub async fn compile(&self) -> PolicyResult<CompileReport> {
        self.compile_with(|target, version, content, created_at_ms| {
            Bundle::new(target.name.clone(), version, content, created_at_ms)
        })
        .await
    }

    async fn compile_with<F>(&self, mut build: F) -> PolicyResult<CompileReport>
    where
        F: FnMut(&BundleTarget, u64, BundleContent, u64) -> AuthzResult<Bundle>,
    {
        let snapshot = bounded(self.timeout, "snapshot", self.store.snapshot()).await?;
        let created_at_ms = now_ms();
        let mut bundles = self.bundles.write().await;

        let mut staged = Vec::new();
        for target in &self.targets {
            let content = BundleContent::from_snapshot(&snapshot.policy, target.namespace.as_deref());
            let current = bundles.get(&target.name);
            let version = current.map_or(1, |bundle| bundle.version + 1);
            let candidate = build(target, version, content, created_at_ms)?;
            if current.is_some_and(|bundle| bundle.revision == candidate.revision) {
                continue;
            }
            staged.push(candidate);
        }

        let mut published = Vec::with_capacity(staged.len());
        for bundle in staged {
            tracing::info!(
                bundle = %bundle.name,
                version = bundle.version,
                revision = %bundle.revision,
                watermark = snapshot.next_seq,
                "published policy bundle"
            );
            metrics::gauge!("warden_bundle_version", "bundle" => bundle.name.clone())
                .set(bundle.version as f64);
            published.push(bundle.name.clone());
            bundles.insert(bundle.name.clone(), Arc::new(bundle));
        }
        metrics::counter!("warden_bundle_compilations_total", "outcome" => "ok").increment(1);
        Ok(CompileReport {
            watermark: snapshot.next_seq,
            published,
        })
    }

    /// Latest bundle of `name`.
    ///
    /// # Errors
    /// - `NotFound` for an unknown name or before the first compile.
    pub async fn download(&self, name: &str) -> PolicyResult<Arc<Bundle>> {
        self.bundles
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::NotFound(format!("bundle {name}")))
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}
