//! Background compile loop.
//!
//! Waits for the write watermark to move past the last compiled one, lets it
//! settle for the debounce interval, then compiles. Failures back off
//! exponentially up to `retry_max`. The loop exits when shutdown resolves or
//! every [`super::BundleTrigger`] has been dropped.
use super::BundleCompiler;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy)]
pub struct CompilerSettings {
    pub debounce: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
}

pub async fn run_compiler<F>(
    compiler: Arc<BundleCompiler>,
    mut watermarks: watch::Receiver<u64>,
    settings: CompilerSettings,
    shutdown: F,
) where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);
    let mut compiled: Option<u64> = None;
    let mut closed = false;
    loop {
        let requested = *watermarks.borrow_and_update();
        if compiled.is_some_and(|done| done >= requested) {
            if closed {
                return;
            }
            tokio::select! {
                _ = &mut shutdown => return,
                changed = watermarks.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }
        }

        // The first compile runs immediately so bundles exist at startup.
        if compiled.is_some() && !closed {
            loop {
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(settings.debounce) => break,
                    changed = watermarks.changed() => {
                        if changed.is_err() {
                            closed = true;
                            break;
                        }
                    }
                }
            }
        }

        let mut backoff = settings.retry_initial;
        loop {
            match compiler.compile().await {
                Ok(report) => {
                    tracing::debug!(
                        watermark = report.watermark,
                        published = report.published.len(),
                        "bundle compile finished"
                    );
                    compiled = Some(report.watermark.max(requested));
                    break;
                }
                Err(err) => {
                    metrics::counter!("warden_bundle_compilations_total", "outcome" => "error")
                        .increment(1);
                    tracing::warn!(
                        error = %err,
                        retry_ms = backoff.as_millis() as u64,
                        "bundle compile failed"
                    );
                    tokio::select! {
                        _ = &mut shutdown => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(settings.retry_max);
                }
            }
        }
    }
}
