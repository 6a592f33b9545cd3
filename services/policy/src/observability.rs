//! Observability wiring for the policy service.
//!
//! # Purpose
//! Installs the tracing subscriber, the W3C trace-context propagator and the
//! Prometheus recorder, serves `/metrics`, and times every routed API call.
//!
//! # Notes
//! - Initialization is guarded by `OnceLock` so tests may call it repeatedly.
//! - Spans are exported over OTLP only when `OTEL_EXPORTER_OTLP_ENDPOINT` is
//!   set and the exporter builds; otherwise only the fmt layer is installed.
//! - Every metric the service emits is described in [`METRIC_CATALOGUE`].
use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::propagation::Extractor;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static SUBSCRIBER_INIT: OnceLock<()> = OnceLock::new();
static PROPAGATOR_INIT: OnceLock<()> = OnceLock::new();

/// Histogram of handler latency in milliseconds, labelled by `api`.
pub const API_LATENCY_METRIC: &str = "warden_api_response_time_ms";

const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Metric kind as registered with the recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name, kind and help text of every metric the service emits.
const METRIC_CATALOGUE: &[(&str, MetricKind, &str)] = &[
    (
        API_LATENCY_METRIC,
        MetricKind::Histogram,
        "HTTP handler latency in milliseconds by API",
    ),
    (
        "warden_store_timeouts_total",
        MetricKind::Counter,
        "Store operations abandoned after the configured timeout",
    ),
    (
        "warden_policy_changes_total",
        MetricKind::Counter,
        "Committed store changes by entity and operation",
    ),
    (
        "warden_roles_total",
        MetricKind::Gauge,
        "Roles currently stored",
    ),
    (
        "warden_bindings_total",
        MetricKind::Gauge,
        "Role bindings currently stored",
    ),
    (
        "warden_policy_definitions_total",
        MetricKind::Gauge,
        "Registered resource definitions",
    ),
    (
        "warden_resolver_cache_hits_total",
        MetricKind::Counter,
        "Permission resolutions answered from cache",
    ),
    (
        "warden_resolver_cache_misses_total",
        MetricKind::Counter,
        "Permission resolutions computed from a snapshot",
    ),
    (
        "warden_resolver_dangling_bindings_total",
        MetricKind::Counter,
        "Bindings skipped because their role is missing",
    ),
    (
        "warden_resolver_dropped_permissions_total",
        MetricKind::Counter,
        "Rule tuples dropped for naming unregistered resources or verbs",
    ),
    (
        "warden_bundle_compilations_total",
        MetricKind::Counter,
        "Bundle compilation runs by outcome",
    ),
    (
        "warden_bundle_version",
        MetricKind::Gauge,
        "Published version of each bundle target",
    ),
];

/// Install tracing, propagation and the metrics recorder. Safe to call more
/// than once; later calls only return the shared metrics handle.
pub fn init_observability(service_name: &str) -> PrometheusHandle {
    install_propagator();
    SUBSCRIBER_INIT.get_or_init(|| {
        let lookup = |key: &str| std::env::var(key).ok();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer());
        match otlp_tracer_provider(service_name, lookup) {
            Some(provider) => {
                let tracer = provider.tracer(service_name.to_string());
                global::set_tracer_provider(provider);
                let _ = registry
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init();
            }
            None => {
                let _ = registry.try_init();
            }
        }
    });
    install_metrics_recorder()
}

fn install_propagator() {
    PROPAGATOR_INIT.get_or_init(|| {
        global::set_text_map_propagator(TraceContextPropagator::new());
    });
}

fn otlp_tracer_provider<F>(service_name: &str, lookup: F) -> Option<SdkTracerProvider>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(OTLP_ENDPOINT_ENV).filter(|endpoint| !endpoint.trim().is_empty())?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            eprintln!("warden-policy: OTLP exporter disabled: {err}");
            return None;
        }
    };
    let resource = Resource::builder_empty()
        .with_attributes(resource_attributes(service_name, lookup))
        .build();
    Some(
        SdkTracerProvider::builder()
            .with_batch_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

/// Resource attributes for exported spans. `lookup` reads the process
/// environment in production.
fn resource_attributes<F>(service_name: &str, lookup: F) -> Vec<KeyValue>
where
    F: Fn(&str) -> Option<String>,
{
    let mut attrs = vec![KeyValue::new("service.name", service_name.to_string())];
    if let Some(instance) = lookup("WARDEN_SERVICE_INSTANCE_ID").or_else(|| lookup("HOSTNAME")) {
        attrs.push(KeyValue::new("service.instance.id", instance));
    }
    attrs.extend(
        [
            ("K8S_NAMESPACE_NAME", "k8s.namespace.name"),
            ("K8S_POD_NAME", "k8s.pod.name"),
            ("DEPLOYMENT_ENVIRONMENT", "deployment.environment"),
        ]
        .into_iter()
        .filter_map(|(env_key, attr_key)| lookup(env_key).map(|v| KeyValue::new(attr_key, v))),
    );
    attrs
}

/// Parent context carried by `traceparent`/`tracestate` request headers.
pub fn trace_context_from_headers(headers: &axum::http::HeaderMap) -> opentelemetry::Context {
    install_propagator();
    global::get_text_map_propagator(|prop| prop.extract(&HeaderExtractor(headers)))
}

struct HeaderExtractor<'a>(&'a axum::http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

/// API label for a request: method plus the matched route template, e.g.
/// `GET /roles/:name`. Unrouted requests share one label so path parameters
/// never leak into metric cardinality.
pub fn api_name(method: &axum::http::Method, matched: Option<&str>) -> String {
    format!("{method} {}", matched.unwrap_or("unmatched"))
}

/// Route middleware recording [`API_LATENCY_METRIC`]. It never alters the
/// response.
pub async fn track_api_latency(request: Request, next: Next) -> Response {
    let api = api_name(
        request.method(),
        request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str),
    );
    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!(API_LATENCY_METRIC, "api" => api).record(elapsed_ms);
    response
}

fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

/// Serve the Prometheus scrape endpoint until the task is aborted.
pub async fn serve_metrics(handle: PrometheusHandle, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "metrics listening");
    axum::serve(listener, metrics_router(handle).into_make_service()).await
}

fn install_metrics_recorder() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(err) => {
                    // Another recorder owns the global slot; render from a
                    // detached one so /metrics still answers.
                    tracing::warn!(error = %err, "metrics recorder already installed");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            };
            describe_metrics();
            handle
        })
        .clone()
}

fn describe_metrics() {
    for &(name, kind, help) in METRIC_CATALOGUE {
        match kind {
            MetricKind::Counter => metrics::describe_counter!(name, help),
            MetricKind::Gauge => metrics::describe_gauge!(name, help),
            MetricKind::Histogram => metrics::describe_histogram!(name, help),
        }
    }
}
