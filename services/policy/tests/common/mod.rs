use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;
use tower::ServiceExt;
use warden_policy::app::{AppState, build_router};
use warden_policy::config::PolicyServiceConfig;
use warden_policy::store::memory::InMemoryStore;

pub type App = axum::routing::RouterIntoService<Body, ()>;

pub fn app_with_config(config: PolicyServiceConfig) -> (App, AppState) {
    let store = Arc::new(InMemoryStore::new(config.store_config()));
    let (state, _watermarks) = AppState::new(store, &config);
    (build_router(state.clone()).into_service(), state)
}

pub fn app() -> (App, AppState) {
    app_with_config(PolicyServiceConfig::default())
}

pub async fn send(app: &App, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("response")
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
