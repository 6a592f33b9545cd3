use axum::body::Body;
use axum::http::Request;

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Register `resource` with `verbs` through the policy definition API.
pub fn definition_request(resource: &str, verbs: &[&str]) -> Request<Body> {
    let verbs: Vec<_> = verbs
        .iter()
        .map(|verb| serde_json::json!({ "action": verb }))
        .collect();
    json_request(
        "PUT",
        &format!("/policies/{resource}"),
        serde_json::json!({ "verbs": verbs }),
    )
}
