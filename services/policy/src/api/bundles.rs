//! Bundle distribution endpoint.
//!
//! Serves the latest compiled bundle of a target. The revision digest doubles
//! as the entity tag so enforcement points can poll with `If-None-Match`.
use crate::api::error::ApiError;
use crate::app::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use warden_authz::Bundle;

pub const BUNDLE_VERSION_HEADER: HeaderName = HeaderName::from_static("x-bundle-version");

/// Whether an `If-None-Match` value names `revision`. Accepts lists, weak
/// tags and `*`.
fn not_modified(headers: &HeaderMap, revision: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
        .any(|tag| tag == "*" || tag == revision)
}

#[utoipa::path(
    get,
    path = "/bundles/{name}",
    tag = "bundles",
    params(("name" = String, Path, description = "Bundle target name")),
    responses(
        (status = 200, description = "Latest bundle", body = Bundle),
        (status = 304, description = "Bundle unchanged since the given ETag"),
        (status = 404, description = "Unknown bundle or nothing compiled yet", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn download_bundle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let bundle = state.bundles.download(&name).await?;
    let tag_headers = [
        (header::ETAG, format!("\"{}\"", bundle.revision)),
        (BUNDLE_VERSION_HEADER, bundle.version.to_string()),
    ];
    if not_modified(&headers, &bundle.revision) {
        return Ok((StatusCode::NOT_MODIFIED, tag_headers).into_response());
    }
    Ok((tag_headers, Json(bundle.as_ref())).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_tag(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn if_none_match_forms() {
        assert!(not_modified(&with_tag("\"abc\""), "abc"));
        assert!(not_modified(&with_tag("W/\"abc\""), "abc"));
        assert!(not_modified(&with_tag("\"old\", \"abc\""), "abc"));
        assert!(not_modified(&with_tag("*"), "abc"));
        assert!(!not_modified(&with_tag("\"old\""), "abc"));
        assert!(!not_modified(&HeaderMap::new(), "abc"));
    }
}
