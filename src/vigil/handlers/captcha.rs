use crate::{
    defense::{now_ms, Orchestrator},
    vigil::handlers::{client_address, status::AccountQuery},
};
use axum::{
    extract::{ConnectInfo, Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

/// Re-issue the pending challenge for the calling address and the given
/// account. Refused when no challenge is required.
#[utoipa::path(
    get,
    path = "/captcha",
    params (AccountQuery),
    responses (
        (status = 200, description = "Fresh challenge issued"),
        (status = 400, description = "Missing username or no challenge required"),
    ),
    tag = "captcha",
)]
#[instrument(skip(orchestrator, headers, query))]
pub async fn captcha(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<AccountQuery>,
) -> impl IntoResponse {
    let Some(username) = query.into_username() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "Username required", "type": "error"})),
        );
    };

    let address = client_address(&headers, peer);

    match orchestrator.regenerate_challenge(&address, &username, now_ms()) {
        Some(challenge) => (
            StatusCode::OK,
            Json(json!({"success": true, "captcha": challenge})),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "CAPTCHA not required"})),
        ),
    }
}
