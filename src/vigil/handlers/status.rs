use crate::{
    defense::{now_ms, remaining_secs, store::PERMANENT, Orchestrator},
    vigil::handlers::client_address,
};
use axum::{
    extract::{ConnectInfo, Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;
use utoipa::IntoParams;

#[derive(IntoParams, Debug, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct AccountQuery {
    username: Option<String>,
}

impl AccountQuery {
    pub(crate) fn into_username(self) -> Option<String> {
        self.username.filter(|name| !name.trim().is_empty())
    }
}

/// Read-only projection of the rate-limit state for the calling address.
#[utoipa::path(
    get,
    path = "/status/rate-limit",
    responses ((status = 200, description = "Attempts and remaining delay for this address")),
    tag = "status",
)]
#[instrument(skip(orchestrator, headers))]
pub async fn rate_limit_status(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let address = client_address(&headers, peer);
    let now = now_ms();

    let Some(state) = orchestrator.rate_state(&address) else {
        return Json(json!({
            "attempts": 0,
            "nextDelay": 0,
            "status": "clean",
        }));
    };

    let remaining = remaining_secs(state.next_allowed_at, now);
    Json(json!({
        "attempts": state.failed_attempts,
        "nextDelay": remaining,
        "status": if remaining > 0 { "blocked" } else { "allowed" },
    }))
}

/// Read-only projection of the lockout state for one account.
#[utoipa::path(
    get,
    path = "/status/account/{username}",
    params (("username" = String, Path, description = "Account name")),
    responses ((status = 200, description = "Lock state, failed attempts, remaining seconds")),
    tag = "status",
)]
#[instrument(skip(orchestrator))]
pub async fn account_status(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(username): Path<String>,
) -> impl IntoResponse {
    let now = now_ms();

    let Some(state) = orchestrator.account_state(&username) else {
        return Json(json!({
            "username": username,
            "status": "clean",
            "failedAttempts": 0,
            "lockoutCount": 0,
            "remainingTime": 0,
        }));
    };

    let status = if state.permanently_locked {
        "permanently_locked"
    } else if state.locked(now) {
        "locked"
    } else {
        "unlocked"
    };
    let remaining = if state.permanently_locked || state.lockout_until == PERMANENT {
        Value::Null
    } else {
        json!(remaining_secs(state.lockout_until, now))
    };

    Json(json!({
        "username": username,
        "status": status,
        "failedAttempts": state.failed_attempts,
        "lockoutCount": state.lockout_count,
        "remainingTime": remaining,
    }))
}

/// Combined challenge + lockout projection for the calling address and
/// the queried account. Never mutates state.
#[utoipa::path(
    get,
    path = "/status/defense",
    params (AccountQuery),
    responses (
        (status = 200, description = "Challenge and lockout state for the pair"),
        (status = 400, description = "Missing username"),
    ),
    tag = "status",
)]
#[instrument(skip(orchestrator, headers, query))]
pub async fn defense_status(
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
    let now = now_ms();

    let challenge_required = orchestrator
        .challenge_state(&address, &username)
        .is_some_and(|state| state.challenge_required);

    let lockout = orchestrator.account_state(&username).map_or_else(
        || json!({"status": "unlocked", "remainingTime": 0}),
        |state| {
            if state.permanently_locked {
                json!({"status": "permanently_locked", "remainingTime": Value::Null})
            } else if state.locked(now) {
                json!({
                    "status": "locked",
                    "remainingTime": remaining_secs(state.lockout_until, now),
                })
            } else {
                json!({"status": "unlocked", "remainingTime": 0})
            }
        },
    );

    (
        StatusCode::OK,
        Json(json!({
            "captcha": {"required": challenge_required},
            "lockout": lockout,
        })),
    )
}
