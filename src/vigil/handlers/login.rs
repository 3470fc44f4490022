use crate::{
    defense::{now_ms, Attempt, DefenseError, Orchestrator, Verdict},
    vigil::{handlers::client_address, SharedVerifier},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    username: String,
    password: String,
    /// Answer to a pending challenge, when one was issued.
    captcha: Option<String>,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Credentials checked; body carries success true or false"),
        (status = 400, description = "Missing username, or a challenge is pending/was answered wrong"),
        (status = 423, description = "Account locked, temporarily or permanently"),
        (status = 429, description = "Rate limit active"),
    ),
    tag = "login",
)]
#[instrument(skip(orchestrator, verifier, payload, headers))]
pub async fn login(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(verifier): Extension<SharedVerifier>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_username();
    };

    let address = client_address(&headers, peer);
    debug!(%address, username = %request.username, "Login attempt");

    let attempt = Attempt {
        address: &address,
        account: &request.username,
        secret: &request.password,
        challenge_answer: request.captcha.as_deref(),
    };

    match orchestrator.handle_attempt(&attempt, verifier.as_ref(), now_ms()) {
        Err(DefenseError::MissingAccount) => missing_username(),
        Ok(verdict) => verdict_response(verdict),
    }
}

fn missing_username() -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "success": false,
            "message": "Username required",
            "type": "error",
        })),
    )
}

/// Maps a verdict to the conventional status code and wire payload.
fn verdict_response(verdict: Verdict) -> (StatusCode, Json<Value>) {
    match verdict {
        Verdict::CredentialsAccepted => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Login successful!",
                "type": "success",
            })),
        ),
        Verdict::CredentialsRejected { challenge } => {
            let mut body = json!({
                "success": false,
                "message": "Invalid credentials!",
                "type": "error",
            });
            if let Some(challenge) = challenge {
                body["captcha"] = Value::String(challenge);
            }
            (StatusCode::OK, Json(body))
        }
        Verdict::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": format!("Rate limit reached! Wait {retry_after_secs} seconds."),
                "type": "rate_limit",
                "remainingTime": retry_after_secs,
            })),
        ),
        Verdict::Locked { retry_after_secs } => (
            StatusCode::LOCKED,
            Json(json!({
                "success": false,
                "message": format!("Account locked! Wait {retry_after_secs} seconds."),
                "type": "account_locked",
                "remainingTime": retry_after_secs,
            })),
        ),
        Verdict::PermanentlyLocked => (
            StatusCode::LOCKED,
            Json(json!({
                "success": false,
                "message": "Account permanently locked! Too many failed attempts.",
                "type": "account_permanently_locked",
            })),
        ),
        Verdict::ChallengeRequired { challenge } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "CAPTCHA required!",
                "type": "captcha_required",
                "challenge": challenge,
            })),
        ),
        Verdict::ChallengeRejected { new_challenge } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "CAPTCHA wrong!",
                "type": "captcha_error",
                "newChallenge": new_challenge,
            })),
        ),
    }
}
