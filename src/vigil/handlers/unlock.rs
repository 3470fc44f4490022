use crate::defense::Orchestrator;
use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UnlockRequest {
    username: String,
}

/// Administrative unlock. Clears every lock field for the account,
/// including a permanent lock.
#[utoipa::path(
    post,
    path = "/unlock",
    request_body = UnlockRequest,
    responses (
        (status = 200, description = "Account unlocked"),
        (status = 400, description = "Missing username"),
        (status = 404, description = "No record for the account"),
    ),
    tag = "unlock",
)]
#[instrument(skip(orchestrator, payload))]
pub async fn unlock(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    payload: Option<Json<UnlockRequest>>,
) -> impl IntoResponse {
    let username = match payload {
        Some(Json(request)) if !request.username.trim().is_empty() => request.username,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "message": "Username required"})),
            );
        }
    };

    if orchestrator.unlock(&username) {
        info!(%username, "Account unlocked by administrator");
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": format!("Account {username} unlocked"),
            })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "message": "Account not found"})),
        )
    }
}
