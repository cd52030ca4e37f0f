use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::board::BoardUpdate;
use crate::services::SyncReport;
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct PostUpdateRequest {
    #[validate(length(min = 1, max = 5000, message = "Message must be 1-5000 characters"))]
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct PostedUpdate {
    pub update_id: String,
}

/// Board webhook receiver. Always answers 200; problems are reported in the body.
pub async fn webhook(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable board webhook body");
            return (
                StatusCode::OK,
                Json(json!({ "processed": false, "reason": "malformed" })),
            );
        }
    };
    let result = state.services.board.handle_webhook(&payload).await;
    (StatusCode::OK, Json(result))
}

/// Admin drift repair: re-reads the order's subitems from the board.
pub async fn sync_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<SyncReport> {
    let report = state
        .services
        .board
        .sync_order_statuses(&auth_user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn list_updates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Vec<BoardUpdate>> {
    let updates = state
        .services
        .board
        .order_updates(&auth_user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(updates)))
}

pub async fn post_update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<PostUpdateRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    payload.validate()?;
    let update_id = state
        .services
        .board
        .post_order_update(&auth_user.actor(), id, &payload.body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(PostedUpdate { update_id })),
    ))
}
