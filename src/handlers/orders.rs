use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::models::{Order, OrderSummary};
use crate::services::orders::{
    ApproveReorderRequest, CancelOrderRequest, RejectReorderRequest, ReorderRequest,
    SelectItemRequest, SetMaxQuantityRequest, SubmitOrderRequest,
};
use crate::services::BoardSyncStatus;
use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, ApiResult, AppState};

/// Opens (or creates) the student's order for the current school year.
pub async fn get_student_order(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .get_or_create(&auth_user.actor(), student_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Orders owned by the caller.
pub async fn list_my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<OrderSummary>> {
    let orders = state
        .services
        .orders
        .orders_for_user(&auth_user.actor(), auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Order> {
    let order = state.services.orders.get_order(&auth_user.actor(), id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn get_order_summary(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<OrderSummary> {
    let summary = state.services.orders.summary(&auth_user.actor(), id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn select_item(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    Json(payload): Json<SelectItemRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .select(&auth_user.actor(), id, book_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Commits the pending selections. A board failure still answers 201 with
/// the failure in `board`.
pub async fn submit_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    payload: Option<Json<SubmitOrderRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let outcome = state
        .services
        .orders
        .submit(&auth_user.actor(), id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(outcome))))
}

pub async fn request_reorder(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    Json(payload): Json<ReorderRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .request_reorder(&auth_user.actor(), id, book_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn approve_reorder(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    Json(payload): Json<ApproveReorderRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .approve_reorder(&auth_user.actor(), id, book_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn reject_reorder(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    payload: Option<Json<RejectReorderRequest>>,
) -> ApiResult<Order> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let order = state
        .services
        .orders
        .reject_reorder(&auth_user.actor(), id, book_id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn set_max_quantity(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
    Json(payload): Json<SetMaxQuantityRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .orders
        .set_max_quantity(&auth_user.actor(), id, book_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    payload: Option<Json<CancelOrderRequest>>,
) -> ApiResult<Order> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let order = state
        .services
        .orders
        .cancel_order(&auth_user.actor(), id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn retry_board_sync(
    State(state): State<AppState>,
    Path((id, submission_id)): Path<(Uuid, Uuid)>,
    auth_user: AuthUser,
) -> ApiResult<BoardSyncStatus> {
    let status = state
        .services
        .orders
        .retry_board_sync(&auth_user.actor(), id, submission_id)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}
