use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{LinkSuggestion, Order};
use crate::services::ImportReport;
use crate::{auth::AuthUser, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct LinkOrderRequest {
    pub student_id: Uuid,
}

pub async fn import(State(state): State<AppState>, auth_user: AuthUser) -> ApiResult<ImportReport> {
    let report = state.services.presale.import(&auth_user.actor()).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn list_unlinked(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<Order>> {
    let orders = state
        .services
        .presale
        .list_unlinked_orders(&auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

pub async fn list_suggestions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> ApiResult<Vec<LinkSuggestion>> {
    let suggestions = state
        .services
        .presale
        .list_pending_suggestions(&auth_user.actor())
        .await?;
    Ok(Json(ApiResponse::success(suggestions)))
}

/// `data` is null when no single order is a convincing match.
pub async fn suggest_for_student(
    State(state): State<AppState>,
    Path(student_id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Option<LinkSuggestion>> {
    let suggestion = state
        .services
        .presale
        .suggest_for_student(&auth_user.actor(), student_id)
        .await?;
    Ok(Json(ApiResponse::success(suggestion)))
}

pub async fn confirm_suggestion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Order> {
    let order = state
        .services
        .presale
        .confirm_suggestion(&auth_user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn reject_suggestion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<LinkSuggestion> {
    let suggestion = state
        .services
        .presale
        .reject_suggestion(&auth_user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(suggestion)))
}

pub async fn link_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<LinkOrderRequest>,
) -> ApiResult<Order> {
    let order = state
        .services
        .presale
        .link_order(&auth_user.actor(), id, payload.student_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn unlink_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> ApiResult<Order> {
    let order = state
        .services
        .presale
        .unlink_order(&auth_user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
