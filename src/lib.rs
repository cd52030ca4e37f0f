//! Textbook orders library
//!
//! Per-student textbook ordering against a grade-scoped catalog, mirrored to
//! an external order-tracking board.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::FromRef,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

use crate::auth::AuthService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    /// `None` when running on in-memory stores.
    pub db: Option<Arc<DatabaseConnection>>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    let orders = Router::new()
        .route("/orders", get(handlers::orders::list_my_orders))
        .route(
            "/students/:student_id/order",
            get(handlers::orders::get_student_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/summary", get(handlers::orders::get_order_summary))
        .route(
            "/orders/:id/items/:book_id",
            put(handlers::orders::select_item),
        )
        .route("/orders/:id/submit", post(handlers::orders::submit_order))
        .route(
            "/orders/:id/items/:book_id/reorder",
            post(handlers::orders::request_reorder),
        )
        .route(
            "/orders/:id/items/:book_id/reorder/approve",
            post(handlers::orders::approve_reorder),
        )
        .route(
            "/orders/:id/items/:book_id/reorder/reject",
            post(handlers::orders::reject_reorder),
        )
        .route(
            "/orders/:id/items/:book_id/max-quantity",
            put(handlers::orders::set_max_quantity),
        )
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route(
            "/orders/:id/submissions/:submission_id/retry",
            post(handlers::orders::retry_board_sync),
        );

    let board = Router::new()
        .route("/board/webhook", post(handlers::board::webhook))
        .route("/orders/:id/board/sync", post(handlers::board::sync_order))
        .route(
            "/orders/:id/board/updates",
            get(handlers::board::list_updates).post(handlers::board::post_update),
        );

    let presale = Router::new()
        .route("/presale/import", post(handlers::presale::import))
        .route("/presale/orders", get(handlers::presale::list_unlinked))
        .route("/presale/suggestions", get(handlers::presale::list_suggestions))
        .route(
            "/presale/students/:student_id/suggest",
            post(handlers::presale::suggest_for_student),
        )
        .route(
            "/presale/suggestions/:id/confirm",
            post(handlers::presale::confirm_suggestion),
        )
        .route(
            "/presale/suggestions/:id/reject",
            post(handlers::presale::reject_suggestion),
        )
        .route("/presale/orders/:id/link", post(handlers::presale::link_order))
        .route(
            "/presale/orders/:id/unlink",
            post(handlers::presale::unlink_order),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(orders)
        .merge(board)
        .merge(presale)
}

/// Full application router with the HTTP middleware stack.
pub fn app_router(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/", get(|| async { "textbook-orders up" }))
        .nest("/api/v1", api_v1_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
