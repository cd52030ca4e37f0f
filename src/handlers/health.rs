use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Instant;

use crate::handlers::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Disabled,
}

/// Individual component health details
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub board: ComponentHealth,
}

/// Full health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub school_year: i32,
    pub details: HealthDetails,
}

/// Tracks application start time for uptime calculation
static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Initialize the start time (call this on application startup)
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn get_uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

/// Liveness plus a database ping. The board is reported, never called.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => {
            let started = Instant::now();
            let result = crate::db::check_connection(db).await;
            let latency_ms = Some(started.elapsed().as_millis() as u64);
            match result {
                Ok(()) => ComponentHealth {
                    status: ComponentStatus::Up,
                    message: "Connection successful".to_string(),
                    latency_ms,
                },
                Err(e) => ComponentHealth {
                    status: ComponentStatus::Down,
                    message: format!("Connection failed: {}", e),
                    latency_ms,
                },
            }
        }
        None => ComponentHealth {
            status: ComponentStatus::Disabled,
            message: "In-memory storage".to_string(),
            latency_ms: None,
        },
    };

    let board = if state.services.board.enabled() {
        ComponentHealth {
            status: ComponentStatus::Up,
            message: "Board integration enabled".to_string(),
            latency_ms: None,
        }
    } else {
        ComponentHealth {
            status: ComponentStatus::Disabled,
            message: "Board integration disabled".to_string(),
            latency_ms: None,
        }
    };

    let status = if database.status == ComponentStatus::Down {
        ComponentStatus::Down
    } else {
        ComponentStatus::Up
    };
    let status_code = match status {
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: get_uptime_secs(),
        school_year: state.services.orders.school_year(),
        details: HealthDetails { database, board },
    };

    (status_code, Json(response))
}
