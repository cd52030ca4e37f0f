use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
};
use tracing::{error, info, warn};

use textbook_orders as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::handlers::health::init_start_time();

    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let board_client: Option<Arc<dyn api::board::BoardClient>> = if cfg.board.enabled {
        let client = api::board::MondayClient::new(&cfg.board)
            .context("failed to build the board client")?;
        info!(board_id = %cfg.board.orders_board_id, "board integration enabled");
        Some(Arc::new(client))
    } else {
        warn!("board integration disabled; submissions stay local");
        None
    };

    let school_year = cfg.current_school_year();
    let services = api::handlers::AppServices::new(
        api::handlers::Stores::sea_orm(db_arc.clone()),
        board_client,
        cfg.board.clone(),
        school_year,
    );

    let app_state = api::AppState {
        db: Some(db_arc),
        config: cfg.clone(),
        services,
        auth: Arc::new(api::auth::AuthService::new(&cfg.jwt_secret)),
    };

    let mut app = api::app_router(app_state).layer(CompressionLayer::new());
    if cfg.is_development() {
        info!("Using permissive CORS in development");
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, school_year, "textbook-orders listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
