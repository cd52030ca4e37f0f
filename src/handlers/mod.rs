pub mod board;
pub mod health;
pub mod orders;
pub mod presale;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::board::BoardClient;
use crate::config::BoardConfig;
use crate::repositories::{
    CatalogSource, EnrollmentDirectory, OrderStore, SeaOrmCatalog, SeaOrmEnrollments,
    SeaOrmOrderStore, SeaOrmSuggestionStore, SeaOrmUsers, SuggestionStore, UserDirectory,
};
use crate::services::{BoardSyncService, CatalogResolver, OrderService, PreSaleService};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Storage and directory backends the services run on.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub suggestions: Arc<dyn SuggestionStore>,
    pub catalog: Arc<dyn CatalogSource>,
    pub enrollments: Arc<dyn EnrollmentDirectory>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    pub fn sea_orm(db: Arc<DatabaseConnection>) -> Self {
        Self {
            orders: Arc::new(SeaOrmOrderStore::new(db.clone())),
            suggestions: Arc::new(SeaOrmSuggestionStore::new(db.clone())),
            catalog: Arc::new(SeaOrmCatalog::new(db.clone())),
            enrollments: Arc::new(SeaOrmEnrollments::new(db.clone())),
            users: Arc::new(SeaOrmUsers::new(db)),
        }
    }
}

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub board: Arc<BoardSyncService>,
    pub presale: Arc<PreSaleService>,
}

impl AppServices {
    /// Wires the services together. `board_client` is ignored when the board is disabled.
    pub fn new(
        stores: Stores,
        board_client: Option<Arc<dyn BoardClient>>,
        board_config: BoardConfig,
        school_year: i32,
    ) -> Self {
        let catalog = CatalogResolver::new(stores.catalog.clone());
        let board = Arc::new(BoardSyncService::new(
            board_client.clone(),
            board_config.clone(),
            stores.orders.clone(),
            stores.users.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            stores.orders.clone(),
            catalog.clone(),
            stores.enrollments.clone(),
            Some(board.clone()),
            school_year,
        ));
        let presale = Arc::new(PreSaleService::new(
            board_client,
            board_config,
            stores.orders,
            stores.suggestions,
            catalog,
            stores.enrollments,
            school_year,
        ));

        Self {
            orders,
            board,
            presale,
        }
    }
}
