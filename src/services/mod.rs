// Order lifecycle
pub mod catalog;
pub mod orders;

// Board integration
pub mod board_sync;
pub mod inventory_board;

// Pre-sale import and student linking
pub mod name_match;
pub mod presale;

pub use board_sync::{BoardSyncService, BoardSyncStatus, SyncReport};
pub use catalog::CatalogResolver;
pub use inventory_board::InventoryBoardService;
pub use orders::{OrderService, SubmissionOutcome};
pub use presale::{ImportReport, PreSaleService};
