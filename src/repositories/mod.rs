use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CatalogItem, Enrollment, LinkSuggestion, Order, UserIdentity};

pub mod directory;
pub mod memory;
pub mod order_repository;
pub mod suggestion_repository;

pub use directory::{SeaOrmCatalog, SeaOrmEnrollments, SeaOrmUsers};
pub use memory::{
    InMemoryCatalog, InMemoryEnrollments, InMemoryOrderStore, InMemorySuggestionStore,
    InMemoryUsers,
};
pub use order_repository::SeaOrmOrderStore;
pub use suggestion_repository::SeaOrmSuggestionStore;

/// Persistence for order documents.
///
/// `update` is a compare-and-swap on `order.version`: it fails with
/// `ConcurrentModification` when the stored version moved on, and returns the
/// order with its version bumped otherwise.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<Order, ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    async fn update(&self, order: &Order) -> Result<Order, ServiceError>;

    /// The live order of a student for a year, falling back to a cancelled one.
    async fn find_by_student_year(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Order>, ServiceError>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError>;

    /// The order holding a line linked to `subitem_id`.
    async fn find_by_subitem(&self, subitem_id: &str) -> Result<Option<Order>, ServiceError>;

    /// The pre-sale order imported from `board_item_id`.
    async fn find_by_source_item(&self, board_item_id: &str)
        -> Result<Option<Order>, ServiceError>;

    async fn list_unlinked(&self) -> Result<Vec<Order>, ServiceError>;
}

#[async_trait]
pub trait SuggestionStore: Send + Sync {
    async fn insert(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<LinkSuggestion>, ServiceError>;

    async fn update(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError>;

    async fn find_for_pair(
        &self,
        order_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<LinkSuggestion>, ServiceError>;

    async fn pending_for_order(&self, order_id: Uuid) -> Result<Vec<LinkSuggestion>, ServiceError>;

    async fn list_pending(&self) -> Result<Vec<LinkSuggestion>, ServiceError>;
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Active books flagged for the restricted (per-grade) catalog.
    async fn restricted_books(&self) -> Result<Vec<CatalogItem>, ServiceError>;

    /// Every active book, restricted or not.
    async fn active_books(&self) -> Result<Vec<CatalogItem>, ServiceError>;
}

#[async_trait]
pub trait EnrollmentDirectory: Send + Sync {
    async fn enrollment(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Enrollment>, ServiceError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn identity(&self, user_id: Uuid) -> Result<Option<UserIdentity>, ServiceError>;
}

/// Re-reads and reapplies `apply` until the write lands or `attempts` run out.
///
/// `apply` returns whether it changed the order; unchanged orders are not
/// written. Returns the final order and that flag.
pub async fn update_with_retry<F>(
    store: &dyn OrderStore,
    id: Uuid,
    attempts: u32,
    mut apply: F,
) -> Result<(Order, bool), ServiceError>
where
    F: FnMut(&mut Order) -> Result<bool, ServiceError> + Send,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut order = store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))?;

        if !apply(&mut order)? {
            return Ok((order, false));
        }

        match store.update(&order).await {
            Ok(saved) => return Ok((saved, true)),
            Err(ServiceError::ConcurrentModification(_)) if attempt < attempts => {
                warn!(order_id = %id, attempt, "order changed underneath, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}
