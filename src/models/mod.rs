pub mod catalog;
pub mod link_suggestion;
pub mod order;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use catalog::{CatalogItem, Enrollment, EnrollmentStatus, UserIdentity};
pub use link_suggestion::{LinkSuggestion, SuggestionStatus};
pub use order::{
    BoardPush, FulfillmentSource, FulfillmentStatus, ItemStatus, LinkStatus, Order, OrderItem,
    OrderRuleViolation, OrderStatus, OrderSummary, PreSaleInfo, Submission, SubmissionLine,
    SyncState,
};

/// The caller on whose behalf a service operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub admin: bool,
}

impl Actor {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: false,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            admin: true,
        }
    }

    /// Whether the actor may act on an order owned by `owner`.
    pub fn can_access(&self, owner: Option<Uuid>) -> bool {
        self.admin || owner == Some(self.user_id)
    }
}
