use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::ServiceError;
use crate::models::{
    Actor, CatalogItem, EnrollmentStatus, Order, OrderRuleViolation, OrderStatus, OrderSummary, Submission,
};
use crate::repositories::{update_with_retry, EnrollmentDirectory, OrderStore};
use crate::services::board_sync::{BoardSyncService, BoardSyncStatus};
use crate::services::catalog::CatalogResolver;

/// Retries for background refreshes that race with user edits.
const REFRESH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SelectItemRequest {
    #[validate(range(max = 100, message = "Quantity is too large"))]
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct SubmitOrderRequest {
    #[validate(length(max = 2000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReorderRequest {
    #[validate(length(min = 1, max = 500, message = "A reason is required"))]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApproveReorderRequest {
    #[validate(range(min = 1, max = 100, message = "New maximum must be between 1 and 100"))]
    pub new_max_quantity: u32,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct RejectReorderRequest {
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetMaxQuantityRequest {
    #[validate(range(min = 1, max = 100, message = "Maximum must be between 1 and 100"))]
    pub max_quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Result of committing a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub order: Order,
    pub submission: Submission,
    pub board: BoardSyncStatus,
}

/// Per-student order lifecycle: seeding, selection, submission and reorders.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    catalog: CatalogResolver,
    enrollments: Arc<dyn EnrollmentDirectory>,
    board: Option<Arc<BoardSyncService>>,
    school_year: i32,
}

fn require_admin(actor: &Actor, action: &str) -> Result<(), ServiceError> {
    if actor.admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Only administrators can {}",
            action
        )))
    }
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        catalog: CatalogResolver,
        enrollments: Arc<dyn EnrollmentDirectory>,
        board: Option<Arc<BoardSyncService>>,
        school_year: i32,
    ) -> Self {
        Self {
            orders,
            catalog,
            enrollments,
            board,
            school_year,
        }
    }

    pub fn school_year(&self) -> i32 {
        self.school_year
    }

    fn board_enabled(&self) -> bool {
        self.board.as_ref().is_some_and(|board| board.enabled())
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn load_for(&self, actor: &Actor, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self.load(order_id).await?;
        if !actor.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(format!(
                "Order {} belongs to another user",
                order_id
            )));
        }
        Ok(order)
    }

    /// Applies one rule-checked change and writes it with the version read.
    async fn mutate<F>(&self, actor: &Actor, order_id: Uuid, change: F) -> Result<Order, ServiceError>
    where
        F: FnOnce(&mut Order) -> Result<(), OrderRuleViolation>,
    {
        let mut order = self.load_for(actor, order_id).await?;
        change(&mut order)?;
        self.orders.update(&order).await
    }

    /// The student's order for the current year, created from the grade catalog
    /// when missing and refreshed against it otherwise.
    #[instrument(skip(self, actor), fields(student_id = %student_id, user_id = %actor.user_id))]
    pub async fn get_or_create(&self, actor: &Actor, student_id: Uuid) -> Result<Order, ServiceError> {
        let enrollment = self
            .enrollments
            .enrollment(student_id, self.school_year)
            .await?
            .filter(|e| e.status == EnrollmentStatus::Approved)
            .ok_or_else(|| {
                OrderRuleViolation::NoEnrollment(format!(
                    "Student {} has no approved enrollment for {}",
                    student_id, self.school_year
                ))
            })?;
        if !actor.can_access(Some(enrollment.user_id)) {
            return Err(ServiceError::Forbidden(format!(
                "Student {} belongs to another user",
                student_id
            )));
        }

        let books = self.catalog.resolve(&enrollment.grade).await?;

        if let Some(existing) = self
            .orders
            .find_by_student_year(student_id, self.school_year)
            .await?
            .filter(|o| o.status != OrderStatus::Cancelled)
        {
            return self.refresh(existing.id, &books).await;
        }

        let draft = Order::new_draft(
            enrollment.user_id,
            student_id,
            enrollment.student_name.clone(),
            enrollment.grade.clone(),
            self.school_year,
            &books,
            Utc::now(),
        );
        match self.orders.insert(&draft).await {
            Ok(order) => {
                info!(order_id = %order.id, items = order.items.len(), "created draft order");
                Ok(order)
            }
            Err(ServiceError::Conflict(_)) => {
                // Lost a creation race; use the winner.
                let existing = self
                    .orders
                    .find_by_student_year(student_id, self.school_year)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError("Order vanished after conflict".to_string())
                    })?;
                self.refresh(existing.id, &books).await
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(
        &self,
        order_id: Uuid,
        books: &[CatalogItem],
    ) -> Result<Order, ServiceError> {
        let (order, changed) =
            update_with_retry(self.orders.as_ref(), order_id, REFRESH_ATTEMPTS, |o| {
                Ok(o.refresh_from_catalog(books, Utc::now()))
            })
            .await?;
        if changed {
            info!(order_id = %order.id, "absorbed catalog changes");
        }
        Ok(order)
    }

    pub async fn get_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, ServiceError> {
        self.load_for(actor, order_id).await
    }

    pub async fn summary(&self, actor: &Actor, order_id: Uuid) -> Result<OrderSummary, ServiceError> {
        let order = self.load_for(actor, order_id).await?;
        Ok(OrderSummary::from(&order))
    }

    pub async fn orders_for_user(
        &self,
        actor: &Actor,
        user_id: Uuid,
    ) -> Result<Vec<OrderSummary>, ServiceError> {
        if !actor.can_access(Some(user_id)) {
            return Err(ServiceError::Forbidden(
                "Cannot list another user's orders".to_string(),
            ));
        }
        let orders = self.orders.find_by_user(user_id).await?;
        Ok(orders.iter().map(OrderSummary::from).collect())
    }

    /// Read model for neighbouring modules; defaults to the current year.
    pub async fn student_order(
        &self,
        student_id: Uuid,
        school_year: Option<i32>,
    ) -> Result<Option<OrderSummary>, ServiceError> {
        let order = self
            .orders
            .find_by_student_year(student_id, school_year.unwrap_or(self.school_year))
            .await?;
        Ok(order.as_ref().map(OrderSummary::from))
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id, book_id = %book_id))]
    pub async fn select(
        &self,
        actor: &Actor,
        order_id: Uuid,
        book_id: Uuid,
        request: SelectItemRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;
        self.mutate(actor, order_id, |o| {
            o.select(book_id, request.quantity, Utc::now())
        })
        .await
    }

    /// Commits pending selections, then pushes the new batch to the board.
    /// The board outcome never undoes the commit.
    #[instrument(skip(self, actor, request), fields(order_id = %order_id))]
    pub async fn submit(
        &self,
        actor: &Actor,
        order_id: Uuid,
        request: SubmitOrderRequest,
    ) -> Result<SubmissionOutcome, ServiceError> {
        request.validate()?;
        let mut order = self.load_for(actor, order_id).await?;
        let submission = order.submit(
            Some(actor.user_id),
            request.notes,
            self.board_enabled(),
            Utc::now(),
        )?;
        let order = self.orders.update(&order).await?;
        info!(
            submission_id = %submission.id,
            lines = submission.lines.len(),
            subtotal = %submission.subtotal,
            "committed submission"
        );

        let board = match &self.board {
            Some(board) if board.enabled() => board.push_submission(&order, submission.id).await,
            _ => BoardSyncStatus::LocalOnly,
        };
        if let BoardSyncStatus::Failed { reason } = &board {
            warn!(submission_id = %submission.id, %reason, "board push failed, order kept");
        }

        let order = match self.orders.get(order_id).await? {
            Some(latest) => latest,
            None => order,
        };
        let submission = order
            .submissions
            .iter()
            .find(|s| s.id == submission.id)
            .cloned()
            .unwrap_or(submission);

        Ok(SubmissionOutcome {
            order,
            submission,
            board,
        })
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id, book_id = %book_id))]
    pub async fn request_reorder(
        &self,
        actor: &Actor,
        order_id: Uuid,
        book_id: Uuid,
        request: ReorderRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;
        self.mutate(actor, order_id, |o| {
            o.request_reorder(book_id, request.reason, Utc::now())
        })
        .await
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id, book_id = %book_id))]
    pub async fn approve_reorder(
        &self,
        actor: &Actor,
        order_id: Uuid,
        book_id: Uuid,
        request: ApproveReorderRequest,
    ) -> Result<Order, ServiceError> {
        require_admin(actor, "approve reorders")?;
        request.validate()?;
        self.mutate(actor, order_id, |o| {
            o.approve_reorder(book_id, request.new_max_quantity, request.notes, Utc::now())
        })
        .await
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id, book_id = %book_id))]
    pub async fn reject_reorder(
        &self,
        actor: &Actor,
        order_id: Uuid,
        book_id: Uuid,
        request: RejectReorderRequest,
    ) -> Result<Order, ServiceError> {
        require_admin(actor, "reject reorders")?;
        request.validate()?;
        self.mutate(actor, order_id, |o| {
            o.reject_reorder(book_id, request.notes, Utc::now())
        })
        .await
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id, book_id = %book_id))]
    pub async fn set_max_quantity(
        &self,
        actor: &Actor,
        order_id: Uuid,
        book_id: Uuid,
        request: SetMaxQuantityRequest,
    ) -> Result<Order, ServiceError> {
        require_admin(actor, "change quantity limits")?;
        request.validate()?;
        self.mutate(actor, order_id, |o| {
            o.set_max_quantity(book_id, request.max_quantity, Utc::now())
        })
        .await
    }

    #[instrument(skip(self, actor, request), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        request: CancelOrderRequest,
    ) -> Result<Order, ServiceError> {
        request.validate()?;
        let order = self
            .mutate(actor, order_id, |o| o.cancel(request.reason, Utc::now()))
            .await?;
        info!(order_id = %order.id, "order cancelled");
        Ok(order)
    }

    /// Replays the board push of a submission that failed or never ran.
    #[instrument(skip(self, actor), fields(order_id = %order_id, submission_id = %submission_id))]
    pub async fn retry_board_sync(
        &self,
        actor: &Actor,
        order_id: Uuid,
        submission_id: Uuid,
    ) -> Result<BoardSyncStatus, ServiceError> {
        require_admin(actor, "retry board sync")?;
        let board = self
            .board
            .as_ref()
            .filter(|board| board.enabled())
            .ok_or_else(|| {
                ServiceError::InvalidOperation("Board integration is disabled".to_string())
            })?;

        let order = self.load(order_id).await?;
        order.ensure_open()?;
        let submission = order
            .submissions
            .iter()
            .find(|s| s.id == submission_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Submission {} not found", submission_id))
            })?;

        if !BoardSyncService::needs_push(&order, submission_id) {
            return Ok(BoardSyncStatus::Synced {
                board_item_id: submission.board_item_id.clone().unwrap_or_default(),
                subitems_created: 0,
                subitems_failed: 0,
            });
        }
        Ok(board.push_submission(&order, submission_id).await)
    }
}
