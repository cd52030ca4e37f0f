use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::catalog::CatalogItem;

/// Selection state of a single book line inside an order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    OutOfStock,
    Ordered,
    ReorderRequested,
    ReorderApproved,
}

impl ItemStatus {
    /// Statuses in which the buyer may change the selected quantity.
    pub fn is_selectable(self) -> bool {
        matches!(self, ItemStatus::Available | ItemStatus::ReorderApproved)
    }

    /// Statuses allowed to carry committed units.
    pub fn holds_committed_units(self) -> bool {
        matches!(
            self,
            ItemStatus::Ordered | ItemStatus::ReorderRequested | ItemStatus::ReorderApproved
        )
    }
}

/// Overall order status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Submitted,
    AwaitingLink,
    Cancelled,
}

/// Link state of an order imported from the board before a student existed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkStatus {
    Unlinked,
    Linked,
}

/// Fulfillment progress reported by the board for an ordered line.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentStatus {
    Ordered,
    InProcess,
    ReadyForPickup,
    Delivered,
    Cancelled,
}

/// Where the last fulfillment change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentSource {
    Webhook,
    Sync,
    Import,
}

/// Board delivery state of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
    /// Board integration was switched off when the batch was committed.
    Disabled,
    Pending,
    Synced,
    Failed,
}

/// A rule of the ordering workflow that a request would break.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "rule", content = "message", rename_all = "snake_case")]
pub enum OrderRuleViolation {
    #[error("{0}")]
    UnknownBook(String),
    #[error("{0}")]
    ItemAlreadyOrdered(String),
    #[error("{0}")]
    ReorderPending(String),
    #[error("{0}")]
    OutOfStock(String),
    #[error("{0}")]
    QuantityExceedsMax(String),
    #[error("{0}")]
    BelowOrderedQuantity(String),
    #[error("{0}")]
    CanStillOrderMore(String),
    #[error("{0}")]
    NotReorderable(String),
    #[error("{0}")]
    ReorderNotRequested(String),
    #[error("{0}")]
    MaxQuantityNotIncreased(String),
    #[error("{0}")]
    InvalidMaxQuantity(String),
    #[error("{0}")]
    OrderCancelled(String),
    #[error("{0}")]
    NoEnrollment(String),
    #[error("{0}")]
    NothingToSubmit(String),
    #[error("{0}")]
    NotPreSale(String),
    #[error("{0}")]
    AlreadyLinked(String),
    #[error("{0}")]
    NotLinked(String),
}

/// One catalog book inside an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub book_id: Uuid,
    pub book_code: String,
    pub book_name: String,
    pub unit_price: Decimal,
    /// Quantity the buyer has picked but not yet submitted (target total, not a delta).
    pub quantity_selected: u32,
    /// Quantity already committed through submissions.
    pub quantity_ordered: u32,
    pub max_quantity: u32,
    pub status: ItemStatus,
    #[serde(default)]
    pub reorder_reason: Option<String>,
    #[serde(default)]
    pub reorder_notes: Option<String>,
    #[serde(default)]
    pub selected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ordered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reorder_requested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reorder_resolved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub board_subitem_id: Option<String>,
    #[serde(default)]
    pub fulfillment: Option<FulfillmentStatus>,
    #[serde(default)]
    pub fulfillment_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fulfillment_source: Option<FulfillmentSource>,
}

impl OrderItem {
    /// Seeds an unordered line from a catalog row.
    pub fn from_catalog(book: &CatalogItem, now: DateTime<Utc>) -> Self {
        Self {
            book_id: book.book_id,
            book_code: book.code.clone(),
            book_name: book.name.clone(),
            unit_price: book.price,
            quantity_selected: 0,
            quantity_ordered: 0,
            max_quantity: 1,
            status: availability_status(book),
            reorder_reason: None,
            reorder_notes: None,
            selected_at: None,
            ordered_at: None,
            reorder_requested_at: None,
            reorder_resolved_at: None,
            updated_at: now,
            board_subitem_id: None,
            fulfillment: None,
            fulfillment_updated_at: None,
            fulfillment_source: None,
        }
    }

    /// Units selected on top of what is already committed.
    pub fn pending_units(&self) -> u32 {
        if self.status.is_selectable() {
            self.quantity_selected.saturating_sub(self.quantity_ordered)
        } else {
            0
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity_ordered)
    }
}

fn availability_status(book: &CatalogItem) -> ItemStatus {
    if book.in_stock() {
        ItemStatus::Available
    } else {
        ItemStatus::OutOfStock
    }
}

/// A book line committed in one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionLine {
    pub book_id: Uuid,
    pub book_code: String,
    pub book_name: String,
    pub unit_price: Decimal,
    /// Units added by this submission.
    pub quantity: u32,
    pub line_total: Decimal,
    #[serde(default)]
    pub board_subitem_id: Option<String>,
}

/// Append-only record of a partial submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: Option<Uuid>,
    pub lines: Vec<SubmissionLine>,
    pub subtotal: Decimal,
    pub notes: Option<String>,
    pub board_item_id: Option<String>,
    pub board_sync: SyncState,
    #[serde(default)]
    pub board_error: Option<String>,
}

/// Board provenance of an order that was entered as a pre-sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreSaleInfo {
    pub source_board_item_id: String,
    pub source_item_name: String,
    pub board_student_name: String,
    pub board_grade: String,
    #[serde(default)]
    pub unmatched_books: Vec<String>,
    pub imported_at: DateTime<Utc>,
    #[serde(default)]
    pub linked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub linked_by: Option<Uuid>,
}

/// Result of pushing one submission to the board, applied back onto the order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardPush {
    pub board_item_id: Option<String>,
    /// `(book_id, subitem_id)` pairs for every subitem created.
    pub subitems: Vec<(Uuid, String)>,
    pub error: Option<String>,
}

/// The per-student, per-school-year textbook order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub student_name: String,
    pub grade: String,
    pub school_year: i32,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub submissions: Vec<Submission>,
    pub board_item_ids: Vec<String>,
    pub link_status: Option<LinkStatus>,
    pub presale: Option<PreSaleInfo>,
    pub notes: Option<String>,
    pub cancel_reason: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a draft order seeded with one unordered line per catalog book.
    pub fn new_draft(
        user_id: Uuid,
        student_id: Uuid,
        student_name: impl Into<String>,
        grade: impl Into<String>,
        school_year: i32,
        books: &[CatalogItem],
        now: DateTime<Utc>,
    ) -> Self {
        let mut order = Self {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            student_id: Some(student_id),
            student_name: student_name.into(),
            grade: grade.into(),
            school_year,
            items: books
                .iter()
                .map(|book| OrderItem::from_catalog(book, now))
                .collect(),
            total: Decimal::ZERO,
            status: OrderStatus::Draft,
            submissions: Vec::new(),
            board_item_ids: Vec::new(),
            link_status: None,
            presale: None,
            notes: None,
            cancel_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        order.recalculate_total();
        order
    }

    pub fn item(&self, book_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.book_id == book_id)
    }

    fn item_mut(&mut self, book_id: Uuid) -> Result<&mut OrderItem, OrderRuleViolation> {
        self.items
            .iter_mut()
            .find(|item| item.book_id == book_id)
            .ok_or_else(|| {
                OrderRuleViolation::UnknownBook(format!("Book {} is not part of this order", book_id))
            })
    }

    /// Book tracked by a board subitem, from the current line or any earlier batch.
    pub fn book_for_subitem(&self, subitem_id: &str) -> Option<Uuid> {
        self.items
            .iter()
            .find(|item| item.board_subitem_id.as_deref() == Some(subitem_id))
            .map(|item| item.book_id)
            .or_else(|| {
                self.submissions
                    .iter()
                    .flat_map(|s| s.lines.iter())
                    .find(|line| line.board_subitem_id.as_deref() == Some(subitem_id))
                    .map(|line| line.book_id)
            })
    }

    pub fn contains_subitem(&self, subitem_id: &str) -> bool {
        self.book_for_subitem(subitem_id).is_some()
    }

    /// Every board subitem this order tracks, current lines and earlier batches.
    pub fn subitem_ids(&self) -> BTreeSet<&str> {
        self.items
            .iter()
            .filter_map(|item| item.board_subitem_id.as_deref())
            .chain(
                self.submissions
                    .iter()
                    .flat_map(|s| s.lines.iter())
                    .filter_map(|line| line.board_subitem_id.as_deref()),
            )
            .collect()
    }

    pub fn is_presale(&self) -> bool {
        self.presale.is_some()
    }

    pub fn has_committed_items(&self) -> bool {
        self.items.iter().any(|item| item.quantity_ordered > 0)
    }

    /// Uniqueness key of a live student order: `"{student_id}:{school_year}"`.
    ///
    /// `None` for cancelled orders and unlinked pre-sales, which never compete
    /// for the student's slot.
    pub fn live_key(&self) -> Option<String> {
        match self.student_id {
            Some(student_id) if self.status != OrderStatus::Cancelled => {
                Some(format!("{}:{}", student_id, self.school_year))
            }
            _ => None,
        }
    }

    /// Sum of price x quantity over ORDERED lines.
    pub fn recalculate_total(&mut self) {
        self.total = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Ordered)
            .map(OrderItem::line_total)
            .sum();
    }

    pub fn ensure_open(&self) -> Result<(), OrderRuleViolation> {
        if self.status == OrderStatus::Cancelled {
            return Err(OrderRuleViolation::OrderCancelled(format!(
                "Order {} is cancelled and can no longer change",
                self.id
            )));
        }
        Ok(())
    }

    /// Sets the selected quantity for a book.
    pub fn select(
        &mut self,
        book_id: Uuid,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let item = self.item_mut(book_id)?;

        match item.status {
            ItemStatus::Ordered => {
                return Err(OrderRuleViolation::ItemAlreadyOrdered(format!(
                    "'{}' was already ordered; request a reorder to buy more",
                    item.book_name
                )))
            }
            ItemStatus::ReorderRequested => {
                return Err(OrderRuleViolation::ReorderPending(format!(
                    "'{}' has a reorder request waiting for approval",
                    item.book_name
                )))
            }
            ItemStatus::OutOfStock if quantity > 0 => {
                return Err(OrderRuleViolation::OutOfStock(format!(
                    "'{}' is out of stock",
                    item.book_name
                )))
            }
            ItemStatus::OutOfStock => {
                item.quantity_selected = 0;
                return Ok(());
            }
            ItemStatus::Available | ItemStatus::ReorderApproved => {}
        }

        if quantity > item.max_quantity {
            return Err(OrderRuleViolation::QuantityExceedsMax(format!(
                "'{}' allows at most {} unit(s), {} requested",
                item.book_name, item.max_quantity, quantity
            )));
        }
        if item.status == ItemStatus::ReorderApproved && quantity < item.quantity_ordered {
            return Err(OrderRuleViolation::BelowOrderedQuantity(format!(
                "'{}' already has {} unit(s) ordered",
                item.book_name, item.quantity_ordered
            )));
        }

        item.quantity_selected = quantity;
        item.selected_at = Some(now);
        item.updated_at = now;
        Ok(())
    }

    /// Commits every pending selection and returns the lines of the new batch.
    pub fn commit_pending(&mut self, now: DateTime<Utc>) -> Vec<SubmissionLine> {
        let mut lines = Vec::new();
        for item in self.items.iter_mut() {
            let added = item.pending_units();
            if added == 0 {
                continue;
            }
            item.quantity_ordered = item.quantity_selected;
            item.status = ItemStatus::Ordered;
            item.ordered_at = Some(now);
            item.updated_at = now;
            lines.push(SubmissionLine {
                book_id: item.book_id,
                book_code: item.book_code.clone(),
                book_name: item.book_name.clone(),
                unit_price: item.unit_price,
                quantity: added,
                line_total: item.unit_price * Decimal::from(added),
                board_subitem_id: None,
            });
        }
        if !lines.is_empty() {
            self.recalculate_total();
            self.updated_at = now;
        }
        lines
    }

    /// Commits pending selections as a new submission record.
    pub fn submit(
        &mut self,
        submitted_by: Option<Uuid>,
        notes: Option<String>,
        board_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Submission, OrderRuleViolation> {
        self.ensure_open()?;
        let lines = self.commit_pending(now);
        if lines.is_empty() {
            return Err(OrderRuleViolation::NothingToSubmit(
                "There are no new selections to submit".to_string(),
            ));
        }

        let submission = Submission {
            id: Uuid::new_v4(),
            submitted_at: now,
            submitted_by,
            subtotal: lines.iter().map(|line| line.line_total).sum(),
            lines,
            notes: notes.clone(),
            board_item_id: None,
            board_sync: if board_enabled {
                SyncState::Pending
            } else {
                SyncState::Disabled
            },
            board_error: None,
        };
        self.submissions.push(submission.clone());
        if self.status == OrderStatus::Draft {
            self.status = OrderStatus::Submitted;
        }
        if notes.is_some() {
            self.notes = notes;
        }
        Ok(submission)
    }

    pub fn request_reorder(
        &mut self,
        book_id: Uuid,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let item = self.item_mut(book_id)?;
        match item.status {
            ItemStatus::Ordered => {}
            ItemStatus::ReorderRequested => {
                return Err(OrderRuleViolation::ReorderPending(format!(
                    "'{}' already has a reorder request waiting for approval",
                    item.book_name
                )))
            }
            _ => {
                return Err(OrderRuleViolation::NotReorderable(format!(
                    "'{}' has not been ordered yet",
                    item.book_name
                )))
            }
        }
        if item.quantity_ordered < item.max_quantity {
            return Err(OrderRuleViolation::CanStillOrderMore(format!(
                "You can still order more of '{}' ({} of {})",
                item.book_name, item.quantity_ordered, item.max_quantity
            )));
        }

        item.status = ItemStatus::ReorderRequested;
        item.reorder_reason = Some(reason.into());
        item.reorder_notes = None;
        item.reorder_requested_at = Some(now);
        item.reorder_resolved_at = None;
        item.updated_at = now;
        self.recalculate_total();
        self.updated_at = now;
        Ok(())
    }

    pub fn approve_reorder(
        &mut self,
        book_id: Uuid,
        new_max_quantity: u32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let item = self.item_mut(book_id)?;
        if item.status != ItemStatus::ReorderRequested {
            return Err(OrderRuleViolation::ReorderNotRequested(format!(
                "'{}' has no pending reorder request",
                item.book_name
            )));
        }
        if new_max_quantity <= item.max_quantity {
            return Err(OrderRuleViolation::MaxQuantityNotIncreased(format!(
                "New maximum for '{}' must be greater than {}",
                item.book_name, item.max_quantity
            )));
        }

        item.max_quantity = new_max_quantity;
        item.status = ItemStatus::ReorderApproved;
        item.quantity_selected = item.quantity_ordered;
        item.reorder_notes = notes;
        item.reorder_resolved_at = Some(now);
        item.updated_at = now;
        self.recalculate_total();
        self.updated_at = now;
        Ok(())
    }

    pub fn reject_reorder(
        &mut self,
        book_id: Uuid,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let item = self.item_mut(book_id)?;
        if item.status != ItemStatus::ReorderRequested {
            return Err(OrderRuleViolation::ReorderNotRequested(format!(
                "'{}' has no pending reorder request",
                item.book_name
            )));
        }

        item.status = ItemStatus::Ordered;
        item.reorder_notes = notes;
        item.reorder_resolved_at = Some(now);
        item.updated_at = now;
        self.recalculate_total();
        self.updated_at = now;
        Ok(())
    }

    /// Admin override of the per-book ceiling.
    pub fn set_max_quantity(
        &mut self,
        book_id: Uuid,
        max_quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let item = self.item_mut(book_id)?;
        if max_quantity == 0 || max_quantity < item.quantity_ordered {
            return Err(OrderRuleViolation::InvalidMaxQuantity(format!(
                "Maximum for '{}' must be at least {}",
                item.book_name,
                item.quantity_ordered.max(1)
            )));
        }

        item.max_quantity = max_quantity;
        if item.quantity_selected > max_quantity {
            item.quantity_selected = max_quantity;
        }
        item.updated_at = now;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        self.status = OrderStatus::Cancelled;
        self.cancel_reason = reason;
        self.updated_at = now;
        Ok(())
    }

    /// Builds an order from a board item entered before the student existed.
    ///
    /// `lines` are `(book, quantity, subitem_id)` for every board row that matched
    /// a catalog book; they become ORDERED lines recorded as one submission.
    pub fn new_presale(
        school_year: i32,
        presale: PreSaleInfo,
        lines: &[(CatalogItem, u32, String)],
        now: DateTime<Utc>,
    ) -> Self {
        let mut items: Vec<OrderItem> = Vec::new();
        for (book, quantity, subitem_id) in lines {
            let quantity = (*quantity).max(1);
            match items.iter_mut().find(|item| item.book_id == book.book_id) {
                Some(item) => {
                    item.quantity_ordered += quantity;
                    item.quantity_selected = item.quantity_ordered;
                    item.max_quantity = item.quantity_ordered;
                }
                None => {
                    let mut item = OrderItem::from_catalog(book, now);
                    item.status = ItemStatus::Ordered;
                    item.quantity_ordered = quantity;
                    item.quantity_selected = quantity;
                    item.max_quantity = quantity;
                    item.ordered_at = Some(now);
                    item.board_subitem_id = Some(subitem_id.clone());
                    item.fulfillment = Some(FulfillmentStatus::Ordered);
                    item.fulfillment_updated_at = Some(now);
                    item.fulfillment_source = Some(FulfillmentSource::Import);
                    items.push(item);
                }
            }
        }

        let submission_lines: Vec<SubmissionLine> = lines
            .iter()
            .map(|(book, quantity, subitem_id)| {
                let quantity = (*quantity).max(1);
                SubmissionLine {
                    book_id: book.book_id,
                    book_code: book.code.clone(),
                    book_name: book.name.clone(),
                    unit_price: book.price,
                    quantity,
                    line_total: book.price * Decimal::from(quantity),
                    board_subitem_id: Some(subitem_id.clone()),
                }
            })
            .collect();

        let mut submissions = Vec::new();
        if !submission_lines.is_empty() {
            submissions.push(Submission {
                id: Uuid::new_v4(),
                submitted_at: now,
                submitted_by: None,
                subtotal: submission_lines.iter().map(|line| line.line_total).sum(),
                lines: submission_lines,
                notes: None,
                board_item_id: Some(presale.source_board_item_id.clone()),
                board_sync: SyncState::Synced,
                board_error: None,
            });
        }

        let mut order = Self {
            id: Uuid::new_v4(),
            user_id: None,
            student_id: None,
            student_name: presale.board_student_name.clone(),
            grade: presale.board_grade.clone(),
            school_year,
            items,
            total: Decimal::ZERO,
            status: OrderStatus::AwaitingLink,
            submissions,
            board_item_ids: vec![presale.source_board_item_id.clone()],
            link_status: Some(LinkStatus::Unlinked),
            presale: Some(presale),
            notes: None,
            cancel_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        order.recalculate_total();
        order
    }

    /// Attaches a pre-sale order to a local student.
    pub fn link_to_student(
        &mut self,
        student_id: Uuid,
        user_id: Uuid,
        student_name: &str,
        grade: &str,
        linked_by: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let Some(presale) = self.presale.as_mut() else {
            return Err(OrderRuleViolation::NotPreSale(format!(
                "Order {} was not imported from the board",
                self.id
            )));
        };
        if self.link_status == Some(LinkStatus::Linked) {
            return Err(OrderRuleViolation::AlreadyLinked(format!(
                "Order {} is already linked to a student",
                self.id
            )));
        }

        presale.linked_at = Some(now);
        presale.linked_by = linked_by;
        self.student_id = Some(student_id);
        self.user_id = Some(user_id);
        self.student_name = student_name.to_string();
        self.grade = grade.to_string();
        self.link_status = Some(LinkStatus::Linked);
        self.status = OrderStatus::Submitted;
        self.updated_at = now;
        Ok(())
    }

    /// Returns a linked pre-sale order to the unlinked queue.
    pub fn unlink(&mut self, now: DateTime<Utc>) -> Result<(), OrderRuleViolation> {
        self.ensure_open()?;
        let Some(presale) = self.presale.as_mut() else {
            return Err(OrderRuleViolation::NotPreSale(format!(
                "Order {} was not imported from the board",
                self.id
            )));
        };
        if self.link_status != Some(LinkStatus::Linked) {
            return Err(OrderRuleViolation::NotLinked(format!(
                "Order {} is not linked to a student",
                self.id
            )));
        }

        presale.linked_at = None;
        presale.linked_by = None;
        self.student_name = presale.board_student_name.clone();
        self.grade = presale.board_grade.clone();
        self.student_id = None;
        self.user_id = None;
        self.link_status = Some(LinkStatus::Unlinked);
        self.status = OrderStatus::AwaitingLink;
        self.updated_at = now;
        Ok(())
    }

    /// Absorbs catalog drift into lines the buyer has not committed yet.
    ///
    /// Committed lines keep their price and name. New books are appended and
    /// untouched lines whose book left the catalog are dropped.
    pub fn refresh_from_catalog(&mut self, books: &[CatalogItem], now: DateTime<Utc>) -> bool {
        if self.status == OrderStatus::Cancelled {
            return false;
        }
        let mut changed = false;

        let before = self.items.len();
        self.items.retain(|item| {
            item.quantity_ordered > 0
                || item.quantity_selected > 0
                || books.iter().any(|book| book.book_id == item.book_id)
        });
        changed |= self.items.len() != before;

        for book in books {
            match self.items.iter_mut().find(|item| item.book_id == book.book_id) {
                Some(item) if matches!(item.status, ItemStatus::Available | ItemStatus::OutOfStock) => {
                    let status = if item.quantity_selected > 0 {
                        item.status
                    } else {
                        availability_status(book)
                    };
                    if item.unit_price != book.price
                        || item.book_name != book.name
                        || item.book_code != book.code
                        || item.status != status
                    {
                        item.unit_price = book.price;
                        item.book_name = book.name.clone();
                        item.book_code = book.code.clone();
                        item.status = status;
                        item.updated_at = now;
                        changed = true;
                    }
                }
                Some(_) => {}
                None => {
                    self.items.push(OrderItem::from_catalog(book, now));
                    changed = true;
                }
            }
        }

        if changed {
            self.recalculate_total();
            self.updated_at = now;
        }
        changed
    }

    /// Stores the board ids created for a submission.
    pub fn record_board_push(&mut self, submission_id: Uuid, push: &BoardPush, now: DateTime<Utc>) {
        for (book_id, subitem_id) in &push.subitems {
            if let Some(item) = self.items.iter_mut().find(|item| item.book_id == *book_id) {
                item.board_subitem_id = Some(subitem_id.clone());
                if item.fulfillment.is_none() {
                    item.fulfillment = Some(FulfillmentStatus::Ordered);
                }
                item.updated_at = now;
            }
        }
        if let Some(board_item_id) = &push.board_item_id {
            if !self.board_item_ids.contains(board_item_id) {
                self.board_item_ids.push(board_item_id.clone());
            }
        }
        if let Some(submission) = self.submissions.iter_mut().find(|s| s.id == submission_id) {
            for (book_id, subitem_id) in &push.subitems {
                if let Some(line) = submission.lines.iter_mut().find(|l| l.book_id == *book_id) {
                    line.board_subitem_id = Some(subitem_id.clone());
                }
            }
            if push.board_item_id.is_some() {
                submission.board_item_id = push.board_item_id.clone();
            }
            submission.board_sync = match (&push.board_item_id, &push.error) {
                (Some(_), None) => SyncState::Synced,
                (_, Some(_)) | (None, None) => SyncState::Failed,
            };
            submission.board_error = push.error.clone();
        }
        self.updated_at = now;
    }

    /// Applies a fulfillment label to the line tracked by `subitem_id`.
    /// Returns `Some(true)` when the line changed, `Some(false)` when it already matched.
    pub fn apply_fulfillment(
        &mut self,
        subitem_id: &str,
        status: FulfillmentStatus,
        source: FulfillmentSource,
        now: DateTime<Utc>,
    ) -> Option<bool> {
        let book_id = self.book_for_subitem(subitem_id)?;
        let item = self.items.iter_mut().find(|item| item.book_id == book_id)?;
        if item.fulfillment == Some(status) {
            return Some(false);
        }
        item.fulfillment = Some(status);
        item.fulfillment_updated_at = Some(now);
        item.fulfillment_source = Some(source);
        item.updated_at = now;
        self.updated_at = now;
        Some(true)
    }
}

/// Read model of an order for neighbouring modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub user_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub student_name: String,
    pub grade: String,
    pub school_year: i32,
    pub status: OrderStatus,
    pub link_status: Option<LinkStatus>,
    pub total: Decimal,
    pub units_ordered: u32,
    pub items_by_status: BTreeMap<String, usize>,
    pub submissions: usize,
    pub unsynced_submissions: usize,
    pub last_submitted_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        let mut items_by_status = BTreeMap::new();
        for item in &order.items {
            *items_by_status.entry(item.status.to_string()).or_insert(0) += 1;
        }
        Self {
            order_id: order.id,
            user_id: order.user_id,
            student_id: order.student_id,
            student_name: order.student_name.clone(),
            grade: order.grade.clone(),
            school_year: order.school_year,
            status: order.status,
            link_status: order.link_status,
            total: order.total,
            units_ordered: order.items.iter().map(|item| item.quantity_ordered).sum(),
            items_by_status,
            submissions: order.submissions.len(),
            unsynced_submissions: order
                .submissions
                .iter()
                .filter(|s| matches!(s.board_sync, SyncState::Pending | SyncState::Failed))
                .count(),
            last_submitted_at: order.submissions.iter().map(|s| s.submitted_at).max(),
        }
    }
}
