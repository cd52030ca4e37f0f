use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::board::columns::{self, OrderPush};
use crate::board::{BoardClient, BoardError, BoardUpdate, StatusLabelMap};
use crate::config::BoardConfig;
use crate::errors::ServiceError;
use crate::models::{
    Actor, BoardPush, FulfillmentSource, FulfillmentStatus, Order, OrderStatus, SubmissionLine,
    SyncState,
};
use crate::repositories::{update_with_retry, OrderStore, UserDirectory};
use crate::services::inventory_board::InventoryBoardService;

/// Write-back attempts for board results landing on an order.
const WRITE_BACK_ATTEMPTS: u32 = 5;

/// What happened to the board side of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BoardSyncStatus {
    /// Board integration is off; the local commit is all there is.
    LocalOnly,
    Synced {
        board_item_id: String,
        subitems_created: usize,
        subitems_failed: usize,
    },
    /// The parent item could not be created; retry later.
    Failed { reason: String },
}

/// Outcome of a manual reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub order_id: Uuid,
    pub subitems_checked: usize,
    pub updated: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Pushes orders to the board and applies board status changes back.
pub struct BoardSyncService {
    client: Option<Arc<dyn BoardClient>>,
    config: BoardConfig,
    labels: StatusLabelMap,
    orders: Arc<dyn OrderStore>,
    users: Arc<dyn UserDirectory>,
    inventory: Option<InventoryBoardService>,
}

/// Pulls the status label out of a webhook `event.value`.
fn extract_label(value: &Value) -> Option<String> {
    let label = match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("label").and_then(|label| match label {
            Value::String(text) => Some(text.clone()),
            Value::Object(inner) => inner
                .get("text")
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        }),
        _ => None,
    };
    label.filter(|text| !text.trim().is_empty())
}

fn extract_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn not_processed(reason: &str) -> Value {
    json!({ "processed": false, "reason": reason })
}

impl BoardSyncService {
    pub fn new(
        client: Option<Arc<dyn BoardClient>>,
        config: BoardConfig,
        orders: Arc<dyn OrderStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let client = client.filter(|_| config.enabled);
        let inventory = match (&client, &config.inventory) {
            (Some(client), Some(inventory)) => {
                Some(InventoryBoardService::new(client.clone(), inventory.clone()))
            }
            _ => None,
        };
        Self {
            labels: StatusLabelMap::from_config(&config.status_labels),
            client,
            config,
            orders,
            users,
            inventory,
        }
    }

    pub fn enabled(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&Arc<dyn BoardClient>, BoardError> {
        self.client.as_ref().ok_or(BoardError::Disabled)
    }

    /// Sends one submission to the board and records the created ids on the order.
    ///
    /// Never fails: board errors end up in the returned status and on the
    /// submission record. A submission whose parent item already exists only
    /// gets its missing subitems created.
    #[instrument(skip(self, order), fields(order_id = %order.id, submission_id = %submission_id))]
    pub async fn push_submission(&self, order: &Order, submission_id: Uuid) -> BoardSyncStatus {
        let Some(client) = self.client.as_ref() else {
            return BoardSyncStatus::LocalOnly;
        };
        let Some(submission) = order.submissions.iter().find(|s| s.id == submission_id) else {
            return BoardSyncStatus::Failed {
                reason: format!("submission {} not found on order", submission_id),
            };
        };

        let guardian = match order.user_id {
            Some(user_id) => match self.users.identity(user_id).await {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(error = %e, "could not load buyer identity for board payload");
                    None
                }
            },
            None => None,
        };
        let push = OrderPush {
            order,
            submission,
            guardian: guardian.as_ref(),
        };

        let board_item_id = match &submission.board_item_id {
            Some(existing) => existing.clone(),
            None => {
                let column_values = columns::order_columns(
                    &self.config.columns,
                    self.config.submitted_label.as_deref(),
                    &push,
                );
                match client
                    .create_item(
                        &self.config.orders_board_id,
                        self.config.orders_group_id.as_deref(),
                        &columns::item_name(&push),
                        &column_values,
                    )
                    .await
                {
                    Ok(id) => {
                        info!(board_item_id = %id, "created board item");
                        if let Err(e) = client
                            .create_update(&id, &columns::summary_body(&push))
                            .await
                        {
                            warn!(board_item_id = %id, error = %e, "failed to post order summary");
                        }
                        id
                    }
                    Err(e) => {
                        error!(error = %e, "failed to create board item");
                        let reason = e.to_string();
                        self.write_back(
                            order.id,
                            submission_id,
                            BoardPush {
                                board_item_id: None,
                                subitems: Vec::new(),
                                error: Some(reason.clone()),
                            },
                        )
                        .await;
                        return BoardSyncStatus::Failed { reason };
                    }
                }
            }
        };

        let mut created: Vec<(Uuid, String)> = Vec::new();
        let mut created_lines: Vec<SubmissionLine> = Vec::new();
        let mut failed = 0;
        for line in submission.lines.iter().filter(|l| l.board_subitem_id.is_none()) {
            let line_columns = columns::subitem_columns(&self.config.subitem_columns, line);
            match client
                .create_subitem(
                    &board_item_id,
                    &columns::subitem_name(line),
                    line_columns.as_ref(),
                )
                .await
            {
                Ok(subitem_id) => {
                    debug!(book_code = %line.book_code, subitem_id = %subitem_id, "created subitem");
                    created.push((line.book_id, subitem_id));
                    created_lines.push(line.clone());
                }
                Err(e) => {
                    warn!(book_code = %line.book_code, error = %e, "failed to create subitem, skipping");
                    failed += 1;
                }
            }
        }

        let subitems_created = created.len();
        self.write_back(
            order.id,
            submission_id,
            BoardPush {
                board_item_id: Some(board_item_id.clone()),
                subitems: created,
                error: None,
            },
        )
        .await;

        if let Some(inventory) = &self.inventory {
            let report = inventory
                .record_order_lines(&order.student_name, &created_lines)
                .await;
            if report.failed > 0 {
                warn!(failed = report.failed, "inventory board mirror incomplete");
            }
        }

        BoardSyncStatus::Synced {
            board_item_id,
            subitems_created,
            subitems_failed: failed,
        }
    }

    async fn write_back(&self, order_id: Uuid, submission_id: Uuid, push: BoardPush) {
        let result = update_with_retry(self.orders.as_ref(), order_id, WRITE_BACK_ATTEMPTS, |o| {
            o.record_board_push(submission_id, &push, Utc::now());
            Ok(true)
        })
        .await;
        if let Err(e) = result {
            error!(order_id = %order_id, error = %e, "failed to store board result on order");
        }
    }

    /// Handles an inbound board webhook. Always returns a body for a 200 response.
    #[instrument(skip(self, body))]
    pub async fn handle_webhook(&self, body: &Value) -> Value {
        if let Some(challenge) = body.get("challenge") {
            return json!({ "challenge": challenge });
        }

        let Some(event) = body.get("event") else {
            return not_processed("malformed");
        };
        let Some(subitem_id) = event.get("pulseId").and_then(extract_id) else {
            return not_processed("malformed");
        };
        let Some(label) = event.get("value").and_then(extract_label) else {
            return not_processed("malformed");
        };
        let Some(status) = self.labels.resolve(&label) else {
            info!(%subitem_id, %label, "webhook label has no mapping");
            return json!({ "processed": false, "reason": "unknown_label", "label": label });
        };

        match self
            .apply_status(&subitem_id, status, FulfillmentSource::Webhook)
            .await
        {
            Ok(Some((order_id, book_id, changed))) => json!({
                "processed": true,
                "order_id": order_id,
                "book_id": book_id,
                "subitem_id": subitem_id,
                "status": status,
                "changed": changed,
            }),
            Ok(None) => {
                json!({ "processed": false, "reason": "subitem_not_found", "subitem_id": subitem_id })
            }
            Err(ServiceError::InvalidOperation(reason)) => {
                json!({ "processed": false, "reason": "order_cancelled", "detail": reason })
            }
            Err(e) => {
                error!(%subitem_id, error = %e, "failed to apply webhook status");
                not_processed("internal_error")
            }
        }
    }

    /// Sets the fulfillment status of the line tracked by `subitem_id`.
    /// Returns `(order, book, changed)`, or `None` when no order tracks the subitem.
    async fn apply_status(
        &self,
        subitem_id: &str,
        status: FulfillmentStatus,
        source: FulfillmentSource,
    ) -> Result<Option<(Uuid, Uuid, bool)>, ServiceError> {
        let Some(order) = self.orders.find_by_subitem(subitem_id).await? else {
            return Ok(None);
        };
        let Some(book_id) = order.book_for_subitem(subitem_id) else {
            return Ok(None);
        };
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is cancelled",
                order.id
            )));
        }

        let (_, changed) =
            update_with_retry(self.orders.as_ref(), order.id, WRITE_BACK_ATTEMPTS, |o| {
                Ok(o.apply_fulfillment(subitem_id, status, source, Utc::now())
                    .unwrap_or(false))
            })
            .await?;
        info!(order_id = %order.id, %subitem_id, %status, changed, "applied board status");
        Ok(Some((order.id, book_id, changed)))
    }

    /// Re-reads every subitem of the order from the board and applies status drift.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn sync_order_statuses(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<SyncReport, ServiceError> {
        if !actor.admin {
            return Err(ServiceError::Forbidden(
                "Only administrators can reconcile orders".to_string(),
            ));
        }
        let client = self.client()?;
        let status_column = self
            .config
            .subitem_columns
            .status
            .clone()
            .ok_or_else(|| {
                ServiceError::InvalidOperation("No subitem status column is configured".into())
            })?;
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut report = SyncReport {
            order_id,
            subitems_checked: 0,
            updated: 0,
            error: None,
        };
        if order.board_item_ids.is_empty() {
            return Ok(report);
        }
        if order.status == OrderStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is cancelled",
                order_id
            )));
        }

        let items = match client.items(&order.board_item_ids).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "board unavailable during reconciliation");
                report.error = Some(e.to_string());
                return Ok(report);
            }
        };

        let mut observed: Vec<(String, FulfillmentStatus)> = Vec::new();
        for subitem in items.iter().flat_map(|item| item.subitems.iter()) {
            report.subitems_checked += 1;
            let Some(label) = subitem.column_text(&status_column) else {
                continue;
            };
            match self.labels.resolve(label) {
                Some(status) => observed.push((subitem.id.clone(), status)),
                None => debug!(subitem_id = %subitem.id, %label, "unmapped label during sync"),
            }
        }

        let mut updated = 0;
        update_with_retry(self.orders.as_ref(), order_id, WRITE_BACK_ATTEMPTS, |o| {
            let now = Utc::now();
            updated = observed
                .iter()
                .filter(|(subitem_id, status)| {
                    o.apply_fulfillment(subitem_id, *status, FulfillmentSource::Sync, now)
                        .unwrap_or(false)
                })
                .count();
            Ok(updated > 0)
        })
        .await?;

        report.updated = updated;
        info!(updated, checked = report.subitems_checked, "reconciled order with board");
        Ok(report)
    }

    async fn load_for(&self, actor: &Actor, order_id: Uuid) -> Result<Order, ServiceError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if !actor.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(format!(
                "Order {} belongs to another user",
                order_id
            )));
        }
        Ok(order)
    }

    /// Posts a chat note on the order's most recent board item.
    #[instrument(skip(self, actor, body), fields(order_id = %order_id))]
    pub async fn post_order_update(
        &self,
        actor: &Actor,
        order_id: Uuid,
        body: &str,
    ) -> Result<String, ServiceError> {
        if body.trim().is_empty() {
            return Err(ServiceError::ValidationError("Message cannot be empty".into()));
        }
        let client = self.client()?;
        let order = self.load_for(actor, order_id).await?;
        let Some(item_id) = order.board_item_ids.last() else {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} has not reached the board yet",
                order_id
            )));
        };

        let author = match self.users.identity(actor.user_id).await? {
            Some(identity) => identity.display_name,
            None if actor.admin => "Administración".to_string(),
            None => "Cliente".to_string(),
        };
        let update_id = client
            .create_update(item_id, &format!("{}: {}", author, body.trim()))
            .await?;
        Ok(update_id)
    }

    /// Board updates across all of the order's board items.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn order_updates(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<Vec<BoardUpdate>, ServiceError> {
        let client = self.client()?;
        let order = self.load_for(actor, order_id).await?;
        Ok(client.updates(&order.board_item_ids).await?)
    }

    /// Whether a submission still has board work left.
    pub fn needs_push(order: &Order, submission_id: Uuid) -> bool {
        order
            .submissions
            .iter()
            .find(|s| s.id == submission_id)
            .is_some_and(|s| {
                s.board_sync != SyncState::Synced
                    || s.lines.iter().any(|line| line.board_subitem_id.is_none())
            })
    }
}
