use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::board::columns::status_value;
use crate::board::{BoardClient, BoardItem, BoardSubitem};
use crate::config::BoardConfig;
use crate::errors::ServiceError;
use crate::models::{
    Actor, CatalogItem, Enrollment, EnrollmentStatus, LinkSuggestion, Order, OrderRuleViolation,
    OrderStatus, PreSaleInfo, SuggestionStatus,
};
use crate::repositories::{update_with_retry, EnrollmentDirectory, OrderStore, SuggestionStore};
use crate::services::catalog::{same_grade, CatalogResolver};
use crate::services::name_match::{self, normalize};

const LINK_ATTEMPTS: u32 = 3;

/// Totals of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub scanned: usize,
    pub imported: usize,
    pub already_imported: usize,
    pub unmatched_books: usize,
    pub order_ids: Vec<Uuid>,
    /// Per-item problems that did not stop the run.
    pub errors: Vec<String>,
}

/// Imports pre-sale orders from the board and pairs them with local students.
pub struct PreSaleService {
    client: Option<Arc<dyn BoardClient>>,
    config: BoardConfig,
    orders: Arc<dyn OrderStore>,
    suggestions: Arc<dyn SuggestionStore>,
    catalog: CatalogResolver,
    enrollments: Arc<dyn EnrollmentDirectory>,
    school_year: i32,
}

fn require_admin(actor: &Actor) -> Result<(), ServiceError> {
    if actor.admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Pre-sale management is restricted to administrators".to_string(),
        ))
    }
}

/// Finds the catalog book a board row refers to: by code, then by exact
/// name, then by one name containing the other.
fn match_book<'a>(books: &'a [CatalogItem], code: Option<&str>, name: &str) -> Option<&'a CatalogItem> {
    if let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(book) = books.iter().find(|b| b.code.eq_ignore_ascii_case(code)) {
            return Some(book);
        }
    }

    let wanted = normalize(name);
    if wanted.is_empty() {
        return None;
    }
    books
        .iter()
        .find(|b| normalize(&b.name) == wanted)
        .or_else(|| {
            books.iter().find(|b| {
                let candidate = normalize(&b.name);
                !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(&candidate))
            })
        })
}

fn row_quantity(text: Option<&str>) -> u32 {
    text.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|q| q.is_finite() && *q >= 1.0)
        .map(|q| q as u32)
        .unwrap_or(1)
}

fn not_found(what: &str, id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("{} {} not found", what, id))
}

impl PreSaleService {
    pub fn new(
        client: Option<Arc<dyn BoardClient>>,
        config: BoardConfig,
        orders: Arc<dyn OrderStore>,
        suggestions: Arc<dyn SuggestionStore>,
        catalog: CatalogResolver,
        enrollments: Arc<dyn EnrollmentDirectory>,
        school_year: i32,
    ) -> Self {
        Self {
            client: client.filter(|_| config.enabled),
            config,
            orders,
            suggestions,
            catalog,
            enrollments,
            school_year,
        }
    }

    /// Pulls every board item flagged ready for import into a local pre-sale
    /// order, then flags the item done on the board.
    #[instrument(skip(self, actor))]
    pub async fn import(&self, actor: &Actor) -> Result<ImportReport, ServiceError> {
        require_admin(actor)?;
        let client = self.client.as_ref().ok_or_else(|| {
            ServiceError::InvalidOperation("Board integration is disabled".to_string())
        })?;
        let trigger_column = self.config.presale.trigger_column.as_deref().ok_or_else(|| {
            ServiceError::InvalidOperation("No pre-sale trigger column is configured".to_string())
        })?;

        let items = client
            .find_items_by_column(
                &self.config.orders_board_id,
                trigger_column,
                &self.config.presale.ready_label,
            )
            .await?;
        let books = self.catalog.active_books().await?;

        let mut report = ImportReport {
            scanned: items.len(),
            ..Default::default()
        };
        for item in &items {
            match self.orders.find_by_source_item(&item.id).await? {
                Some(_) => report.already_imported += 1,
                None => match self.import_item(item, &books).await {
                    Ok(order) => {
                        report.imported += 1;
                        report.unmatched_books += order
                            .presale
                            .as_ref()
                            .map(|p| p.unmatched_books.len())
                            .unwrap_or(0);
                        report.order_ids.push(order.id);
                    }
                    Err(ServiceError::Conflict(_)) => report.already_imported += 1,
                    Err(e) => {
                        warn!(board_item_id = %item.id, error = %e, "pre-sale item not imported");
                        report.errors.push(format!("{}: {}", item.id, e));
                        continue;
                    }
                },
            }

            let done = status_value(&self.config.presale.done_label);
            if let Err(e) = client
                .change_column_value(&self.config.orders_board_id, &item.id, trigger_column, &done)
                .await
            {
                warn!(board_item_id = %item.id, error = %e, "could not flag pre-sale item as imported");
                report.errors.push(format!("{}: {}", item.id, e));
            }
        }

        info!(
            scanned = report.scanned,
            imported = report.imported,
            already_imported = report.already_imported,
            "pre-sale import finished"
        );
        Ok(report)
    }

    async fn import_item(&self, item: &BoardItem, books: &[CatalogItem]) -> Result<Order, ServiceError> {
        let presale_columns = &self.config.presale;
        let student_name = presale_columns
            .student_column
            .as_deref()
            .and_then(|c| item.column_text(c))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&item.name)
            .to_string();
        let grade = presale_columns
            .grade_column
            .as_deref()
            .and_then(|c| item.column_text(c))
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let mut lines: Vec<(CatalogItem, u32, String)> = Vec::new();
        let mut unmatched: Vec<String> = Vec::new();
        for subitem in &item.subitems {
            match self.match_row(books, subitem) {
                Some((book, quantity)) => lines.push((book.clone(), quantity, subitem.id.clone())),
                None => {
                    debug!(subitem_id = %subitem.id, name = %subitem.name, "no catalog match");
                    unmatched.push(subitem.name.clone());
                }
            }
        }

        let now = Utc::now();
        let info = PreSaleInfo {
            source_board_item_id: item.id.clone(),
            source_item_name: item.name.clone(),
            board_student_name: student_name,
            board_grade: grade,
            unmatched_books: unmatched,
            imported_at: now,
            linked_at: None,
            linked_by: None,
        };
        let order = Order::new_presale(self.school_year, info, &lines, now);
        let order = self.orders.insert(&order).await?;
        info!(order_id = %order.id, board_item_id = %item.id, lines = lines.len(), "imported pre-sale order");
        Ok(order)
    }

    fn match_row<'a>(&self, books: &'a [CatalogItem], row: &BoardSubitem) -> Option<(&'a CatalogItem, u32)> {
        let columns = &self.config.subitem_columns;
        let code = columns.code.as_deref().and_then(|c| row.column_text(c));
        let book = match_book(books, code, &row.name)?;
        let quantity = row_quantity(columns.quantity.as_deref().and_then(|c| row.column_text(c)));
        Some((book, quantity))
    }

    async fn enrollment_for(&self, student_id: Uuid, school_year: i32) -> Result<Enrollment, ServiceError> {
        let enrollment = self
            .enrollments
            .enrollment(student_id, school_year)
            .await?
            .filter(|e| e.status == EnrollmentStatus::Approved)
            .ok_or_else(|| {
                OrderRuleViolation::NoEnrollment(format!(
                    "Student {} has no approved enrollment for {}",
                    student_id, school_year
                ))
            })?;
        Ok(enrollment)
    }

    /// Proposes the best unlinked pre-sale order for a student.
    ///
    /// Returns `None` when nothing scores above the threshold or when the best
    /// score is shared by more than one order.
    #[instrument(skip(self, actor), fields(student_id = %student_id))]
    pub async fn suggest_for_student(
        &self,
        actor: &Actor,
        student_id: Uuid,
    ) -> Result<Option<LinkSuggestion>, ServiceError> {
        require_admin(actor)?;
        let enrollment = self.enrollment_for(student_id, self.school_year).await?;

        // Candidate order, its score and the pending suggestion already made for the pair.
        let mut candidates: Vec<(Order, f64, Option<LinkSuggestion>)> = Vec::new();
        for order in self.orders.list_unlinked().await? {
            if order.school_year != enrollment.school_year {
                continue;
            }
            let Some(presale) = order.presale.as_ref() else {
                continue;
            };
            if !presale.board_grade.trim().is_empty()
                && !same_grade(&presale.board_grade, &enrollment.grade)
            {
                continue;
            }
            let score = name_match::score(&presale.board_student_name, &enrollment.student_name);
            if score < name_match::MATCH_THRESHOLD {
                continue;
            }
            match self.suggestions.find_for_pair(order.id, student_id).await? {
                Some(previous) if previous.status == SuggestionStatus::Rejected => continue,
                Some(previous) if previous.is_pending() => {
                    candidates.push((order, score, Some(previous)))
                }
                _ => candidates.push((order, score, None)),
            }
        }

        let best = candidates.iter().map(|(_, s, _)| *s).fold(f64::MIN, f64::max);
        let mut top = candidates.into_iter().filter(|(_, s, _)| *s == best);
        let (order, score, pending) = match (top.next(), top.next()) {
            (Some(only), None) => only,
            (Some(_), Some(_)) => {
                info!(score = best, "ambiguous pre-sale match, no suggestion made");
                return Ok(None);
            }
            _ => return Ok(None),
        };
        if let Some(pending) = pending {
            debug!(suggestion_id = %pending.id, "best match already suggested");
            return Ok(Some(pending));
        }

        let suggestion = LinkSuggestion {
            id: Uuid::new_v4(),
            order_id: order.id,
            student_id,
            user_id: enrollment.user_id,
            student_name: enrollment.student_name.clone(),
            board_student_name: order
                .presale
                .as_ref()
                .map(|p| p.board_student_name.clone())
                .unwrap_or_default(),
            score,
            status: SuggestionStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        };
        self.suggestions.insert(&suggestion).await?;
        info!(order_id = %order.id, score, "suggested pre-sale link");
        Ok(Some(suggestion))
    }

    pub async fn list_pending_suggestions(&self, actor: &Actor) -> Result<Vec<LinkSuggestion>, ServiceError> {
        require_admin(actor)?;
        self.suggestions.list_pending().await
    }

    pub async fn list_unlinked_orders(&self, actor: &Actor) -> Result<Vec<Order>, ServiceError> {
        require_admin(actor)?;
        self.orders.list_unlinked().await
    }

    #[instrument(skip(self, actor), fields(suggestion_id = %suggestion_id))]
    pub async fn confirm_suggestion(&self, actor: &Actor, suggestion_id: Uuid) -> Result<Order, ServiceError> {
        require_admin(actor)?;
        let suggestion = self.pending_suggestion(suggestion_id).await?;
        self.link_order(actor, suggestion.order_id, suggestion.student_id).await
    }

    #[instrument(skip(self, actor), fields(suggestion_id = %suggestion_id))]
    pub async fn reject_suggestion(
        &self,
        actor: &Actor,
        suggestion_id: Uuid,
    ) -> Result<LinkSuggestion, ServiceError> {
        require_admin(actor)?;
        let mut suggestion = self.pending_suggestion(suggestion_id).await?;
        suggestion.status = SuggestionStatus::Rejected;
        suggestion.resolved_at = Some(Utc::now());
        suggestion.resolved_by = Some(actor.user_id);
        self.suggestions.update(&suggestion).await?;
        Ok(suggestion)
    }

    async fn pending_suggestion(&self, suggestion_id: Uuid) -> Result<LinkSuggestion, ServiceError> {
        let suggestion = self
            .suggestions
            .get(suggestion_id)
            .await?
            .ok_or_else(|| not_found("Suggestion", suggestion_id))?;
        if !suggestion.is_pending() {
            return Err(ServiceError::InvalidOperation(format!(
                "Suggestion {} was already {}",
                suggestion_id, suggestion.status
            )));
        }
        Ok(suggestion)
    }

    /// Links a pre-sale order to a student directly.
    ///
    /// An untouched draft the student already has for the year is cancelled
    /// once the link itself is known to be valid; a draft with committed books
    /// blocks the link.
    #[instrument(skip(self, actor), fields(order_id = %order_id, student_id = %student_id))]
    pub async fn link_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        student_id: Uuid,
    ) -> Result<Order, ServiceError> {
        require_admin(actor)?;
        let order = self.orders.get(order_id).await?.ok_or_else(|| not_found("Order", order_id))?;
        order.ensure_open()?;
        let enrollment = self.enrollment_for(student_id, order.school_year).await?;
        let link = |o: &mut Order| {
            o.link_to_student(
                student_id,
                enrollment.user_id,
                &enrollment.student_name,
                &enrollment.grade,
                Some(actor.user_id),
                Utc::now(),
            )
        };
        // Rule failures must surface before the student's draft is touched.
        link(&mut order.clone())?;

        let mut replaced = None;
        if let Some(existing) = self
            .orders
            .find_by_student_year(student_id, order.school_year)
            .await?
            .filter(|o| o.id != order_id && o.status != OrderStatus::Cancelled)
        {
            let reason = format!("Replaced by pre-sale order {}", order_id);
            update_with_retry(self.orders.as_ref(), existing.id, LINK_ATTEMPTS, |o| {
                if o.has_committed_items() {
                    return Err(ServiceError::Conflict(format!(
                        "Student {} already has order {} with ordered books",
                        student_id, o.id
                    )));
                }
                o.cancel(Some(reason.clone()), Utc::now())?;
                Ok(true)
            })
            .await?;
            info!(draft_id = %existing.id, "cancelled untouched draft in favour of pre-sale order");
            replaced = Some(existing.id);
        }

        let (linked, _) = update_with_retry(self.orders.as_ref(), order_id, LINK_ATTEMPTS, |o| {
            link(o)?;
            Ok(true)
        })
        .await
        .map_err(|e| {
            if let Some(draft_id) = replaced {
                error!(%draft_id, error = %e, "pre-sale link failed after the draft was cancelled");
            }
            e
        })?;

        self.resolve_suggestions(order_id, Some(student_id), actor.user_id)
            .await?;
        info!("pre-sale order linked");
        Ok(linked)
    }

    /// Returns a linked pre-sale order to the unlinked queue.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn unlink_order(&self, actor: &Actor, order_id: Uuid) -> Result<Order, ServiceError> {
        require_admin(actor)?;
        let (order, _) = update_with_retry(self.orders.as_ref(), order_id, LINK_ATTEMPTS, |o| {
            o.unlink(Utc::now())?;
            Ok(true)
        })
        .await?;
        info!("pre-sale order unlinked");
        Ok(order)
    }

    /// Closes every pending suggestion for an order: the one naming the linked
    /// student is confirmed, the rest are rejected.
    async fn resolve_suggestions(
        &self,
        order_id: Uuid,
        linked_student: Option<Uuid>,
        resolved_by: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        for mut suggestion in self.suggestions.pending_for_order(order_id).await? {
            suggestion.status = if Some(suggestion.student_id) == linked_student {
                SuggestionStatus::Confirmed
            } else {
                SuggestionStatus::Rejected
            };
            suggestion.resolved_at = Some(now);
            suggestion.resolved_by = Some(resolved_by);
            self.suggestions.update(&suggestion).await?;
        }
        Ok(())
    }
}
