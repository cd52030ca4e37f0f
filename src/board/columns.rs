//! Builders for board column payloads.
//!
//! Only columns present in the mapping are written. Values use the board's
//! JSON column formats: plain strings for text and numbers, `{"label"}` for
//! status, `{"date"}` for dates and `{"email", "text"}` for email columns.

use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::config::{InventoryBoardConfig, OrderColumnMapping, SubitemColumnMapping};
use crate::models::{Order, Submission, SubmissionLine, UserIdentity};

/// What gets pushed for one submission.
#[derive(Debug, Clone, Copy)]
pub struct OrderPush<'a> {
    pub order: &'a Order,
    pub submission: &'a Submission,
    pub guardian: Option<&'a UserIdentity>,
}

impl OrderPush<'_> {
    /// 1-based position of the submission within the order.
    pub fn sequence(&self) -> usize {
        self.order
            .submissions
            .iter()
            .position(|s| s.id == self.submission.id)
            .map(|i| i + 1)
            .unwrap_or(self.order.submissions.len())
    }

    pub fn reference(&self) -> String {
        let short: String = self.order.id.simple().to_string().chars().take(8).collect();
        format!("{}-{}", short.to_uppercase(), self.sequence())
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

pub fn status_value(label: &str) -> Value {
    json!({ "label": label })
}

fn put(columns: &mut Map<String, Value>, column: &Option<String>, value: Value) {
    if let Some(column) = column.as_deref().filter(|c| !c.is_empty()) {
        columns.insert(column.to_string(), value);
    }
}

pub fn item_name(push: &OrderPush<'_>) -> String {
    format!(
        "{} - {} - {}",
        push.order.student_name,
        push.order.grade,
        push.reference()
    )
}

fn books_text(lines: &[SubmissionLine]) -> String {
    lines
        .iter()
        .map(|line| format!("{} {} x{}", line.book_code, line.book_name, line.quantity))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn order_columns(
    mapping: &OrderColumnMapping,
    status_label: Option<&str>,
    push: &OrderPush<'_>,
) -> Value {
    let mut columns = Map::new();
    put(&mut columns, &mapping.student, json!(push.order.student_name));
    put(&mut columns, &mapping.grade, json!(push.order.grade));
    if let Some(guardian) = push.guardian {
        put(&mut columns, &mapping.guardian, json!(guardian.display_name));
        if let Some(email) = guardian.email.as_deref() {
            put(
                &mut columns,
                &mapping.email,
                json!({ "email": email, "text": email }),
            );
        }
    }
    put(
        &mut columns,
        &mapping.total,
        json!(money(push.submission.subtotal)),
    );
    if let Some(label) = status_label {
        put(&mut columns, &mapping.status, status_value(label));
    }
    put(
        &mut columns,
        &mapping.books,
        json!({ "text": books_text(&push.submission.lines) }),
    );
    put(
        &mut columns,
        &mapping.date,
        json!({ "date": push.submission.submitted_at.format("%Y-%m-%d").to_string() }),
    );
    put(&mut columns, &mapping.order_reference, json!(push.reference()));
    Value::Object(columns)
}

pub fn subitem_name(line: &SubmissionLine) -> String {
    line.book_name.clone()
}

/// Column values for a book subitem; `None` when no subitem column is mapped.
pub fn subitem_columns(mapping: &SubitemColumnMapping, line: &SubmissionLine) -> Option<Value> {
    let mut columns = Map::new();
    put(&mut columns, &mapping.code, json!(line.book_code));
    put(&mut columns, &mapping.quantity, json!(line.quantity.to_string()));
    put(
        &mut columns,
        &mapping.price,
        json!(money(line.unit_price)),
    );
    (!columns.is_empty()).then_some(Value::Object(columns))
}

/// Free-text note posted on the parent item.
pub fn summary_body(push: &OrderPush<'_>) -> String {
    let mut body = format!(
        "Pedido {} de {} ({}, {})\n",
        push.reference(),
        push.order.student_name,
        push.order.grade,
        push.order.school_year
    );
    if let Some(guardian) = push.guardian {
        body.push_str(&format!("Responsable: {}", guardian.display_name));
        if let Some(email) = guardian.email.as_deref() {
            body.push_str(&format!(" <{}>", email));
        }
        body.push('\n');
    }
    for line in &push.submission.lines {
        body.push_str(&format!(
            "- {} {} x{} @ {} = {}\n",
            line.book_code,
            line.book_name,
            line.quantity,
            money(line.unit_price),
            money(line.line_total)
        ));
    }
    body.push_str(&format!("Subtotal: {}", money(push.submission.subtotal)));
    if let Some(notes) = push.submission.notes.as_deref() {
        body.push_str(&format!("\nNotas: {}", notes));
    }
    body
}

pub fn inventory_item_columns(config: &InventoryBoardConfig, book_code: &str) -> Value {
    let mut columns = Map::new();
    columns.insert(config.code_column.clone(), json!(book_code));
    Value::Object(columns)
}

pub fn inventory_subitem_columns(
    config: &InventoryBoardConfig,
    student_name: &str,
    quantity: u32,
) -> Option<Value> {
    let mut columns = Map::new();
    put(
        &mut columns,
        &config.subitem_quantity_column,
        json!(quantity.to_string()),
    );
    put(&mut columns, &config.subitem_student_column, json!(student_name));
    (!columns.is_empty()).then_some(Value::Object(columns))
}
