//! Client side of the external order-tracking board (monday.com).
//!
//! The rest of the crate talks to the board through [`BoardClient`]; the
//! GraphQL implementation lives in [`monday`].

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub mod columns;
pub mod labels;
pub mod monday;

pub use labels::StatusLabelMap;
pub use monday::MondayClient;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("board returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("board GraphQL error: {0}")]
    GraphQl(String),

    #[error("unexpected board response: {0}")]
    Decode(String),

    #[error("board response carried no id for {0}")]
    MissingId(&'static str),

    #[error("board integration is disabled")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnValue {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Raw JSON value as returned by the board, still encoded as a string.
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSubitem {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub column_values: Vec<ColumnValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub column_values: Vec<ColumnValue>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subitems: Vec<BoardSubitem>,
}

// Boards without subitems answer `"subitems": null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A chat-like note on a board item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardUpdate {
    pub id: String,
    pub item_id: String,
    pub body: String,
    pub text_body: Option<String>,
    pub created_at: Option<String>,
    pub creator_name: Option<String>,
}

/// Text of a column, if the column is present and not blank.
pub fn column_text<'a>(columns: &'a [ColumnValue], column_id: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| c.id == column_id)
        .and_then(|c| c.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

impl BoardItem {
    pub fn column_text(&self, column_id: &str) -> Option<&str> {
        column_text(&self.column_values, column_id)
    }
}

impl BoardSubitem {
    pub fn column_text(&self, column_id: &str) -> Option<&str> {
        column_text(&self.column_values, column_id)
    }
}

/// Operations the service needs from the board.
#[async_trait]
pub trait BoardClient: Send + Sync {
    async fn create_item(
        &self,
        board_id: &str,
        group_id: Option<&str>,
        item_name: &str,
        column_values: &Value,
    ) -> Result<String, BoardError>;

    async fn create_subitem(
        &self,
        parent_item_id: &str,
        item_name: &str,
        column_values: Option<&Value>,
    ) -> Result<String, BoardError>;

    async fn create_update(&self, item_id: &str, body: &str) -> Result<String, BoardError>;

    /// Items with their column values and subitems.
    async fn items(&self, ids: &[String]) -> Result<Vec<BoardItem>, BoardError>;

    /// Every item on `board_id` whose `column_id` shows `value`.
    async fn find_items_by_column(
        &self,
        board_id: &str,
        column_id: &str,
        value: &str,
    ) -> Result<Vec<BoardItem>, BoardError>;

    async fn change_column_value(
        &self,
        board_id: &str,
        item_id: &str,
        column_id: &str,
        value: &Value,
    ) -> Result<(), BoardError>;

    async fn updates(&self, item_ids: &[String]) -> Result<Vec<BoardUpdate>, BoardError>;
}
