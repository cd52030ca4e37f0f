use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{BoardClient, BoardError, BoardItem, BoardUpdate};
use crate::config::BoardConfig;

const PAGE_LIMIT: u32 = 100;
const UPDATES_LIMIT: u32 = 50;

const ITEM_FIELDS: &str = "id name column_values { id text value } \
                           subitems { id name column_values { id text value } }";

/// GraphQL client for the monday.com API.
#[derive(Clone)]
pub struct MondayClient {
    client: reqwest::Client,
    api_url: String,
    api_token: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorBody>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateItemData {
    create_item: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct CreateSubitemData {
    create_subitem: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct CreateUpdateData {
    create_update: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct ChangeColumnData {
    #[allow(dead_code)]
    change_column_value: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct ItemsData {
    #[serde(default)]
    items: Vec<BoardItem>,
}

#[derive(Debug, Deserialize)]
struct ItemsPage {
    cursor: Option<String>,
    #[serde(default)]
    items: Vec<BoardItem>,
}

#[derive(Debug, Deserialize)]
struct ItemsByColumnData {
    items_page_by_column_values: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct NextItemsPageData {
    next_items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
struct UpdatesData {
    #[serde(default)]
    items: Vec<ItemUpdates>,
}

#[derive(Debug, Deserialize)]
struct ItemUpdates {
    id: String,
    #[serde(default)]
    updates: Vec<RawUpdate>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    id: String,
    body: String,
    text_body: Option<String>,
    created_at: Option<String>,
    creator: Option<Creator>,
}

#[derive(Debug, Deserialize)]
struct Creator {
    name: Option<String>,
}

fn require_id(created: Option<IdOnly>, what: &'static str) -> Result<String, BoardError> {
    created
        .and_then(|c| c.id)
        .filter(|id| !id.is_empty())
        .ok_or(BoardError::MissingId(what))
}

impl MondayClient {
    pub fn new(config: &BoardConfig) -> Result<Self, BoardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            api_version: config.api_version.clone(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, BoardError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_token)
            .header("API-Version", &self.api_version)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "board request rejected");
            return Err(BoardError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| BoardError::Decode(e.to_string()))?;

        if let Some(message) = envelope.error_message {
            return Err(BoardError::GraphQl(message));
        }
        if !envelope.errors.is_empty() {
            let message = envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(BoardError::GraphQl(message));
        }
        envelope
            .data
            .ok_or_else(|| BoardError::Decode("response has no data".to_string()))
    }
}

#[async_trait]
impl BoardClient for MondayClient {
    #[instrument(skip(self, column_values))]
    async fn create_item(
        &self,
        board_id: &str,
        group_id: Option<&str>,
        item_name: &str,
        column_values: &Value,
    ) -> Result<String, BoardError> {
        let query = "mutation ($boardId: ID!, $groupId: String, $itemName: String!, $columnValues: JSON) { \
                     create_item(board_id: $boardId, group_id: $groupId, item_name: $itemName, \
                     column_values: $columnValues) { id } }";
        let data: CreateItemData = self
            .execute(
                query,
                json!({
                    "boardId": board_id,
                    "groupId": group_id,
                    "itemName": item_name,
                    "columnValues": column_values.to_string(),
                }),
            )
            .await?;
        require_id(data.create_item, "create_item")
    }

    #[instrument(skip(self, column_values))]
    async fn create_subitem(
        &self,
        parent_item_id: &str,
        item_name: &str,
        column_values: Option<&Value>,
    ) -> Result<String, BoardError> {
        let query = "mutation ($parentItemId: ID!, $itemName: String!, $columnValues: JSON) { \
                     create_subitem(parent_item_id: $parentItemId, item_name: $itemName, \
                     column_values: $columnValues) { id } }";
        let data: CreateSubitemData = self
            .execute(
                query,
                json!({
                    "parentItemId": parent_item_id,
                    "itemName": item_name,
                    "columnValues": column_values.map(Value::to_string),
                }),
            )
            .await?;
        require_id(data.create_subitem, "create_subitem")
    }

    #[instrument(skip(self, body))]
    async fn create_update(&self, item_id: &str, body: &str) -> Result<String, BoardError> {
        let query = "mutation ($itemId: ID!, $body: String!) { \
                     create_update(item_id: $itemId, body: $body) { id } }";
        let data: CreateUpdateData = self
            .execute(query, json!({ "itemId": item_id, "body": body }))
            .await?;
        require_id(data.create_update, "create_update")
    }

    #[instrument(skip(self))]
    async fn items(&self, ids: &[String]) -> Result<Vec<BoardItem>, BoardError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!("query ($ids: [ID!]) {{ items(ids: $ids) {{ {ITEM_FIELDS} }} }}");
        let data: ItemsData = self.execute(&query, json!({ "ids": ids })).await?;
        Ok(data.items)
    }

    #[instrument(skip(self))]
    async fn find_items_by_column(
        &self,
        board_id: &str,
        column_id: &str,
        value: &str,
    ) -> Result<Vec<BoardItem>, BoardError> {
        let first = format!(
            "query ($boardId: ID!, $columnId: String!, $value: String!) {{ \
             items_page_by_column_values(limit: {PAGE_LIMIT}, board_id: $boardId, \
             columns: [{{ column_id: $columnId, column_values: [$value] }}]) \
             {{ cursor items {{ {ITEM_FIELDS} }} }} }}"
        );
        let data: ItemsByColumnData = self
            .execute(
                &first,
                json!({ "boardId": board_id, "columnId": column_id, "value": value }),
            )
            .await?;

        let mut items = data.items_page_by_column_values.items;
        let mut cursor = data.items_page_by_column_values.cursor;

        let next = format!(
            "query ($cursor: String!) {{ next_items_page(limit: {PAGE_LIMIT}, cursor: $cursor) \
             {{ cursor items {{ {ITEM_FIELDS} }} }} }}"
        );
        while let Some(current) = cursor.take() {
            debug!(fetched = items.len(), "fetching next board page");
            let page: NextItemsPageData =
                self.execute(&next, json!({ "cursor": current })).await?;
            items.extend(page.next_items_page.items);
            cursor = page.next_items_page.cursor;
        }
        Ok(items)
    }

    #[instrument(skip(self, value))]
    async fn change_column_value(
        &self,
        board_id: &str,
        item_id: &str,
        column_id: &str,
        value: &Value,
    ) -> Result<(), BoardError> {
        let query = "mutation ($boardId: ID!, $itemId: ID!, $columnId: String!, $value: JSON!) { \
                     change_column_value(board_id: $boardId, item_id: $itemId, \
                     column_id: $columnId, value: $value) { id } }";
        let _: ChangeColumnData = self
            .execute(
                query,
                json!({
                    "boardId": board_id,
                    "itemId": item_id,
                    "columnId": column_id,
                    "value": value.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn updates(&self, item_ids: &[String]) -> Result<Vec<BoardUpdate>, BoardError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "query ($ids: [ID!]) {{ items(ids: $ids) {{ id updates(limit: {UPDATES_LIMIT}) \
             {{ id body text_body created_at creator {{ name }} }} }} }}"
        );
        let data: UpdatesData = self.execute(&query, json!({ "ids": item_ids })).await?;
        Ok(data
            .items
            .into_iter()
            .flat_map(|item| {
                let item_id = item.id;
                item.updates.into_iter().map(move |u| BoardUpdate {
                    id: u.id,
                    item_id: item_id.clone(),
                    body: u.body,
                    text_body: u.text_body,
                    created_at: u.created_at,
                    creator_name: u.creator.and_then(|c| c.name),
                })
            })
            .collect())
    }
}
