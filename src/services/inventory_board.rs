use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::board::columns;
use crate::board::{BoardClient, BoardError};
use crate::config::InventoryBoardConfig;
use crate::models::SubmissionLine;

/// Result of mirroring a batch onto the inventory board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryMirrorReport {
    pub subitems_created: usize,
    pub failed: usize,
}

/// Mirrors ordered lines onto the inventory board: one item per book code and
/// one new subitem per student order under it.
pub struct InventoryBoardService {
    client: Arc<dyn BoardClient>,
    config: InventoryBoardConfig,
    /// book code -> inventory item id
    item_ids: DashMap<String, String>,
}

impl InventoryBoardService {
    pub fn new(client: Arc<dyn BoardClient>, config: InventoryBoardConfig) -> Self {
        Self {
            client,
            config,
            item_ids: DashMap::new(),
        }
    }

    async fn item_for(&self, line: &SubmissionLine) -> Result<String, BoardError> {
        if let Some(id) = self.item_ids.get(&line.book_code) {
            return Ok(id.clone());
        }

        let existing = self
            .client
            .find_items_by_column(&self.config.board_id, &self.config.code_column, &line.book_code)
            .await?;
        let id = match existing.into_iter().next() {
            Some(item) => item.id,
            None => {
                let id = self
                    .client
                    .create_item(
                        &self.config.board_id,
                        self.config.group_id.as_deref(),
                        &format!("{} - {}", line.book_code, line.book_name),
                        &columns::inventory_item_columns(&self.config, &line.book_code),
                    )
                    .await?;
                info!(book_code = %line.book_code, item_id = %id, "created inventory board item");
                id
            }
        };
        self.item_ids.insert(line.book_code.clone(), id.clone());
        Ok(id)
    }

    /// Adds one subitem per line. Failures are logged and counted.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn record_order_lines(
        &self,
        student_name: &str,
        lines: &[SubmissionLine],
    ) -> InventoryMirrorReport {
        let mut report = InventoryMirrorReport::default();
        for line in lines {
            let item_id = match self.item_for(line).await {
                Ok(id) => id,
                Err(e) => {
                    warn!(book_code = %line.book_code, error = %e, "inventory item lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            let subitem_columns =
                columns::inventory_subitem_columns(&self.config, student_name, line.quantity);
            match self
                .client
                .create_subitem(&item_id, student_name, subitem_columns.as_ref())
                .await
            {
                Ok(_) => report.subitems_created += 1,
                Err(e) => {
                    warn!(book_code = %line.book_code, error = %e, "inventory subitem failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
