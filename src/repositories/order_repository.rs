use async_trait::async_trait;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::order_subitem::{
    ActiveModel as SubitemActiveModel, Column as SubitemColumn, Entity as SubitemEntity,
};
use crate::entities::textbook_order::{
    ActiveModel as OrderActiveModel, Column, Entity as OrderEntity, Model as OrderModel,
};
use crate::errors::ServiceError;
use crate::models::{LinkStatus, Order, OrderStatus};

use super::OrderStore;

/// Unique violations (order id, source board item, live student slot) become conflicts.
fn conflict_or_db(order_id: Uuid) -> impl FnOnce(DbErr) -> ServiceError {
    move |e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => ServiceError::Conflict(format!(
            "Order {} conflicts with a stored order: {}",
            order_id, detail
        )),
        _ => ServiceError::DatabaseError(e),
    }
}

/// `sea-orm` backed order store over the `textbook_orders` table.
#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_active_model(order: &Order, version: i32) -> Result<OrderActiveModel, ServiceError> {
        let mut document = order.clone();
        document.version = version;
        Ok(OrderActiveModel {
            id: Set(order.id),
            user_id: Set(order.user_id),
            student_id: Set(order.student_id),
            school_year: Set(order.school_year),
            status: Set(order.status.to_string()),
            link_status: Set(order.link_status.map(|s| s.to_string())),
            source_board_item_id: Set(order
                .presale
                .as_ref()
                .map(|p| p.source_board_item_id.clone())),
            live_key: Set(order.live_key()),
            document: Set(serde_json::to_value(&document)?),
            version: Set(version),
            created_at: Set(order.created_at),
            updated_at: Set(order.updated_at),
        })
    }

    fn from_model(model: OrderModel) -> Result<Order, ServiceError> {
        let mut order: Order = serde_json::from_value(model.document)?;
        order.version = model.version;
        Ok(order)
    }

    fn from_models(models: Vec<OrderModel>) -> Result<Vec<Order>, ServiceError> {
        models.into_iter().map(Self::from_model).collect()
    }

    /// Records every subitem of `order` in `order_subitems`. Existing rows are kept.
    async fn index_subitems<C: ConnectionTrait>(conn: &C, order: &Order) -> Result<(), DbErr> {
        let rows: Vec<SubitemActiveModel> = order
            .subitem_ids()
            .into_iter()
            .map(|subitem_id| SubitemActiveModel {
                subitem_id: Set(subitem_id.to_string()),
                order_id: Set(order.id),
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        SubitemEntity::insert_many(rows)
            .on_conflict(
                OnConflict::column(SubitemColumn::SubitemId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    async fn insert(&self, order: &Order) -> Result<Order, ServiceError> {
        if let Some(student_id) = order.student_id {
            if let Some(existing) = self
                .find_by_student_year(student_id, order.school_year)
                .await?
            {
                if existing.status != OrderStatus::Cancelled {
                    return Err(ServiceError::Conflict(format!(
                        "Student {} already has order {} for {}",
                        student_id, existing.id, order.school_year
                    )));
                }
            }
        }

        let txn = self.db.begin().await?;
        let model = Self::to_active_model(order, 0)?
            .insert(&txn)
            .await
            .map_err(conflict_or_db(order.id))?;
        Self::index_subitems(&txn, order).await?;
        txn.commit().await?;
        Self::from_model(model)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        OrderEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Self::from_model)
            .transpose()
    }

    async fn update(&self, order: &Order) -> Result<Order, ServiceError> {
        let next_version = order.version + 1;
        let active = Self::to_active_model(order, next_version)?;

        let txn = self.db.begin().await?;
        let result = OrderEntity::update_many()
            .set(active)
            .filter(Column::Id.eq(order.id))
            .filter(Column::Version.eq(order.version))
            .exec(&txn)
            .await
            .map_err(conflict_or_db(order.id))?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            let exists = OrderEntity::find_by_id(order.id)
                .one(self.db.as_ref())
                .await?
                .is_some();
            return Err(if exists {
                ServiceError::ConcurrentModification(order.id)
            } else {
                ServiceError::NotFound(format!("Order {} not found", order.id))
            });
        }

        Self::index_subitems(&txn, order).await?;
        txn.commit().await?;

        let mut saved = order.clone();
        saved.version = next_version;
        Ok(saved)
    }

    async fn find_by_student_year(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Order>, ServiceError> {
        let models = OrderEntity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::SchoolYear.eq(school_year))
            .order_by_desc(Column::UpdatedAt)
            .all(self.db.as_ref())
            .await?;

        let cancelled = OrderStatus::Cancelled.to_string();
        let preferred = models
            .iter()
            .position(|m| m.status != cancelled)
            .unwrap_or(0);
        models
            .into_iter()
            .nth(preferred)
            .map(Self::from_model)
            .transpose()
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        let models = OrderEntity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::SchoolYear)
            .order_by_desc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Self::from_models(models)
    }

    async fn find_by_subitem(&self, subitem_id: &str) -> Result<Option<Order>, ServiceError> {
        let Some(row) = SubitemEntity::find_by_id(subitem_id.to_string())
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };
        self.get(row.order_id).await
    }

    async fn find_by_source_item(
        &self,
        board_item_id: &str,
    ) -> Result<Option<Order>, ServiceError> {
        OrderEntity::find()
            .filter(Column::SourceBoardItemId.eq(board_item_id))
            .one(self.db.as_ref())
            .await?
            .map(Self::from_model)
            .transpose()
    }

    async fn list_unlinked(&self) -> Result<Vec<Order>, ServiceError> {
        let models = OrderEntity::find()
            .filter(Column::LinkStatus.eq(LinkStatus::Unlinked.to_string()))
            .filter(Column::Status.ne(OrderStatus::Cancelled.to_string()))
            .order_by_asc(Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Self::from_models(models)
    }
}
