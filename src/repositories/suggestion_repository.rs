use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::link_suggestion::{
    ActiveModel as SuggestionActiveModel, Column, Entity as SuggestionEntity,
    Model as SuggestionModel,
};
use crate::errors::ServiceError;
use crate::models::{LinkSuggestion, SuggestionStatus};

use super::SuggestionStore;

#[derive(Debug, Clone)]
pub struct SeaOrmSuggestionStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmSuggestionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn to_active_model(suggestion: &LinkSuggestion) -> SuggestionActiveModel {
    SuggestionActiveModel {
        id: Set(suggestion.id),
        order_id: Set(suggestion.order_id),
        student_id: Set(suggestion.student_id),
        user_id: Set(suggestion.user_id),
        student_name: Set(suggestion.student_name.clone()),
        board_student_name: Set(suggestion.board_student_name.clone()),
        score: Set(suggestion.score),
        status: Set(suggestion.status.to_string()),
        created_at: Set(suggestion.created_at),
        resolved_at: Set(suggestion.resolved_at),
        resolved_by: Set(suggestion.resolved_by),
    }
}

fn from_model(model: SuggestionModel) -> Result<LinkSuggestion, ServiceError> {
    let status = SuggestionStatus::from_str(&model.status).map_err(|_| {
        ServiceError::SerializationError(format!(
            "unknown suggestion status '{}' on {}",
            model.status, model.id
        ))
    })?;
    Ok(LinkSuggestion {
        id: model.id,
        order_id: model.order_id,
        student_id: model.student_id,
        user_id: model.user_id,
        student_name: model.student_name,
        board_student_name: model.board_student_name,
        score: model.score,
        status,
        created_at: model.created_at,
        resolved_at: model.resolved_at,
        resolved_by: model.resolved_by,
    })
}

#[async_trait]
impl SuggestionStore for SeaOrmSuggestionStore {
    async fn insert(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError> {
        to_active_model(suggestion).insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LinkSuggestion>, ServiceError> {
        SuggestionEntity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(from_model)
            .transpose()
    }

    async fn update(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError> {
        to_active_model(suggestion).update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn find_for_pair(
        &self,
        order_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<LinkSuggestion>, ServiceError> {
        SuggestionEntity::find()
            .filter(Column::OrderId.eq(order_id))
            .filter(Column::StudentId.eq(student_id))
            .order_by_desc(Column::CreatedAt)
            .one(self.db.as_ref())
            .await?
            .map(from_model)
            .transpose()
    }

    async fn pending_for_order(&self, order_id: Uuid) -> Result<Vec<LinkSuggestion>, ServiceError> {
        SuggestionEntity::find()
            .filter(Column::OrderId.eq(order_id))
            .filter(Column::Status.eq(SuggestionStatus::Pending.to_string()))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    async fn list_pending(&self) -> Result<Vec<LinkSuggestion>, ServiceError> {
        SuggestionEntity::find()
            .filter(Column::Status.eq(SuggestionStatus::Pending.to_string()))
            .order_by_desc(Column::Score)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }
}
