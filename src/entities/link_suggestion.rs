use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "link_suggestions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub student_id: Uuid,
    pub user_id: Uuid,
    pub student_name: String,
    pub board_student_name: String,
    pub score: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::textbook_order::Entity",
        from = "Column::OrderId",
        to = "super::textbook_order::Column::Id"
    )]
    TextbookOrder,
}

impl Related<super::textbook_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TextbookOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
