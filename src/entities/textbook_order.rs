use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Row of `textbook_orders`. Lines, submissions and board ids live in `document`;
/// the scalar columns are kept in step with it for lookups.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "textbook_orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub school_year: i32,
    pub status: String,
    pub link_status: Option<String>,
    pub source_board_item_id: Option<String>,
    /// `"{student_id}:{school_year}"` while the order is live, unique.
    pub live_key: Option<String>,
    pub document: Json,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::link_suggestion::Entity")]
    LinkSuggestions,
    #[sea_orm(has_many = "super::order_subitem::Entity")]
    OrderSubitems,
}

impl Related<super::link_suggestion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LinkSuggestions.def()
    }
}

impl Related<super::order_subitem::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderSubitems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
