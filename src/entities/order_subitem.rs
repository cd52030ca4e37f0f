use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board subitem id to the order that tracks it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_subitems")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub subitem_id: String,
    pub order_id: Uuid,
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
