use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Purchase return header, optionally referencing the originating purchase.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_returns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub purchase_id: Option<i64>,
    pub warehouse_id: i32,
    pub doc_date: Date,
    pub currency: String,
    pub status: String,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_return_line::Entity")]
    PurchaseReturnLines,
}

impl Related<super::purchase_return_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseReturnLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
