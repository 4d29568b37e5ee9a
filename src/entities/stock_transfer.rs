use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inter-warehouse transfer header. Transfers move quantity between two
/// ledgers atomically and never touch prices.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_transfers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub from_warehouse_id: i32,
    pub to_warehouse_id: i32,
    pub doc_date: Date,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_transfer_line::Entity")]
    StockTransferLines,
}

impl Related<super::stock_transfer_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockTransferLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
