use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer return header. Inventory is only affected once `received`
/// flips to true; creation and approval are ledger-neutral.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customer_returns")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub sale_id: Option<i64>,
    pub warehouse_id: i32,
    pub doc_date: Date,
    pub status: String,
    pub approval_status: String,
    pub received: bool,
    pub received_at: Option<DateTimeWithTimeZone>,
    pub received_by: Option<String>,
    pub received_note: Option<String>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::customer_return_line::Entity")]
    CustomerReturnLines,
}

impl Related<super::customer_return_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CustomerReturnLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
