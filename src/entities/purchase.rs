use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Purchase document header. `status` is the explicit lifecycle state
/// (active or deleted); a deleted purchase keeps its lines for restore.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub warehouse_id: i32,
    pub supplier_id: Option<i64>,
    pub doc_date: Date,
    pub currency: String,
    pub status: String,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_line::Entity")]
    PurchaseLines,
}

impl Related<super::purchase_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
