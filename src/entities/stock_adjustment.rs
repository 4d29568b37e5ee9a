use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::AdjustmentType;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub warehouse_id: i32,
    pub adjustment_type: String,
    pub reason: Option<String>,
    pub doc_date: Date,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_adjustment_line::Entity")]
    StockAdjustmentLines,
}

impl Related<super::stock_adjustment_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockAdjustmentLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn adjustment(&self) -> Result<AdjustmentType, strum::ParseError> {
        self.adjustment_type.parse()
    }
}
