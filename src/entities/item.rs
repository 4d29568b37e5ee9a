use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::CostingMethod;

/// Item master record. `costing_method` selects the pricing strategy;
/// the `opening_*` columns preserve the item-creation inventory event so
/// price recomputation can replay it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    pub costing_method: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub opening_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub opening_price: Decimal,
    pub opening_warehouse_id: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_entry::Entity")]
    StockEntries,
    #[sea_orm(has_one = "super::item_price::Entity")]
    ItemPrice,
    #[sea_orm(has_many = "super::item_price_history::Entity")]
    ItemPriceHistory,
}

impl Related<super::stock_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockEntries.def()
    }
}

impl Related<super::item_price::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItemPrice.def()
    }
}

impl Related<super::item_price_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItemPriceHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parses the stored costing strategy flag.
    pub fn costing(&self) -> Result<CostingMethod, strum::ParseError> {
        self.costing_method.parse()
    }
}
