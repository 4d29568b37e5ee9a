use sea_orm::{ConnectionTrait, EntityTrait};

use crate::{entities::item, errors::ServiceError};

pub mod costing;
pub mod customer_returns;
pub mod items;
pub mod price_store;
pub mod purchase_returns;
pub mod purchases;
pub mod reconciler;
pub mod sales;
pub mod stock_adjustments;
pub mod stock_ledger;
pub mod stock_transfers;

/// Loads an item or fails with a NotFound naming it.
pub(crate) async fn load_item<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
) -> Result<item::Model, ServiceError> {
    item::Entity::find_by_id(item_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}
