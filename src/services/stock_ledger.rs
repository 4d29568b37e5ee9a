//! Per (item, warehouse) quantity ledger.
//!
//! Every function is generic over [`ConnectionTrait`] so callers can run
//! ledger reads and writes inside their own transaction; a ledger write
//! must be visible to the costing computation that follows it within the
//! same unit of work.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use tracing::debug;

use crate::{
    entities::stock_entry::{self, Entity as StockEntry},
    errors::ServiceError,
};

/// Returns the current quantity for an (item, warehouse) pair, zero when
/// no ledger row exists yet.
pub async fn get_quantity<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    warehouse_id: i32,
) -> Result<Decimal, ServiceError> {
    let entry = find_entry(db, item_id, warehouse_id).await?;
    Ok(entry.map(|e| e.quantity).unwrap_or(Decimal::ZERO))
}

/// Applies a signed delta to the (item, warehouse) ledger row, creating a
/// zero-initialized row first when absent. No floor is enforced here; the
/// reconciler rejects invalid reductions before any ledger write happens.
pub async fn adjust<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    warehouse_id: i32,
    delta: Decimal,
) -> Result<stock_entry::Model, ServiceError> {
    let entry = find_entry(db, item_id, warehouse_id).await?;

    let updated = match entry {
        Some(existing) => {
            let new_quantity = existing.quantity + delta;
            let mut active: stock_entry::ActiveModel = existing.into();
            active.quantity = Set(new_quantity);
            active.updated_at = Set(Utc::now().into());
            active.update(db).await.map_err(ServiceError::DatabaseError)?
        }
        None => {
            let now = Utc::now();
            let new_entry = stock_entry::ActiveModel {
                item_id: Set(item_id),
                warehouse_id: Set(warehouse_id),
                quantity: Set(delta),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            };
            new_entry
                .insert(db)
                .await
                .map_err(ServiceError::DatabaseError)?
        }
    };

    debug!(
        item_id,
        warehouse_id,
        delta = %delta,
        quantity = %updated.quantity,
        "Stock ledger adjusted"
    );

    Ok(updated)
}

/// Sums the item's quantity across every warehouse. Reads the current
/// state of the caller's transaction, including uncommitted adjustments.
pub async fn sum_across_warehouses<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
) -> Result<Decimal, ServiceError> {
    let entries = StockEntry::find()
        .filter(stock_entry::Column::ItemId.eq(item_id))
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(entries.iter().map(|e| e.quantity).sum())
}

async fn find_entry<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    warehouse_id: i32,
) -> Result<Option<stock_entry::Model>, ServiceError> {
    StockEntry::find()
        .filter(stock_entry::Column::ItemId.eq(item_id))
        .filter(stock_entry::Column::WarehouseId.eq(warehouse_id))
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)
}
