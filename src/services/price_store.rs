//! Global per-item price row plus the append-only price history log.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait, EntityTrait};
use tracing::debug;

use crate::{
    domain::{round_price, PriceSource},
    entities::{
        item_price::{self, Entity as ItemPrice},
        item_price_history,
    },
    errors::ServiceError,
};

/// Returns the item's current global unit price, if one has been set.
pub async fn get_current_price<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
) -> Result<Option<Decimal>, ServiceError> {
    let row = ItemPrice::find_by_id(item_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;
    Ok(row.map(|r| r.price_usd))
}

/// Upserts the single global price row for an item. The stored value is
/// rounded to the price precision.
pub async fn set_price<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    new_price: Decimal,
    effective_date: NaiveDate,
) -> Result<item_price::Model, ServiceError> {
    let rounded = round_price(new_price);
    let existing = ItemPrice::find_by_id(item_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let saved = match existing {
        Some(row) => {
            let mut active: item_price::ActiveModel = row.into();
            active.price_usd = Set(rounded);
            active.effective_date = Set(effective_date);
            active.updated_at = Set(Utc::now().into());
            active.update(db).await.map_err(ServiceError::DatabaseError)?
        }
        None => {
            let now = Utc::now();
            let row = item_price::ActiveModel {
                item_id: Set(item_id),
                price_usd: Set(rounded),
                effective_date: Set(effective_date),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            };
            row.insert(db).await.map_err(ServiceError::DatabaseError)?
        }
    };

    debug!(item_id, price = %saved.price_usd, "Item price stored");
    Ok(saved)
}

/// Appends a price-history entry with its provenance. Returns `false`
/// without inserting when the price did not actually change at the stored
/// precision; no-op changes must not pollute the audit trail.
pub async fn append_history<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    old_price: Option<Decimal>,
    new_price: Decimal,
    source_type: PriceSource,
    source_id: Option<i64>,
    note: Option<String>,
) -> Result<bool, ServiceError> {
    let new_rounded = round_price(new_price);
    if old_price.map(round_price) == Some(new_rounded) {
        return Ok(false);
    }

    let entry = item_price_history::ActiveModel {
        item_id: Set(item_id),
        old_price: Set(old_price.map(round_price)),
        new_price: Set(new_rounded),
        source_type: Set(source_type.as_ref().to_string()),
        source_id: Set(source_id),
        note: Set(note),
        created_at: Set(Utc::now().into()),
        ..Default::default()
    };

    entry.insert(db).await.map_err(ServiceError::DatabaseError)?;
    Ok(true)
}
