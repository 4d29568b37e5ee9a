//! Unit-price computation for inventory-affecting events.
//!
//! Two strategies exist, selected per item: last-cost (price follows the
//! most recent still-effective purchase) and weighted average (price is
//! the quantity-weighted mean of still-effective acquisition costs).
//!
//! Create events use the incremental moving-average formula against the
//! stored price. Updates, deletes and restores recompute from scratch by
//! replaying every still-effective cost event, which is what discards a
//! corrupted stored price instead of perpetuating it.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::debug;

use crate::{
    domain::{round_price, DocumentStatus, PriceSource},
    entities::{
        item,
        purchase::{self, Entity as Purchase},
        purchase_line::{self, Entity as PurchaseLine},
        purchase_return::{self, Entity as PurchaseReturn},
        purchase_return_line::{self, Entity as PurchaseReturnLine},
    },
    errors::ServiceError,
    services::price_store,
};

/// One inventory-affecting cost event. Quantity is signed: positive for
/// acquisitions, negative for purchase returns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEvent {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// A committed price movement, old value first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceChange {
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
}

/// Moving-average step:
/// `(existing_qty * existing_price + event_qty * event_cost) / (existing_qty + event_qty)`.
///
/// A zero resulting quantity is not an error; the price falls back to the
/// event's own unit cost (or zero when the event itself nets to zero).
pub fn moving_average(existing_qty: Decimal, existing_price: Decimal, event: CostEvent) -> Decimal {
    let denominator = existing_qty + event.quantity;
    if denominator.is_zero() {
        return if event.quantity.is_zero() {
            Decimal::ZERO
        } else {
            event.unit_cost
        };
    }
    (existing_qty * existing_price + event.quantity * event.unit_cost) / denominator
}

/// Folds cost events, in order, through the moving-average step starting
/// from empty stock. Returns `None` when there are no events to replay.
pub fn fold_events(events: &[CostEvent]) -> Option<Decimal> {
    if events.is_empty() {
        return None;
    }
    let mut quantity = Decimal::ZERO;
    let mut price = Decimal::ZERO;
    for event in events {
        price = moving_average(quantity, price, *event);
        quantity += event.quantity;
    }
    Some(price)
}

/// Recomputes the weighted-average price from scratch: the item's opening
/// stock event plus every still-effective purchase and purchase-return
/// line, ordered by document date with creation order breaking ties.
pub async fn replay_weighted_average<C: ConnectionTrait>(
    db: &C,
    item: &item::Model,
) -> Result<Option<Decimal>, ServiceError> {
    // (doc_date, source rank, header id, line id) keeps the replay order
    // deterministic across the three event sources.
    let mut events: Vec<(NaiveDate, u8, i64, i64, CostEvent)> = Vec::new();

    if item.opening_quantity > Decimal::ZERO {
        events.push((
            item.created_at.date_naive(),
            0,
            0,
            0,
            CostEvent {
                quantity: item.opening_quantity,
                unit_cost: item.opening_price,
            },
        ));
    }

    let purchase_rows = PurchaseLine::find()
        .find_also_related(Purchase)
        .filter(purchase_line::Column::ItemId.eq(item.id))
        .filter(purchase::Column::Status.eq(DocumentStatus::Active.as_ref()))
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    for (line, header) in purchase_rows {
        let header = header.ok_or_else(|| {
            ServiceError::InternalError(format!("Purchase line {} has no header", line.id))
        })?;
        events.push((
            header.doc_date,
            1,
            header.id,
            line.id,
            CostEvent {
                quantity: line.quantity,
                unit_cost: line.unit_cost,
            },
        ));
    }

    let return_rows = PurchaseReturnLine::find()
        .find_also_related(PurchaseReturn)
        .filter(purchase_return_line::Column::ItemId.eq(item.id))
        .filter(purchase_return::Column::Status.eq(DocumentStatus::Active.as_ref()))
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    for (line, header) in return_rows {
        let header = header.ok_or_else(|| {
            ServiceError::InternalError(format!("Purchase return line {} has no header", line.id))
        })?;
        events.push((
            header.doc_date,
            2,
            header.id,
            line.id,
            CostEvent {
                quantity: -line.quantity,
                unit_cost: line.unit_cost,
            },
        ));
    }

    events.sort_by_key(|(date, rank, header_id, line_id, _)| (*date, *rank, *header_id, *line_id));

    let ordered: Vec<CostEvent> = events.into_iter().map(|(_, _, _, _, e)| e).collect();
    Ok(fold_events(&ordered))
}

/// Cost of the chronologically most recent still-effective purchase line
/// for the item, falling back to the opening price when no purchase
/// remains in effect.
pub async fn latest_effective_cost<C: ConnectionTrait>(
    db: &C,
    item: &item::Model,
) -> Result<Option<Decimal>, ServiceError> {
    let latest = PurchaseLine::find()
        .find_also_related(Purchase)
        .filter(purchase_line::Column::ItemId.eq(item.id))
        .filter(purchase::Column::Status.eq(DocumentStatus::Active.as_ref()))
        .order_by_desc(purchase::Column::DocDate)
        .order_by_desc(purchase_line::Column::PurchaseId)
        .order_by_desc(purchase_line::Column::Id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if let Some((line, _)) = latest {
        return Ok(Some(line.unit_cost));
    }

    if item.opening_quantity > Decimal::ZERO && item.opening_price > Decimal::ZERO {
        return Ok(Some(item.opening_price));
    }

    Ok(None)
}

/// Writes a newly computed price and its history entry. Skips both writes
/// when the price is unchanged at the stored precision, so no-op changes
/// leave neither a price-row touch nor a history entry behind.
pub async fn apply_price_change<C: ConnectionTrait>(
    db: &C,
    item_id: i64,
    new_price: Decimal,
    effective_date: NaiveDate,
    source_type: PriceSource,
    source_id: Option<i64>,
    note: Option<String>,
) -> Result<Option<PriceChange>, ServiceError> {
    let old_price = price_store::get_current_price(db, item_id).await?;
    let new_rounded = round_price(new_price);

    if old_price.map(round_price) == Some(new_rounded) {
        return Ok(None);
    }

    price_store::set_price(db, item_id, new_rounded, effective_date).await?;
    price_store::append_history(
        db,
        item_id,
        old_price,
        new_rounded,
        source_type,
        source_id,
        note,
    )
    .await?;

    debug!(
        item_id,
        old = ?old_price,
        new = %new_rounded,
        source = source_type.as_ref(),
        "Item price changed"
    );

    Ok(Some(PriceChange {
        old_price,
        new_price: new_rounded,
    }))
}

/// Re-derives the item's price after an update, delete or restore, from
/// the full current state of its still-effective cost events. When no
/// event remains in effect the stored price is left untouched.
pub async fn reprice_after_mutation<C: ConnectionTrait>(
    db: &C,
    item: &item::Model,
    effective_date: NaiveDate,
    source_type: PriceSource,
    source_id: Option<i64>,
    note: Option<String>,
) -> Result<Option<PriceChange>, ServiceError> {
    let method = item.costing().map_err(|_| {
        ServiceError::InternalError(format!(
            "Item {} has unknown costing method {:?}",
            item.id, item.costing_method
        ))
    })?;

    let computed = match method {
        crate::domain::CostingMethod::LastCost => latest_effective_cost(db, item).await?,
        crate::domain::CostingMethod::WeightedAverage => replay_weighted_average(db, item).await?,
    };

    match computed {
        Some(price) => {
            apply_price_change(db, item.id, price, effective_date, source_type, source_id, note)
                .await
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event(quantity: Decimal, unit_cost: Decimal) -> CostEvent {
        CostEvent {
            quantity,
            unit_cost,
        }
    }

    #[test]
    fn moving_average_blends_by_quantity() {
        let price = moving_average(dec!(50), dec!(100), event(dec!(50), dec!(120)));
        assert_eq!(round_price(price), dec!(110.00));

        let price = moving_average(dec!(30), dec!(50), event(dec!(70), dec!(70)));
        assert_eq!(round_price(price), dec!(64.00));
    }

    #[test]
    fn moving_average_handles_zero_resulting_quantity() {
        // Returning the full stock nets to zero; price falls back to the
        // event's own cost instead of dividing by zero.
        let price = moving_average(dec!(10), dec!(50), event(dec!(-10), dec!(50)));
        assert_eq!(price, dec!(50));

        let price = moving_average(Decimal::ZERO, Decimal::ZERO, event(Decimal::ZERO, dec!(5)));
        assert_eq!(price, Decimal::ZERO);
    }

    #[test]
    fn fold_events_replays_in_order() {
        let events = [
            event(dec!(50), dec!(100)),
            event(dec!(50), dec!(120)),
        ];
        assert_eq!(fold_events(&events).map(round_price), Some(dec!(110.00)));

        let events = [
            event(dec!(60), dec!(100)),
            event(dec!(40), dec!(130)),
        ];
        assert_eq!(fold_events(&events).map(round_price), Some(dec!(112.00)));
    }

    #[test]
    fn fold_events_restarts_after_stock_reaches_zero() {
        let events = [
            event(dec!(10), dec!(40)),
            event(dec!(-10), dec!(40)),
            event(dec!(5), dec!(90)),
        ];
        assert_eq!(fold_events(&events).map(round_price), Some(dec!(90.00)));
    }

    #[test]
    fn fold_events_empty_is_none() {
        assert_eq!(fold_events(&[]), None);
    }
}
