//! Line-item diffing for document updates, and the purchase floor check.
//!
//! An update's incoming line set determines the target ledger state. The
//! diff is keyed on explicit line ids: a present id is an update target,
//! an absent id a new line, and an existing id missing from the incoming
//! set a full reversal. A line that keeps its id but switches item is a
//! removal plus an addition, never a blind re-application.

use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, EntityTrait};
use std::collections::{HashMap, HashSet};

use crate::{
    entities::item::Entity as Item,
    errors::ServiceError,
    services::stock_ledger,
};

/// Normalized view of one document line: quantity plus the per-unit
/// amount the document carries (cost or price depending on the kind).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineState {
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_amount: Decimal,
}

/// Outcome of diffing one line between the previous and requested state.
#[derive(Debug, Clone, PartialEq)]
pub enum LineChange {
    Added {
        incoming: LineState,
    },
    Updated {
        line_id: i64,
        previous: LineState,
        incoming: LineState,
    },
    Removed {
        line_id: i64,
        previous: LineState,
    },
}

/// Diffs existing lines against the requested set.
///
/// `existing` maps stored line ids to their current state; `incoming`
/// carries an id only for lines that should update an existing row.
pub fn diff_lines(
    existing: &[(i64, LineState)],
    incoming: &[(Option<i64>, LineState)],
) -> Result<Vec<LineChange>, ServiceError> {
    let known: HashMap<i64, LineState> = existing.iter().cloned().collect();
    let mut seen: HashSet<i64> = HashSet::new();
    let mut changes = Vec::new();

    for (id, state) in incoming {
        match id {
            Some(line_id) => {
                let previous = known.get(line_id).ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Line {} does not belong to this document",
                        line_id
                    ))
                })?;
                if !seen.insert(*line_id) {
                    return Err(ServiceError::ValidationError(format!(
                        "Line {} appears more than once",
                        line_id
                    )));
                }
                if previous.item_id == state.item_id {
                    changes.push(LineChange::Updated {
                        line_id: *line_id,
                        previous: *previous,
                        incoming: *state,
                    });
                } else {
                    changes.push(LineChange::Removed {
                        line_id: *line_id,
                        previous: *previous,
                    });
                    changes.push(LineChange::Added { incoming: *state });
                }
            }
            None => changes.push(LineChange::Added { incoming: *state }),
        }
    }

    for (line_id, previous) in existing {
        if !seen.contains(line_id) {
            changes.push(LineChange::Removed {
                line_id: *line_id,
                previous: *previous,
            });
        }
    }

    Ok(changes)
}

/// Rejects purchase-line removals or reductions that would drive the
/// (item, warehouse) ledger negative: that stock may already have been
/// consumed by later sales, transfers or adjustments.
///
/// Runs before any ledger mutation so a violation aborts the whole
/// update with no partial effect. Only purchase-decreasing edits are
/// checked; sales, returns, adjustments and transfers have no floor.
pub async fn assert_purchase_floor<C: ConnectionTrait>(
    db: &C,
    warehouse_id: i32,
    changes: &[LineChange],
) -> Result<(), ServiceError> {
    for change in changes {
        let (previous, new_quantity, removed) = match change {
            LineChange::Removed { previous, .. } => (previous, Decimal::ZERO, true),
            LineChange::Updated {
                previous, incoming, ..
            } if incoming.quantity < previous.quantity => (previous, incoming.quantity, false),
            _ => continue,
        };

        let reduction = previous.quantity - new_quantity;
        let current = stock_ledger::get_quantity(db, previous.item_id, warehouse_id).await?;
        if current - reduction < Decimal::ZERO {
            let name = item_name(db, previous.item_id).await?;
            let consumed = previous.quantity - current;
            let verb = if removed { "remove" } else { "reduce" };
            return Err(ServiceError::InsufficientStock(format!(
                "Cannot {} {}: purchased {} units but only {} units remain ({} already sold/used)",
                verb, name, previous.quantity, current, consumed
            )));
        }
    }

    Ok(())
}

async fn item_name<C: ConnectionTrait>(db: &C, item_id: i64) -> Result<String, ServiceError> {
    let item = Item::find_by_id(item_id)
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)?;
    Ok(item
        .map(|i| i.name)
        .unwrap_or_else(|| format!("item {}", item_id)))
}
