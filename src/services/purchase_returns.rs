use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    domain::{ensure_non_negative, ensure_positive, CostingMethod, DocumentStatus, PriceSource},
    entities::purchase_return::{self, Entity as PurchaseReturn},
    entities::purchase_return_line::{self, Entity as PurchaseReturnLine},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        costing::{self, CostEvent, PriceChange},
        load_item,
        reconciler::{self, LineChange, LineState},
        stock_ledger,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PurchaseReturnInput {
    pub purchase_id: Option<i64>,
    pub warehouse_id: i32,
    pub doc_date: NaiveDate,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub lines: Vec<PurchaseReturnLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PurchaseReturnLineInput {
    pub id: Option<i64>,
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Coordinator for purchase returns: the mirror of a purchase with
/// inverted ledger sign. Weighted-average prices move in either
/// direction; last-cost prices never move on a return.
#[derive(Clone)]
pub struct PurchaseReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl PurchaseReturnService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id))]
    pub async fn create(
        &self,
        input: PurchaseReturnInput,
    ) -> Result<purchase_return::Model, ServiceError> {
        input.validate()?;
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_cost", line.unit_cost)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = purchase_return::ActiveModel {
            purchase_id: Set(input.purchase_id),
            warehouse_id: Set(input.warehouse_id),
            doc_date: Set(input.doc_date),
            currency: Set(input.currency.clone()),
            status: Set(DocumentStatus::Active.as_ref().to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let mut price_changes: Vec<(i64, PriceChange)> = Vec::new();

        for line in &input.lines {
            let item = load_item(&txn, line.item_id).await?;
            let method = item.costing().map_err(|_| {
                ServiceError::InternalError(format!(
                    "Item {} has unknown costing method {:?}",
                    item.id, item.costing_method
                ))
            })?;

            let quantity_before = stock_ledger::sum_across_warehouses(&txn, item.id).await?;

            insert_line(&txn, header.id, line).await?;
            stock_ledger::adjust(&txn, item.id, input.warehouse_id, -line.quantity).await?;

            // Returning stock removes its cost weight from the average;
            // last-cost items keep their price on returns.
            if method == CostingMethod::WeightedAverage {
                let price_before = crate::services::price_store::get_current_price(&txn, item.id)
                    .await?
                    .unwrap_or(Decimal::ZERO);
                let new_price = costing::moving_average(
                    quantity_before,
                    price_before,
                    CostEvent {
                        quantity: -line.quantity,
                        unit_cost: line.unit_cost,
                    },
                );
                if let Some(change) = costing::apply_price_change(
                    &txn,
                    item.id,
                    new_price,
                    input.doc_date,
                    PriceSource::PurchaseReturn,
                    Some(header.id),
                    None,
                )
                .await?
                {
                    price_changes.push((item.id, change));
                }
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            purchase_return_id = header.id,
            lines = input.lines.len(),
            "Purchase return created"
        );
        self.notify(Event::PurchaseReturnCreated(header.id), &price_changes)
            .await;

        Ok(header)
    }

    /// Diffs the requested line set against the stored one and applies
    /// the net inverted deltas. Returns have no floor check; only
    /// purchase-decreasing edits are constrained by consumption.
    #[instrument(skip(self, lines))]
    pub async fn update(
        &self,
        return_id: i64,
        lines: Vec<PurchaseReturnLineInput>,
    ) -> Result<purchase_return::Model, ServiceError> {
        for line in &lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_cost", line.unit_cost)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;
        let existing = PurchaseReturnLine::find()
            .filter(purchase_return_line::Column::PurchaseReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let previous: Vec<(i64, LineState)> = existing
            .iter()
            .map(|l| {
                (
                    l.id,
                    LineState {
                        item_id: l.item_id,
                        quantity: l.quantity,
                        unit_amount: l.unit_cost,
                    },
                )
            })
            .collect();
        let incoming: Vec<(Option<i64>, LineState)> = lines
            .iter()
            .map(|l| {
                (
                    l.id,
                    LineState {
                        item_id: l.item_id,
                        quantity: l.quantity,
                        unit_amount: l.unit_cost,
                    },
                )
            })
            .collect();

        let changes = reconciler::diff_lines(&previous, &incoming)?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for change in &changes {
            match change {
                LineChange::Added { incoming } => {
                    load_item(&txn, incoming.item_id).await?;
                    insert_line(
                        &txn,
                        return_id,
                        &PurchaseReturnLineInput {
                            id: None,
                            item_id: incoming.item_id,
                            quantity: incoming.quantity,
                            unit_cost: incoming.unit_amount,
                        },
                    )
                    .await?;
                    stock_ledger::adjust(
                        &txn,
                        incoming.item_id,
                        header.warehouse_id,
                        -incoming.quantity,
                    )
                    .await?;
                    affected.insert(incoming.item_id);
                }
                LineChange::Updated {
                    line_id,
                    previous,
                    incoming,
                } => {
                    update_line(&txn, *line_id, incoming).await?;
                    let delta = -(incoming.quantity - previous.quantity);
                    if !delta.is_zero() {
                        stock_ledger::adjust(&txn, incoming.item_id, header.warehouse_id, delta)
                            .await?;
                    }
                    affected.insert(incoming.item_id);
                }
                LineChange::Removed { line_id, previous } => {
                    PurchaseReturnLine::delete_by_id(*line_id)
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                    stock_ledger::adjust(
                        &txn,
                        previous.item_id,
                        header.warehouse_id,
                        previous.quantity,
                    )
                    .await?;
                    affected.insert(previous.item_id);
                }
            }
        }

        let price_changes = reprice_weighted_items(
            &txn,
            &affected,
            header.doc_date,
            Some(return_id),
            None,
        )
        .await?;

        let header = touch_header(&txn, header, DocumentStatus::Active, false).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_return_id = return_id, "Purchase return updated");
        self.notify(Event::PurchaseReturnUpdated(return_id), &price_changes)
            .await;

        Ok(header)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, return_id: i64) -> Result<purchase_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;
        let lines = PurchaseReturnLine::find()
            .filter(purchase_return_line::Column::PurchaseReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, line.quantity).await?;
            affected.insert(line.item_id);
        }

        let header = touch_header(&txn, header, DocumentStatus::Deleted, true).await?;

        let price_changes = reprice_weighted_items(
            &txn,
            &affected,
            header.doc_date,
            Some(return_id),
            Some("purchase return deleted".to_string()),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_return_id = return_id, "Purchase return deleted");
        self.notify(Event::PurchaseReturnDeleted(return_id), &price_changes)
            .await;

        Ok(header)
    }

    #[instrument(skip(self))]
    pub async fn restore(&self, return_id: i64) -> Result<purchase_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_deleted(&txn, return_id).await?;
        let lines = PurchaseReturnLine::find()
            .filter(purchase_return_line::Column::PurchaseReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, -line.quantity).await?;
            affected.insert(line.item_id);
        }

        let header = touch_header(&txn, header, DocumentStatus::Active, true).await?;

        let price_changes = reprice_weighted_items(
            &txn,
            &affected,
            header.doc_date,
            Some(return_id),
            Some("purchase return restored".to_string()),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_return_id = return_id, "Purchase return restored");
        self.notify(Event::PurchaseReturnRestored(return_id), &price_changes)
            .await;

        Ok(header)
    }

    pub async fn get(&self, return_id: i64) -> Result<purchase_return::Model, ServiceError> {
        PurchaseReturn::find_by_id(return_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase return {} not found", return_id))
            })
    }

    async fn notify(&self, event: Event, price_changes: &[(i64, PriceChange)]) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event).await;
            for (item_id, change) in price_changes {
                let _ = sender
                    .send(Event::ItemPriceChanged {
                        item_id: *item_id,
                        old_price: change.old_price,
                        new_price: change.new_price,
                    })
                    .await;
            }
        }
    }
}

async fn find_active(
    txn: &DatabaseTransaction,
    return_id: i64,
) -> Result<purchase_return::Model, ServiceError> {
    let header = PurchaseReturn::find_by_id(return_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase return {} not found", return_id)))?;
    if header.status != DocumentStatus::Active.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Purchase return {} is deleted",
            return_id
        )));
    }
    Ok(header)
}

async fn find_deleted(
    txn: &DatabaseTransaction,
    return_id: i64,
) -> Result<purchase_return::Model, ServiceError> {
    let header = PurchaseReturn::find_by_id(return_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase return {} not found", return_id)))?;
    if header.status != DocumentStatus::Deleted.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Purchase return {} is not deleted",
            return_id
        )));
    }
    Ok(header)
}

async fn insert_line(
    txn: &DatabaseTransaction,
    return_id: i64,
    line: &PurchaseReturnLineInput,
) -> Result<purchase_return_line::Model, ServiceError> {
    let now = Utc::now();
    purchase_return_line::ActiveModel {
        purchase_return_id: Set(return_id),
        item_id: Set(line.item_id),
        quantity: Set(line.quantity),
        unit_cost: Set(line.unit_cost),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::DatabaseError)
}

async fn update_line(
    txn: &DatabaseTransaction,
    line_id: i64,
    incoming: &LineState,
) -> Result<(), ServiceError> {
    let line = PurchaseReturnLine::find_by_id(line_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Purchase return line {} not found", line_id))
        })?;

    let mut active: purchase_return_line::ActiveModel = line.into();
    active.quantity = Set(incoming.quantity);
    active.unit_cost = Set(incoming.unit_amount);
    active.updated_at = Set(Utc::now().into());
    active
        .update(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;
    Ok(())
}

async fn touch_header(
    txn: &DatabaseTransaction,
    header: purchase_return::Model,
    status: DocumentStatus,
    stamp_deleted: bool,
) -> Result<purchase_return::Model, ServiceError> {
    let mut active: purchase_return::ActiveModel = header.into();
    active.status = Set(status.as_ref().to_string());
    if stamp_deleted {
        active.deleted_at = Set(match status {
            DocumentStatus::Deleted => Some(Utc::now().into()),
            DocumentStatus::Active => None,
        });
    }
    active.updated_at = Set(Utc::now().into());
    active.update(txn).await.map_err(ServiceError::DatabaseError)
}

/// Re-derives prices for weighted-average items only; a purchase return
/// never moves a last-cost price.
async fn reprice_weighted_items(
    txn: &DatabaseTransaction,
    items: &BTreeSet<i64>,
    effective_date: NaiveDate,
    source_id: Option<i64>,
    note: Option<String>,
) -> Result<Vec<(i64, PriceChange)>, ServiceError> {
    let mut price_changes = Vec::new();
    for item_id in items {
        let item = load_item(txn, *item_id).await?;
        if item.costing() != Ok(CostingMethod::WeightedAverage) {
            continue;
        }
        if let Some(change) = costing::reprice_after_mutation(
            txn,
            &item,
            effective_date,
            PriceSource::PurchaseReturn,
            source_id,
            note.clone(),
        )
        .await?
        {
            price_changes.push((*item_id, change));
        }
    }
    Ok(price_changes)
}
