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
    entities::purchase::{self, Entity as Purchase},
    entities::purchase_line::{self, Entity as PurchaseLine},
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
pub struct PurchaseInput {
    pub warehouse_id: i32,
    pub supplier_id: Option<i64>,
    pub doc_date: NaiveDate,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub lines: Vec<PurchaseLineInput>,
}

/// One requested purchase line. `id` is only meaningful on update: a
/// present id targets an existing row, an absent id creates a new one.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PurchaseLineInput {
    pub id: Option<i64>,
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Coordinator for purchase documents: the only transaction kind whose
/// edits are constrained by downstream consumption (the purchase floor)
/// and the main driver of both costing strategies.
#[derive(Clone)]
pub struct PurchaseService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl PurchaseService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id))]
    pub async fn create(&self, input: PurchaseInput) -> Result<purchase::Model, ServiceError> {
        input.validate()?;
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_cost", line.unit_cost)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = purchase::ActiveModel {
            warehouse_id: Set(input.warehouse_id),
            supplier_id: Set(input.supplier_id),
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
        let mut last_cost_items: BTreeSet<i64> = BTreeSet::new();

        for line in &input.lines {
            let item = load_item(&txn, line.item_id).await?;
            let method = costing_method(&item)?;

            // The global quantity must be read before this line's delta
            // lands; the moving-average formula is defined against it.
            let quantity_before = stock_ledger::sum_across_warehouses(&txn, item.id).await?;

            insert_line(&txn, header.id, line).await?;
            stock_ledger::adjust(&txn, item.id, input.warehouse_id, line.quantity).await?;

            match method {
                CostingMethod::WeightedAverage => {
                    let price_before =
                        crate::services::price_store::get_current_price(&txn, item.id)
                            .await?
                            .unwrap_or(Decimal::ZERO);
                    let new_price = costing::moving_average(
                        quantity_before,
                        price_before,
                        CostEvent {
                            quantity: line.quantity,
                            unit_cost: line.unit_cost,
                        },
                    );
                    if let Some(change) = costing::apply_price_change(
                        &txn,
                        item.id,
                        new_price,
                        input.doc_date,
                        PriceSource::Purchase,
                        Some(header.id),
                        None,
                    )
                    .await?
                    {
                        price_changes.push((item.id, change));
                    }
                }
                CostingMethod::LastCost => {
                    last_cost_items.insert(item.id);
                }
            }
        }

        // Last-cost re-derives from the latest effective purchase so a
        // backdated document cannot overwrite a newer cost.
        for item_id in last_cost_items {
            let item = load_item(&txn, item_id).await?;
            if let Some(change) = costing::reprice_after_mutation(
                &txn,
                &item,
                input.doc_date,
                PriceSource::Purchase,
                Some(header.id),
                None,
            )
            .await?
            {
                price_changes.push((item_id, change));
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_id = header.id, lines = input.lines.len(), "Purchase created");
        self.notify(Event::PurchaseCreated(header.id), &price_changes)
            .await;

        Ok(header)
    }

    /// Applies an edited line set to an existing purchase. The incoming
    /// lines are diffed against the stored ones; removals and reductions
    /// are checked against the floor before any ledger write.
    #[instrument(skip(self, lines))]
    pub async fn update(
        &self,
        purchase_id: i64,
        lines: Vec<PurchaseLineInput>,
    ) -> Result<purchase::Model, ServiceError> {
        for line in &lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_cost", line.unit_cost)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, purchase_id).await?;
        let existing = PurchaseLine::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
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
        reconciler::assert_purchase_floor(&txn, header.warehouse_id, &changes).await?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for change in &changes {
            match change {
                LineChange::Added { incoming } => {
                    load_item(&txn, incoming.item_id).await?;
                    insert_line(
                        &txn,
                        purchase_id,
                        &PurchaseLineInput {
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
                        incoming.quantity,
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
                    let delta = incoming.quantity - previous.quantity;
                    if !delta.is_zero() {
                        stock_ledger::adjust(&txn, incoming.item_id, header.warehouse_id, delta)
                            .await?;
                    }
                    affected.insert(incoming.item_id);
                }
                LineChange::Removed { line_id, previous } => {
                    PurchaseLine::delete_by_id(*line_id)
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                    stock_ledger::adjust(
                        &txn,
                        previous.item_id,
                        header.warehouse_id,
                        -previous.quantity,
                    )
                    .await?;
                    affected.insert(previous.item_id);
                }
            }
        }

        let price_changes =
            reprice_items(&txn, &affected, header.doc_date, Some(purchase_id), None).await?;

        let header = touch_header(&txn, header, DocumentStatus::Active, false).await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_id, changes = changes.len(), "Purchase updated");
        self.notify(Event::PurchaseUpdated(purchase_id), &price_changes)
            .await;

        Ok(header)
    }

    /// Soft delete: reverses every line's ledger effect and re-derives
    /// prices from the remaining effective documents.
    #[instrument(skip(self))]
    pub async fn delete(&self, purchase_id: i64) -> Result<purchase::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, purchase_id).await?;
        let lines = PurchaseLine::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, -line.quantity).await?;
            affected.insert(line.item_id);
        }

        let header = touch_header(&txn, header, DocumentStatus::Deleted, true).await?;

        let price_changes = reprice_items(
            &txn,
            &affected,
            header.doc_date,
            Some(purchase_id),
            Some("purchase deleted".to_string()),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_id, "Purchase deleted");
        self.notify(Event::PurchaseDeleted(purchase_id), &price_changes)
            .await;

        Ok(header)
    }

    /// Re-applies the ledger effect a delete reversed and re-derives
    /// prices with the document back in effect.
    #[instrument(skip(self))]
    pub async fn restore(&self, purchase_id: i64) -> Result<purchase::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_deleted(&txn, purchase_id).await?;
        let lines = PurchaseLine::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut affected: BTreeSet<i64> = BTreeSet::new();
        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, line.quantity).await?;
            affected.insert(line.item_id);
        }

        let header = touch_header(&txn, header, DocumentStatus::Active, true).await?;

        let price_changes = reprice_items(
            &txn,
            &affected,
            header.doc_date,
            Some(purchase_id),
            Some("purchase restored".to_string()),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(purchase_id, "Purchase restored");
        self.notify(Event::PurchaseRestored(purchase_id), &price_changes)
            .await;

        Ok(header)
    }

    /// Fetches a purchase header regardless of lifecycle state.
    pub async fn get(&self, purchase_id: i64) -> Result<purchase::Model, ServiceError> {
        Purchase::find_by_id(purchase_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Purchase {} not found", purchase_id)))
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

fn costing_method(item: &crate::entities::item::Model) -> Result<CostingMethod, ServiceError> {
    item.costing().map_err(|_| {
        ServiceError::InternalError(format!(
            "Item {} has unknown costing method {:?}",
            item.id, item.costing_method
        ))
    })
}

async fn find_active(
    txn: &DatabaseTransaction,
    purchase_id: i64,
) -> Result<purchase::Model, ServiceError> {
    let header = Purchase::find_by_id(purchase_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase {} not found", purchase_id)))?;
    if header.status != DocumentStatus::Active.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Purchase {} is deleted",
            purchase_id
        )));
    }
    Ok(header)
}

async fn find_deleted(
    txn: &DatabaseTransaction,
    purchase_id: i64,
) -> Result<purchase::Model, ServiceError> {
    let header = Purchase::find_by_id(purchase_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase {} not found", purchase_id)))?;
    if header.status != DocumentStatus::Deleted.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Purchase {} is not deleted",
            purchase_id
        )));
    }
    Ok(header)
}

async fn insert_line(
    txn: &DatabaseTransaction,
    purchase_id: i64,
    line: &PurchaseLineInput,
) -> Result<purchase_line::Model, ServiceError> {
    let now = Utc::now();
    purchase_line::ActiveModel {
        purchase_id: Set(purchase_id),
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
    let line = PurchaseLine::find_by_id(line_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Purchase line {} not found", line_id)))?;

    let mut active: purchase_line::ActiveModel = line.into();
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
    header: purchase::Model,
    status: DocumentStatus,
    stamp_deleted: bool,
) -> Result<purchase::Model, ServiceError> {
    let mut active: purchase::ActiveModel = header.into();
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

async fn reprice_items(
    txn: &DatabaseTransaction,
    items: &BTreeSet<i64>,
    effective_date: NaiveDate,
    source_id: Option<i64>,
    note: Option<String>,
) -> Result<Vec<(i64, PriceChange)>, ServiceError> {
    let mut price_changes = Vec::new();
    for item_id in items {
        let item = load_item(txn, *item_id).await?;
        if let Some(change) = costing::reprice_after_mutation(
            txn,
            &item,
            effective_date,
            PriceSource::Purchase,
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
