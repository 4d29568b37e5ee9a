use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    domain::{ensure_non_negative, ensure_positive, DocumentStatus},
    entities::sale::{self, Entity as Sale},
    entities::sale_line::{self, Entity as SaleLine},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        load_item,
        reconciler::{self, LineChange, LineState},
        stock_ledger,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaleInput {
    pub warehouse_id: i32,
    pub customer_id: Option<i64>,
    pub doc_date: NaiveDate,
    #[validate(length(equal = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub lines: Vec<SaleLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SaleLineInput {
    pub id: Option<i64>,
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Coordinator for sales documents. Sales consume stock and never touch
/// the price store; the selling price on a line is commercial data, not
/// a costing input.
#[derive(Clone)]
pub struct SaleService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl SaleService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id))]
    pub async fn create(&self, input: SaleInput) -> Result<sale::Model, ServiceError> {
        input.validate()?;
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_price", line.unit_price)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = sale::ActiveModel {
            warehouse_id: Set(input.warehouse_id),
            customer_id: Set(input.customer_id),
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

        for line in &input.lines {
            load_item(&txn, line.item_id).await?;
            insert_line(&txn, header.id, line).await?;
            stock_ledger::adjust(&txn, line.item_id, input.warehouse_id, -line.quantity).await?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(sale_id = header.id, lines = input.lines.len(), "Sale created");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::SaleCreated(header.id)).await;
        }

        Ok(header)
    }

    /// Applies the net per-line change of an edited sale: only the delta
    /// between the previous and requested quantity hits the ledger.
    #[instrument(skip(self, lines))]
    pub async fn update(
        &self,
        sale_id: i64,
        lines: Vec<SaleLineInput>,
    ) -> Result<sale::Model, ServiceError> {
        for line in &lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_price", line.unit_price)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, sale_id).await?;
        let existing = SaleLine::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
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
                        unit_amount: l.unit_price,
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
                        unit_amount: l.unit_price,
                    },
                )
            })
            .collect();

        let changes = reconciler::diff_lines(&previous, &incoming)?;

        for change in &changes {
            match change {
                LineChange::Added { incoming } => {
                    load_item(&txn, incoming.item_id).await?;
                    insert_line(
                        &txn,
                        sale_id,
                        &SaleLineInput {
                            id: None,
                            item_id: incoming.item_id,
                            quantity: incoming.quantity,
                            unit_price: incoming.unit_amount,
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
                }
                LineChange::Removed { line_id, previous } => {
                    SaleLine::delete_by_id(*line_id)
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
                }
            }
        }

        let mut active: sale::ActiveModel = header.into();
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(sale_id, changes = changes.len(), "Sale updated");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::SaleUpdated(sale_id)).await;
        }

        Ok(header)
    }

    /// Soft delete: every line's quantity flows back into the ledger.
    #[instrument(skip(self))]
    pub async fn delete(&self, sale_id: i64) -> Result<sale::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, sale_id).await?;
        let lines = SaleLine::find()
            .filter(sale_line::Column::SaleId.eq(sale_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, line.quantity).await?;
        }

        let mut active: sale::ActiveModel = header.into();
        active.status = Set(DocumentStatus::Deleted.as_ref().to_string());
        active.deleted_at = Set(Some(Utc::now().into()));
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(sale_id, "Sale deleted");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::SaleDeleted(sale_id)).await;
        }

        Ok(header)
    }

    pub async fn get(&self, sale_id: i64) -> Result<sale::Model, ServiceError> {
        Sale::find_by_id(sale_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))
    }
}

async fn find_active(txn: &DatabaseTransaction, sale_id: i64) -> Result<sale::Model, ServiceError> {
    let header = Sale::find_by_id(sale_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sale {} not found", sale_id)))?;
    if header.status != DocumentStatus::Active.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Sale {} is deleted",
            sale_id
        )));
    }
    Ok(header)
}

async fn insert_line(
    txn: &DatabaseTransaction,
    sale_id: i64,
    line: &SaleLineInput,
) -> Result<sale_line::Model, ServiceError> {
    let now = Utc::now();
    sale_line::ActiveModel {
        sale_id: Set(sale_id),
        item_id: Set(line.item_id),
        quantity: Set(line.quantity),
        unit_price: Set(line.unit_price),
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
    let line = SaleLine::find_by_id(line_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Sale line {} not found", line_id)))?;

    let mut active: sale_line::ActiveModel = line.into();
    active.quantity = Set(incoming.quantity);
    active.unit_price = Set(incoming.unit_amount);
    active.updated_at = Set(Utc::now().into());
    active
        .update(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;
    Ok(())
}
