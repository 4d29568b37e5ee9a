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
    domain::{ensure_non_negative, ensure_positive, ApprovalStatus, DocumentStatus},
    entities::customer_return::{self, Entity as CustomerReturn},
    entities::customer_return_line::{self, Entity as CustomerReturnLine},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        load_item,
        reconciler::{self, LineChange, LineState},
        stock_ledger,
    },
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CustomerReturnInput {
    pub sale_id: Option<i64>,
    pub warehouse_id: i32,
    pub doc_date: NaiveDate,
    #[validate(length(min = 1))]
    pub lines: Vec<CustomerReturnLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustomerReturnLineInput {
    pub id: Option<i64>,
    pub item_id: i64,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

/// Coordinator for customer returns. A return is ledger-neutral through
/// creation, approval and editing; stock moves only at the moment the
/// goods are physically received, and a delete reverses exactly what the
/// receipt applied.
#[derive(Clone)]
pub struct CustomerReturnService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl CustomerReturnService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id))]
    pub async fn create(
        &self,
        input: CustomerReturnInput,
    ) -> Result<customer_return::Model, ServiceError> {
        input.validate()?;
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_price", line.unit_price)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = customer_return::ActiveModel {
            sale_id: Set(input.sale_id),
            warehouse_id: Set(input.warehouse_id),
            doc_date: Set(input.doc_date),
            status: Set(DocumentStatus::Active.as_ref().to_string()),
            approval_status: Set(ApprovalStatus::Draft.as_ref().to_string()),
            received: Set(false),
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
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = header.id, "Customer return created");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::CustomerReturnCreated(header.id)).await;
        }

        Ok(header)
    }

    /// Moves a draft return to approved. Approval does not touch stock.
    #[instrument(skip(self))]
    pub async fn approve(&self, return_id: i64) -> Result<customer_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;
        if header.approval_status == ApprovalStatus::Approved.as_ref() {
            return Err(ServiceError::InvalidStatus(format!(
                "Customer return {} is already approved",
                return_id
            )));
        }

        let mut active: customer_return::ActiveModel = header.into();
        active.approval_status = Set(ApprovalStatus::Approved.as_ref().to_string());
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = return_id, "Customer return approved");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::CustomerReturnApproved(return_id)).await;
        }

        Ok(header)
    }

    /// Rewrites the line set of a not-yet-received return. No ledger
    /// movement happens here; the lines only matter once received.
    #[instrument(skip(self, lines))]
    pub async fn update(
        &self,
        return_id: i64,
        lines: Vec<CustomerReturnLineInput>,
    ) -> Result<customer_return::Model, ServiceError> {
        for line in &lines {
            ensure_positive("quantity", line.quantity)?;
            ensure_non_negative("unit_price", line.unit_price)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;
        if header.received {
            return Err(ServiceError::InvalidStatus(format!(
                "Customer return {} has already been received and can no longer be edited",
                return_id
            )));
        }

        let existing = CustomerReturnLine::find()
            .filter(customer_return_line::Column::CustomerReturnId.eq(return_id))
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
                        return_id,
                        &CustomerReturnLineInput {
                            id: None,
                            item_id: incoming.item_id,
                            quantity: incoming.quantity,
                            unit_price: incoming.unit_amount,
                        },
                    )
                    .await?;
                }
                LineChange::Updated {
                    line_id, incoming, ..
                } => {
                    update_line(&txn, *line_id, incoming).await?;
                }
                LineChange::Removed { line_id, .. } => {
                    CustomerReturnLine::delete_by_id(*line_id)
                        .exec(&txn)
                        .await
                        .map_err(ServiceError::DatabaseError)?;
                }
            }
        }

        let mut active: customer_return::ActiveModel = header.into();
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = return_id, "Customer return updated");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::CustomerReturnUpdated(return_id)).await;
        }

        Ok(header)
    }

    /// Marks an approved return as received: the single point where a
    /// customer return affects inventory.
    #[instrument(skip(self, note))]
    pub async fn mark_received(
        &self,
        return_id: i64,
        received_by: Option<String>,
        note: Option<String>,
    ) -> Result<customer_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;
        if header.approval_status != ApprovalStatus::Approved.as_ref() {
            return Err(ServiceError::InvalidStatus(format!(
                "Customer return {} must be approved before it can be received",
                return_id
            )));
        }
        if header.received {
            return Err(ServiceError::InvalidStatus(format!(
                "Customer return {} has already been received",
                return_id
            )));
        }

        let lines = CustomerReturnLine::find()
            .filter(customer_return_line::Column::CustomerReturnId.eq(return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for line in &lines {
            stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, line.quantity).await?;
        }

        let now = Utc::now();
        let mut active: customer_return::ActiveModel = header.into();
        active.received = Set(true);
        active.received_at = Set(Some(now.into()));
        active.received_by = Set(received_by.clone());
        active.received_note = Set(note);
        active.updated_at = Set(now.into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = return_id, "Customer return received");
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::CustomerReturnReceived {
                    return_id,
                    received_by,
                })
                .await;
        }

        Ok(header)
    }

    /// Soft delete. Only a received return has a ledger effect to
    /// reverse; deleting a never-received return changes no quantities.
    #[instrument(skip(self))]
    pub async fn delete(&self, return_id: i64) -> Result<customer_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_active(&txn, return_id).await?;

        if header.received {
            let lines = CustomerReturnLine::find()
                .filter(customer_return_line::Column::CustomerReturnId.eq(return_id))
                .all(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            for line in &lines {
                stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, -line.quantity)
                    .await?;
            }
        }

        let mut active: customer_return::ActiveModel = header.into();
        active.status = Set(DocumentStatus::Deleted.as_ref().to_string());
        active.deleted_at = Set(Some(Utc::now().into()));
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = return_id, "Customer return deleted");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::CustomerReturnDeleted(return_id)).await;
        }

        Ok(header)
    }

    /// Restore, conditioned identically to delete: quantities come back
    /// only when the receipt had applied them.
    #[instrument(skip(self))]
    pub async fn restore(&self, return_id: i64) -> Result<customer_return::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = find_deleted(&txn, return_id).await?;

        if header.received {
            let lines = CustomerReturnLine::find()
                .filter(customer_return_line::Column::CustomerReturnId.eq(return_id))
                .all(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            for line in &lines {
                stock_ledger::adjust(&txn, line.item_id, header.warehouse_id, line.quantity)
                    .await?;
            }
        }

        let mut active: customer_return::ActiveModel = header.into();
        active.status = Set(DocumentStatus::Active.as_ref().to_string());
        active.deleted_at = Set(None);
        active.updated_at = Set(Utc::now().into());
        let header = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(customer_return_id = return_id, "Customer return restored");
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::CustomerReturnRestored(return_id)).await;
        }

        Ok(header)
    }

    pub async fn get(&self, return_id: i64) -> Result<customer_return::Model, ServiceError> {
        CustomerReturn::find_by_id(return_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer return {} not found", return_id))
            })
    }
}

async fn find_active(
    txn: &DatabaseTransaction,
    return_id: i64,
) -> Result<customer_return::Model, ServiceError> {
    let header = CustomerReturn::find_by_id(return_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Customer return {} not found", return_id)))?;
    if header.status != DocumentStatus::Active.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Customer return {} is deleted",
            return_id
        )));
    }
    Ok(header)
}

async fn find_deleted(
    txn: &DatabaseTransaction,
    return_id: i64,
) -> Result<customer_return::Model, ServiceError> {
    let header = CustomerReturn::find_by_id(return_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Customer return {} not found", return_id)))?;
    if header.status != DocumentStatus::Deleted.as_ref() {
        return Err(ServiceError::InvalidStatus(format!(
            "Customer return {} is not deleted",
            return_id
        )));
    }
    Ok(header)
}

async fn insert_line(
    txn: &DatabaseTransaction,
    return_id: i64,
    line: &CustomerReturnLineInput,
) -> Result<customer_return_line::Model, ServiceError> {
    let now = Utc::now();
    customer_return_line::ActiveModel {
        customer_return_id: Set(return_id),
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
    let line = CustomerReturnLine::find_by_id(line_id)
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("Customer return line {} not found", line_id))
        })?;

    let mut active: customer_return_line::ActiveModel = line.into();
    active.quantity = Set(incoming.quantity);
    active.unit_price = Set(incoming.unit_amount);
    active.updated_at = Set(Utc::now().into());
    active
        .update(txn)
        .await
        .map_err(ServiceError::DatabaseError)?;
    Ok(())
}
