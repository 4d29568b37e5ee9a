use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    domain::{ensure_positive, DocumentStatus},
    entities::stock_transfer::{self, Entity as StockTransfer},
    entities::stock_transfer_line,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{load_item, stock_ledger},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StockTransferInput {
    pub from_warehouse_id: i32,
    pub to_warehouse_id: i32,
    pub doc_date: NaiveDate,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    #[validate(length(min = 1))]
    pub lines: Vec<StockTransferLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StockTransferLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
}

/// Coordinator for inter-warehouse transfers. Both sides of the move
/// commit in one transaction, so the summed quantity across warehouses
/// is conserved. Prices are warehouse-agnostic and never touched here.
#[derive(Clone)]
pub struct StockTransferService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl StockTransferService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(
        skip(self, input),
        fields(from = input.from_warehouse_id, to = input.to_warehouse_id)
    )]
    pub async fn create(
        &self,
        input: StockTransferInput,
    ) -> Result<stock_transfer::Model, ServiceError> {
        input.validate()?;
        if input.from_warehouse_id == input.to_warehouse_id {
            return Err(ServiceError::ValidationError(
                "Source and destination warehouses must differ".to_string(),
            ));
        }
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = stock_transfer::ActiveModel {
            from_warehouse_id: Set(input.from_warehouse_id),
            to_warehouse_id: Set(input.to_warehouse_id),
            doc_date: Set(input.doc_date),
            status: Set(DocumentStatus::Active.as_ref().to_string()),
            note: Set(input.note.clone()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        let mut levels = Vec::new();
        for line in &input.lines {
            load_item(&txn, line.item_id).await?;

            stock_transfer_line::ActiveModel {
                stock_transfer_id: Set(header.id),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

            let from = stock_ledger::adjust(
                &txn,
                line.item_id,
                input.from_warehouse_id,
                -line.quantity,
            )
            .await?;
            let to =
                stock_ledger::adjust(&txn, line.item_id, input.to_warehouse_id, line.quantity)
                    .await?;
            levels.push((line.item_id, input.from_warehouse_id, from.quantity));
            levels.push((line.item_id, input.to_warehouse_id, to.quantity));
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            stock_transfer_id = header.id,
            lines = input.lines.len(),
            "Stock transfer created"
        );
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::StockTransferCreated(header.id)).await;
            for (item_id, warehouse_id, quantity) in levels {
                let _ = sender
                    .send(Event::StockLevelChanged {
                        item_id,
                        warehouse_id,
                        quantity,
                    })
                    .await;
            }
        }

        Ok(header)
    }

    pub async fn get(&self, transfer_id: i64) -> Result<stock_transfer::Model, ServiceError> {
        StockTransfer::find_by_id(transfer_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock transfer {} not found", transfer_id))
            })
    }
}
