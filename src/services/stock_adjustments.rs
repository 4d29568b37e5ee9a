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
    domain::{ensure_positive, AdjustmentType, DocumentStatus},
    entities::stock_adjustment::{self, Entity as StockAdjustment},
    entities::stock_adjustment_line,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{load_item, stock_ledger},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StockAdjustmentInput {
    pub warehouse_id: i32,
    pub adjustment_type: AdjustmentType,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
    pub doc_date: NaiveDate,
    #[validate(length(min = 1))]
    pub lines: Vec<StockAdjustmentLineInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StockAdjustmentLineInput {
    pub item_id: i64,
    pub quantity: Decimal,
}

/// Coordinator for manual stock corrections. Adjustments move one
/// warehouse's ledger in the direction of their type and never touch the
/// price store.
#[derive(Clone)]
pub struct StockAdjustmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl StockAdjustmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(warehouse_id = input.warehouse_id))]
    pub async fn create(
        &self,
        input: StockAdjustmentInput,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        input.validate()?;
        for line in &input.lines {
            ensure_positive("quantity", line.quantity)?;
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let header = stock_adjustment::ActiveModel {
            warehouse_id: Set(input.warehouse_id),
            adjustment_type: Set(input.adjustment_type.as_ref().to_string()),
            reason: Set(input.reason.clone()),
            doc_date: Set(input.doc_date),
            status: Set(DocumentStatus::Active.as_ref().to_string()),
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

            stock_adjustment_line::ActiveModel {
                stock_adjustment_id: Set(header.id),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

            let delta = match input.adjustment_type {
                AdjustmentType::Add => line.quantity,
                AdjustmentType::Subtract => -line.quantity,
            };
            let entry =
                stock_ledger::adjust(&txn, line.item_id, input.warehouse_id, delta).await?;
            levels.push((line.item_id, entry.quantity));
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            stock_adjustment_id = header.id,
            adjustment_type = input.adjustment_type.as_ref(),
            lines = input.lines.len(),
            "Stock adjustment created"
        );
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::StockAdjustmentCreated(header.id)).await;
            for (item_id, quantity) in levels {
                let _ = sender
                    .send(Event::StockLevelChanged {
                        item_id,
                        warehouse_id: input.warehouse_id,
                        quantity,
                    })
                    .await;
            }
        }

        Ok(header)
    }

    pub async fn get(&self, adjustment_id: i64) -> Result<stock_adjustment::Model, ServiceError> {
        StockAdjustment::find_by_id(adjustment_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Stock adjustment {} not found", adjustment_id))
            })
    }
}
