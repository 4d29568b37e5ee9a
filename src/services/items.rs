use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, TransactionTrait};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    domain::{ensure_non_negative, CostingMethod, PriceSource},
    entities::item,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{costing, stock_ledger},
};

/// Item creation request. A positive opening quantity seeds the ledger of
/// the given warehouse; a positive opening price seeds the price store.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewItem {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub costing_method: CostingMethod,
    pub opening_quantity: Decimal,
    pub opening_price: Decimal,
    pub opening_warehouse_id: Option<i32>,
}

#[derive(Clone)]
pub struct ItemService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<EventSender>,
}

impl ItemService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates an item, its opening stock and its starting price in one
    /// atomic unit of work.
    #[instrument(skip(self, input), fields(sku = %input.sku))]
    pub async fn create_item(&self, input: NewItem) -> Result<item::Model, ServiceError> {
        input.validate()?;
        ensure_non_negative("opening_quantity", input.opening_quantity)?;
        ensure_non_negative("opening_price", input.opening_price)?;
        if input.opening_quantity > Decimal::ZERO && input.opening_warehouse_id.is_none() {
            return Err(ServiceError::ValidationError(
                "opening_warehouse_id is required when opening_quantity is set".to_string(),
            ));
        }

        let txn = self.db.begin().await.map_err(ServiceError::DatabaseError)?;

        let now = Utc::now();
        let created = item::ActiveModel {
            name: Set(input.name.clone()),
            sku: Set(input.sku.clone()),
            costing_method: Set(input.costing_method.as_ref().to_string()),
            opening_quantity: Set(input.opening_quantity),
            opening_price: Set(input.opening_price),
            opening_warehouse_id: Set(input.opening_warehouse_id),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::DatabaseError)?;

        if input.opening_quantity > Decimal::ZERO {
            if let Some(warehouse_id) = input.opening_warehouse_id {
                stock_ledger::adjust(&txn, created.id, warehouse_id, input.opening_quantity)
                    .await?;
            }
        }

        let mut price_event = None;
        if input.opening_price > Decimal::ZERO {
            price_event = costing::apply_price_change(
                &txn,
                created.id,
                input.opening_price,
                now.date_naive(),
                PriceSource::Initial,
                Some(created.id),
                None,
            )
            .await?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(item_id = created.id, sku = %created.sku, "Item created");

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::ItemCreated(created.id)).await;
            if let Some(change) = price_event {
                let _ = sender
                    .send(Event::ItemPriceChanged {
                        item_id: created.id,
                        old_price: change.old_price,
                        new_price: change.new_price,
                    })
                    .await;
            }
        }

        Ok(created)
    }

    /// Fetches an item by id.
    pub async fn get(&self, item_id: i64) -> Result<item::Model, ServiceError> {
        item::Entity::find_by_id(item_id)
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
    }
}
