#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use stocktally::{
    config::AppConfig,
    db,
    domain::CostingMethod,
    entities::{item, item_price_history, purchase_line},
    events::EventSender,
    services::{items::NewItem, price_store, stock_ledger},
    EngineState,
};
use tokio::sync::mpsc;

/// Spins up an engine backed by a fresh in-memory SQLite database with
/// the embedded migrations applied. A single pooled connection keeps the
/// in-memory database alive for the lifetime of the test.
pub async fn setup_engine() -> EngineState {
    let mut cfg = AppConfig::new("sqlite::memory:", "test");
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let (tx, mut rx) = mpsc::channel(256);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    EngineState::new(Arc::new(pool), cfg, Some(EventSender::new(tx)))
}

pub fn dec(value: i64) -> Decimal {
    Decimal::new(value * 10_000, 4)
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("invalid date literal")
}

pub async fn create_item(
    engine: &EngineState,
    sku: &str,
    costing_method: CostingMethod,
) -> item::Model {
    engine
        .items
        .create_item(NewItem {
            name: format!("Test item {}", sku),
            sku: sku.to_string(),
            costing_method,
            opening_quantity: Decimal::ZERO,
            opening_price: Decimal::ZERO,
            opening_warehouse_id: None,
        })
        .await
        .expect("failed to create item")
}

pub async fn create_item_with_opening(
    engine: &EngineState,
    sku: &str,
    costing_method: CostingMethod,
    opening_quantity: Decimal,
    opening_price: Decimal,
    warehouse_id: i32,
) -> item::Model {
    engine
        .items
        .create_item(NewItem {
            name: format!("Test item {}", sku),
            sku: sku.to_string(),
            costing_method,
            opening_quantity,
            opening_price,
            opening_warehouse_id: Some(warehouse_id),
        })
        .await
        .expect("failed to create item")
}

pub async fn quantity(engine: &EngineState, item_id: i64, warehouse_id: i32) -> Decimal {
    stock_ledger::get_quantity(engine.db.as_ref(), item_id, warehouse_id)
        .await
        .expect("failed to read ledger quantity")
}

pub async fn price(engine: &EngineState, item_id: i64) -> Option<Decimal> {
    price_store::get_current_price(engine.db.as_ref(), item_id)
        .await
        .expect("failed to read price")
}

pub async fn history_entries(engine: &EngineState, item_id: i64) -> Vec<item_price_history::Model> {
    item_price_history::Entity::find()
        .filter(item_price_history::Column::ItemId.eq(item_id))
        .all(engine.db.as_ref())
        .await
        .expect("failed to read price history")
}

pub async fn purchase_lines_of(engine: &EngineState, purchase_id: i64) -> Vec<purchase_line::Model> {
    purchase_line::Entity::find()
        .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
        .all(engine.db.as_ref())
        .await
        .expect("failed to read purchase lines")
}

/// Overwrites the stored price directly, bypassing the costing engine.
/// Simulates external corruption for the self-correction tests.
pub async fn corrupt_price(engine: &EngineState, item_id: i64, bogus: Decimal) {
    price_store::set_price(engine.db.as_ref(), item_id, bogus, date("2020-01-01"))
        .await
        .expect("failed to overwrite price");
}
