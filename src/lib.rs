//! stocktally
//!
//! Inventory costing and quantity-reconciliation engine: per-warehouse
//! stock ledgers, a global per-item price with an append-only history,
//! last-cost and weighted-average costing, and transaction coordinators
//! for purchases, purchase returns, sales, customer returns, stock
//! adjustments and stock transfers, including update, delete and restore
//! of any document after the fact.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod domain;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use services::{
    customer_returns::CustomerReturnService, items::ItemService,
    purchase_returns::PurchaseReturnService, purchases::PurchaseService, sales::SaleService,
    stock_adjustments::StockAdjustmentService, stock_transfers::StockTransferService,
};

/// Shared engine state: one connection pool, one event channel, and a
/// coordinator per transaction kind.
#[derive(Clone)]
pub struct EngineState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<events::EventSender>,
    pub items: ItemService,
    pub purchases: PurchaseService,
    pub purchase_returns: PurchaseReturnService,
    pub sales: SaleService,
    pub customer_returns: CustomerReturnService,
    pub stock_adjustments: StockAdjustmentService,
    pub stock_transfers: StockTransferService,
}

impl EngineState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<events::EventSender>,
    ) -> Self {
        Self {
            items: ItemService::new(db.clone(), event_sender.clone()),
            purchases: PurchaseService::new(db.clone(), event_sender.clone()),
            purchase_returns: PurchaseReturnService::new(db.clone(), event_sender.clone()),
            sales: SaleService::new(db.clone(), event_sender.clone()),
            customer_returns: CustomerReturnService::new(db.clone(), event_sender.clone()),
            stock_adjustments: StockAdjustmentService::new(db.clone(), event_sender.clone()),
            stock_transfers: StockTransferService::new(db.clone(), event_sender.clone()),
            db,
            config,
            event_sender,
        }
    }
}
