use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Wrapper over the event channel handed to every service.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted by the transaction coordinators after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ItemCreated(i64),

    PurchaseCreated(i64),
    PurchaseUpdated(i64),
    PurchaseDeleted(i64),
    PurchaseRestored(i64),

    PurchaseReturnCreated(i64),
    PurchaseReturnUpdated(i64),
    PurchaseReturnDeleted(i64),
    PurchaseReturnRestored(i64),

    SaleCreated(i64),
    SaleUpdated(i64),
    SaleDeleted(i64),

    CustomerReturnCreated(i64),
    CustomerReturnUpdated(i64),
    CustomerReturnApproved(i64),
    CustomerReturnReceived {
        return_id: i64,
        received_by: Option<String>,
    },
    CustomerReturnDeleted(i64),
    CustomerReturnRestored(i64),

    StockAdjustmentCreated(i64),
    StockTransferCreated(i64),

    StockLevelChanged {
        item_id: i64,
        warehouse_id: i32,
        quantity: Decimal,
    },
    ItemPriceChanged {
        item_id: i64,
        old_price: Option<Decimal>,
        new_price: Decimal,
    },

    /// Catch-all for auxiliary notifications.
    Generic {
        message: String,
        metadata: serde_json::Value,
    },
}
