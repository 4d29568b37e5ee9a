mod common;

use common::{create_item, date, dec, purchase_lines_of, quantity, setup_engine};
use stocktally::domain::{AdjustmentType, CostingMethod};
use stocktally::errors::ServiceError;
use stocktally::services::purchases::{PurchaseInput, PurchaseLineInput};
use stocktally::services::sales::{SaleInput, SaleLineInput};
use stocktally::services::stock_adjustments::{StockAdjustmentInput, StockAdjustmentLineInput};

const W1: i32 = 1;

async fn seed_purchase_and_consume(
    engine: &stocktally::EngineState,
    item_id: i64,
    purchased: i64,
    consumed: i64,
) -> i64 {
    let purchase = engine
        .purchases
        .create(PurchaseInput {
            warehouse_id: W1,
            supplier_id: None,
            doc_date: date("2024-03-01"),
            currency: "USD".to_string(),
            lines: vec![PurchaseLineInput {
                id: None,
                item_id,
                quantity: dec(purchased),
                unit_cost: dec(10),
            }],
        })
        .await
        .unwrap();

    engine
        .stock_adjustments
        .create(StockAdjustmentInput {
            warehouse_id: W1,
            adjustment_type: AdjustmentType::Subtract,
            reason: Some("consumed downstream".to_string()),
            doc_date: date("2024-03-02"),
            lines: vec![StockAdjustmentLineInput {
                item_id,
                quantity: dec(consumed),
            }],
        })
        .await
        .unwrap();

    purchase.id
}

#[tokio::test]
async fn removing_a_consumed_purchase_line_is_rejected_atomically() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "RC-REMOVE", CostingMethod::WeightedAverage).await;
    let purchase_id = seed_purchase_and_consume(&engine, item.id, 100, 60).await;
    assert_eq!(quantity(&engine, item.id, W1).await, dec(40));

    let result = engine.purchases.update(purchase_id, vec![]).await;

    match result {
        Err(ServiceError::InsufficientStock(msg)) => {
            assert!(msg.contains("Cannot remove"), "unexpected message: {msg}");
            assert!(msg.contains("100"), "original quantity missing: {msg}");
            assert!(msg.contains("40"), "remaining quantity missing: {msg}");
            assert!(msg.contains("60"), "consumed quantity missing: {msg}");
        }
        other => panic!("expected InsufficientStock, got {:?}", other.map(|m| m.id)),
    }

    // Nothing moved: the ledger still shows the consumed level and the
    // line is still attached to the purchase.
    assert_eq!(quantity(&engine, item.id, W1).await, dec(40));
    assert_eq!(purchase_lines_of(&engine, purchase_id).await.len(), 1);
}

#[tokio::test]
async fn reducing_below_the_consumed_level_is_rejected() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "RC-REDUCE", CostingMethod::WeightedAverage).await;
    let purchase_id = seed_purchase_and_consume(&engine, item.id, 100, 60).await;
    let line_id = purchase_lines_of(&engine, purchase_id).await[0].id;

    // Dropping 100 -> 30 needs 70 units back, but only 40 remain.
    let result = engine
        .purchases
        .update(
            purchase_id,
            vec![PurchaseLineInput {
                id: Some(line_id),
                item_id: item.id,
                quantity: dec(30),
                unit_cost: dec(10),
            }],
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(40));

    // Dropping 100 -> 60 needs exactly the 40 remaining units.
    engine
        .purchases
        .update(
            purchase_id,
            vec![PurchaseLineInput {
                id: Some(line_id),
                item_id: item.id,
                quantity: dec(60),
                unit_cost: dec(10),
            }],
        )
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));
}

#[tokio::test]
async fn increasing_a_purchase_line_has_no_floor() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "RC-GROW", CostingMethod::WeightedAverage).await;
    let purchase_id = seed_purchase_and_consume(&engine, item.id, 100, 60).await;
    let line_id = purchase_lines_of(&engine, purchase_id).await[0].id;

    engine
        .purchases
        .update(
            purchase_id,
            vec![PurchaseLineInput {
                id: Some(line_id),
                item_id: item.id,
                quantity: dec(150),
                unit_cost: dec(10),
            }],
        )
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(90));
}

#[tokio::test]
async fn sales_are_not_floor_checked() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "RC-SALE", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(PurchaseInput {
            warehouse_id: W1,
            supplier_id: None,
            doc_date: date("2024-03-01"),
            currency: "USD".to_string(),
            lines: vec![PurchaseLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(5),
                unit_cost: dec(10),
            }],
        })
        .await
        .unwrap();

    // Selling more than is on hand goes through; only purchase-decreasing
    // edits are constrained by consumption.
    engine
        .sales
        .create(SaleInput {
            warehouse_id: W1,
            customer_id: None,
            doc_date: date("2024-03-02"),
            currency: "USD".to_string(),
            lines: vec![SaleLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(10),
                unit_price: dec(25),
            }],
        })
        .await
        .unwrap();

    assert_eq!(quantity(&engine, item.id, W1).await, dec(-5));
}
