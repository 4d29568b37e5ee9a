mod common;

use common::{create_item, create_item_with_opening, date, dec, price, quantity, setup_engine};
use rust_decimal_macros::dec;
use stocktally::domain::CostingMethod;
use stocktally::services::purchase_returns::{PurchaseReturnInput, PurchaseReturnLineInput};
use stocktally::services::purchases::{PurchaseInput, PurchaseLineInput};

const W1: i32 = 1;
const W2: i32 = 2;

fn purchase_input(
    warehouse_id: i32,
    doc_date: &str,
    item_id: i64,
    qty: rust_decimal::Decimal,
    cost: rust_decimal::Decimal,
) -> PurchaseInput {
    PurchaseInput {
        warehouse_id,
        supplier_id: None,
        doc_date: date(doc_date),
        currency: "USD".to_string(),
        lines: vec![PurchaseLineInput {
            id: None,
            item_id,
            quantity: qty,
            unit_cost: cost,
        }],
    }
}

#[tokio::test]
async fn weighted_average_of_two_equal_purchases() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "WA-EQ", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(50), dec(100)))
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(100.00)));

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-02", item.id, dec(50), dec(120)))
        .await
        .unwrap();

    assert_eq!(price(&engine, item.id).await, Some(dec!(110.00)));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(100));
}

#[tokio::test]
async fn weighted_average_of_unequal_purchases() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "WA-UNEQ", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(30), dec(50)))
        .await
        .unwrap();
    engine
        .purchases
        .create(purchase_input(W1, "2024-03-02", item.id, dec(70), dec(70)))
        .await
        .unwrap();

    assert_eq!(price(&engine, item.id).await, Some(dec!(64.00)));
}

#[tokio::test]
async fn price_is_global_across_warehouses() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "WA-GLOBAL", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(60), dec(100)))
        .await
        .unwrap();
    engine
        .purchases
        .create(purchase_input(W2, "2024-03-02", item.id, dec(40), dec(130)))
        .await
        .unwrap();

    assert_eq!(price(&engine, item.id).await, Some(dec!(112.00)));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(60));
    assert_eq!(quantity(&engine, item.id, W2).await, dec(40));
}

#[tokio::test]
async fn opening_stock_is_part_of_the_average() {
    let engine = setup_engine().await;
    let item = create_item_with_opening(
        &engine,
        "WA-OPEN",
        CostingMethod::WeightedAverage,
        dec(100),
        dec(50),
        W1,
    )
    .await;
    assert_eq!(price(&engine, item.id).await, Some(dec!(50.00)));

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(50), dec(80)))
        .await
        .unwrap();

    // (100 * 50 + 50 * 80) / 150
    assert_eq!(price(&engine, item.id).await, Some(dec!(60.00)));
}

#[tokio::test]
async fn purchase_return_removes_cost_weight() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "WA-RET", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(100), dec(10)))
        .await
        .unwrap();

    engine
        .purchase_returns
        .create(PurchaseReturnInput {
            purchase_id: None,
            warehouse_id: W1,
            doc_date: date("2024-03-05"),
            currency: "USD".to_string(),
            lines: vec![PurchaseReturnLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(40),
                unit_cost: dec(20),
            }],
        })
        .await
        .unwrap();

    // (100 * 10 - 40 * 20) / 60
    assert_eq!(price(&engine, item.id).await, Some(dec!(3.33)));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(60));
}

#[tokio::test]
async fn zero_resulting_quantity_falls_back_to_event_cost() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "WA-ZERO", CostingMethod::WeightedAverage).await;

    engine
        .purchases
        .create(purchase_input(W1, "2024-03-01", item.id, dec(10), dec(50)))
        .await
        .unwrap();

    engine
        .purchase_returns
        .create(PurchaseReturnInput {
            purchase_id: None,
            warehouse_id: W1,
            doc_date: date("2024-03-02"),
            currency: "USD".to_string(),
            lines: vec![PurchaseReturnLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(10),
                unit_cost: dec(80),
            }],
        })
        .await
        .unwrap();

    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));
    assert_eq!(price(&engine, item.id).await, Some(dec!(80.00)));
}
