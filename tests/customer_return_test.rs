mod common;

use common::{create_item, date, dec, quantity, setup_engine};
use stocktally::domain::CostingMethod;
use stocktally::errors::ServiceError;
use stocktally::services::customer_returns::{CustomerReturnInput, CustomerReturnLineInput};

const W1: i32 = 1;

fn return_input(item_id: i64, qty: rust_decimal::Decimal) -> CustomerReturnInput {
    CustomerReturnInput {
        sale_id: None,
        warehouse_id: W1,
        doc_date: date("2024-04-01"),
        lines: vec![CustomerReturnLineInput {
            id: None,
            item_id,
            quantity: qty,
            unit_price: dec(30),
        }],
    }
}

#[tokio::test]
async fn inventory_moves_only_at_receipt() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-GATE", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(20)))
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine.customer_returns.approve(ret.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine
        .customer_returns
        .mark_received(ret.id, Some("warehouse clerk".to_string()), None)
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(20));

    engine.customer_returns.delete(ret.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine.customer_returns.restore(ret.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(20));
}

#[tokio::test]
async fn deleting_a_never_received_return_is_ledger_neutral() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-NEUTRAL", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(20)))
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine.customer_returns.delete(ret.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine.customer_returns.restore(ret.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));
}

#[tokio::test]
async fn receiving_requires_approval() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-DRAFT", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(5)))
        .await
        .unwrap();

    let result = engine.customer_returns.mark_received(ret.id, None, None).await;
    assert!(matches!(result, Err(ServiceError::InvalidStatus(_))));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));
}

#[tokio::test]
async fn receiving_twice_is_rejected() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-TWICE", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(5)))
        .await
        .unwrap();
    engine.customer_returns.approve(ret.id).await.unwrap();
    engine
        .customer_returns
        .mark_received(ret.id, None, None)
        .await
        .unwrap();

    let result = engine.customer_returns.mark_received(ret.id, None, None).await;
    assert!(matches!(result, Err(ServiceError::InvalidStatus(_))));
    // The double receipt must not double-count.
    assert_eq!(quantity(&engine, item.id, W1).await, dec(5));
}

#[tokio::test]
async fn editing_a_received_return_is_rejected() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-EDIT", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(5)))
        .await
        .unwrap();
    engine.customer_returns.approve(ret.id).await.unwrap();
    engine
        .customer_returns
        .mark_received(ret.id, None, None)
        .await
        .unwrap();

    let result = engine
        .customer_returns
        .update(
            ret.id,
            vec![CustomerReturnLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(50),
                unit_price: dec(30),
            }],
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidStatus(_))));
    assert_eq!(quantity(&engine, item.id, W1).await, dec(5));
}

#[tokio::test]
async fn editing_lines_before_receipt_changes_what_the_receipt_applies() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "CR-PREEDIT", CostingMethod::WeightedAverage).await;

    let ret = engine
        .customer_returns
        .create(return_input(item.id, dec(20)))
        .await
        .unwrap();

    engine
        .customer_returns
        .update(
            ret.id,
            vec![CustomerReturnLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(8),
                unit_price: dec(30),
            }],
        )
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));

    engine.customer_returns.approve(ret.id).await.unwrap();
    engine
        .customer_returns
        .mark_received(ret.id, None, None)
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(8));
}
