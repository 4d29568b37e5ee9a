mod common;

use common::{
    create_item, create_item_with_opening, date, dec, history_entries, price, quantity,
    setup_engine,
};
use rust_decimal_macros::dec;
use stocktally::domain::{AdjustmentType, CostingMethod};
use stocktally::errors::ServiceError;
use stocktally::services::stock_adjustments::{StockAdjustmentInput, StockAdjustmentLineInput};
use stocktally::services::stock_transfers::{StockTransferInput, StockTransferLineInput};

const W1: i32 = 1;
const W2: i32 = 2;

#[tokio::test]
async fn transfer_conserves_the_summed_quantity() {
    let engine = setup_engine().await;
    let item = create_item_with_opening(
        &engine,
        "TR-CONSERVE",
        CostingMethod::WeightedAverage,
        dec(100),
        dec(50),
        W1,
    )
    .await;

    let before = quantity(&engine, item.id, W1).await + quantity(&engine, item.id, W2).await;

    engine
        .stock_transfers
        .create(StockTransferInput {
            from_warehouse_id: W1,
            to_warehouse_id: W2,
            doc_date: date("2024-04-01"),
            note: None,
            lines: vec![StockTransferLineInput {
                item_id: item.id,
                quantity: dec(30),
            }],
        })
        .await
        .unwrap();

    assert_eq!(quantity(&engine, item.id, W1).await, dec(70));
    assert_eq!(quantity(&engine, item.id, W2).await, dec(30));

    let after = quantity(&engine, item.id, W1).await + quantity(&engine, item.id, W2).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn transfer_never_touches_the_price() {
    let engine = setup_engine().await;
    let item = create_item_with_opening(
        &engine,
        "TR-PRICE",
        CostingMethod::WeightedAverage,
        dec(100),
        dec(50),
        W1,
    )
    .await;
    assert_eq!(history_entries(&engine, item.id).await.len(), 1);

    engine
        .stock_transfers
        .create(StockTransferInput {
            from_warehouse_id: W1,
            to_warehouse_id: W2,
            doc_date: date("2024-04-01"),
            note: Some("rebalance".to_string()),
            lines: vec![StockTransferLineInput {
                item_id: item.id,
                quantity: dec(40),
            }],
        })
        .await
        .unwrap();

    assert_eq!(price(&engine, item.id).await, Some(dec!(50.00)));
    assert_eq!(history_entries(&engine, item.id).await.len(), 1);
}

#[tokio::test]
async fn transfer_between_the_same_warehouse_is_rejected() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "TR-SAME", CostingMethod::WeightedAverage).await;

    let result = engine
        .stock_transfers
        .create(StockTransferInput {
            from_warehouse_id: W1,
            to_warehouse_id: W1,
            doc_date: date("2024-04-01"),
            note: None,
            lines: vec![StockTransferLineInput {
                item_id: item.id,
                quantity: dec(1),
            }],
        })
        .await;

    assert!(matches!(result, Err(ServiceError::ValidationError(_))));
}

#[tokio::test]
async fn adjustments_move_one_warehouse_in_their_direction() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "ADJ-DIR", CostingMethod::WeightedAverage).await;

    engine
        .stock_adjustments
        .create(StockAdjustmentInput {
            warehouse_id: W1,
            adjustment_type: AdjustmentType::Add,
            reason: Some("found during cycle count".to_string()),
            doc_date: date("2024-04-01"),
            lines: vec![StockAdjustmentLineInput {
                item_id: item.id,
                quantity: dec(15),
            }],
        })
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(15));

    engine
        .stock_adjustments
        .create(StockAdjustmentInput {
            warehouse_id: W1,
            adjustment_type: AdjustmentType::Subtract,
            reason: Some("damaged".to_string()),
            doc_date: date("2024-04-02"),
            lines: vec![StockAdjustmentLineInput {
                item_id: item.id,
                quantity: dec(6),
            }],
        })
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(9));

    // Adjustments carry no cost information and leave prices alone.
    assert_eq!(price(&engine, item.id).await, None);
    assert!(history_entries(&engine, item.id).await.is_empty());
}
