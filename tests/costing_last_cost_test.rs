mod common;

use common::{create_item, date, dec, price, quantity, setup_engine};
use rust_decimal_macros::dec;
use stocktally::domain::CostingMethod;
use stocktally::services::purchase_returns::{PurchaseReturnInput, PurchaseReturnLineInput};
use stocktally::services::purchases::{PurchaseInput, PurchaseLineInput};

const W1: i32 = 1;

fn one_line(
    doc_date: &str,
    item_id: i64,
    qty: rust_decimal::Decimal,
    cost: rust_decimal::Decimal,
) -> PurchaseInput {
    PurchaseInput {
        warehouse_id: W1,
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
async fn price_follows_the_most_recent_purchase() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "LC-LATEST", CostingMethod::LastCost).await;

    let p1 = engine
        .purchases
        .create(one_line("2024-03-01", item.id, dec(10), dec(100)))
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(100.00)));

    let p2 = engine
        .purchases
        .create(one_line("2024-03-02", item.id, dec(10), dec(120)))
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(120.00)));

    // Editing the older purchase must not move the price.
    let l1 = common::purchase_lines_of(&engine, p1.id).await[0].id;
    engine
        .purchases
        .update(
            p1.id,
            vec![PurchaseLineInput {
                id: Some(l1),
                item_id: item.id,
                quantity: dec(10),
                unit_cost: dec(10),
            }],
        )
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(120.00)));

    // Editing the most recent one must.
    let l2 = common::purchase_lines_of(&engine, p2.id).await[0].id;
    engine
        .purchases
        .update(
            p2.id,
            vec![PurchaseLineInput {
                id: Some(l2),
                item_id: item.id,
                quantity: dec(10),
                unit_cost: dec(150),
            }],
        )
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(150.00)));
}

#[tokio::test]
async fn backdated_purchase_cannot_overwrite_a_newer_cost() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "LC-BACKDATE", CostingMethod::LastCost).await;

    engine
        .purchases
        .create(one_line("2024-03-10", item.id, dec(5), dec(100)))
        .await
        .unwrap();
    engine
        .purchases
        .create(one_line("2024-03-05", item.id, dec(5), dec(90)))
        .await
        .unwrap();

    // The 03-10 document is still the chronologically latest.
    assert_eq!(price(&engine, item.id).await, Some(dec!(100.00)));
}

#[tokio::test]
async fn purchase_return_leaves_last_cost_untouched() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "LC-RET", CostingMethod::LastCost).await;

    engine
        .purchases
        .create(one_line("2024-03-01", item.id, dec(10), dec(100)))
        .await
        .unwrap();

    engine
        .purchase_returns
        .create(PurchaseReturnInput {
            purchase_id: None,
            warehouse_id: W1,
            doc_date: date("2024-03-03"),
            currency: "USD".to_string(),
            lines: vec![PurchaseReturnLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(5),
                unit_cost: dec(100),
            }],
        })
        .await
        .unwrap();

    assert_eq!(quantity(&engine, item.id, W1).await, dec(5));
    assert_eq!(price(&engine, item.id).await, Some(dec!(100.00)));
}

#[tokio::test]
async fn deleting_the_latest_purchase_falls_back_to_the_previous_cost() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "LC-DEL", CostingMethod::LastCost).await;

    engine
        .purchases
        .create(one_line("2024-03-01", item.id, dec(10), dec(100)))
        .await
        .unwrap();
    let p2 = engine
        .purchases
        .create(one_line("2024-03-02", item.id, dec(10), dec(120)))
        .await
        .unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(120.00)));

    engine.purchases.delete(p2.id).await.unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(100.00)));

    engine.purchases.restore(p2.id).await.unwrap();
    assert_eq!(price(&engine, item.id).await, Some(dec!(120.00)));
}
