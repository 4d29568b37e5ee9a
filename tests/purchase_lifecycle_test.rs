mod common;

use common::{create_item, date, dec, price, purchase_lines_of, quantity, setup_engine};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use stocktally::domain::CostingMethod;
use stocktally::entities::sale_line;
use stocktally::errors::ServiceError;
use stocktally::services::purchases::{PurchaseInput, PurchaseLineInput};
use stocktally::services::sales::{SaleInput, SaleLineInput};

const W1: i32 = 1;

#[tokio::test]
async fn update_can_add_new_lines_alongside_existing_ones() {
    let engine = setup_engine().await;
    let item_a = create_item(&engine, "PL-A", CostingMethod::WeightedAverage).await;
    let item_b = create_item(&engine, "PL-B", CostingMethod::WeightedAverage).await;

    let purchase = engine
        .purchases
        .create(PurchaseInput {
            warehouse_id: W1,
            supplier_id: Some(7),
            doc_date: date("2024-03-01"),
            currency: "USD".to_string(),
            lines: vec![PurchaseLineInput {
                id: None,
                item_id: item_a.id,
                quantity: dec(10),
                unit_cost: dec(100),
            }],
        })
        .await
        .unwrap();
    let line_a = purchase_lines_of(&engine, purchase.id).await[0].id;

    engine
        .purchases
        .update(
            purchase.id,
            vec![
                PurchaseLineInput {
                    id: Some(line_a),
                    item_id: item_a.id,
                    quantity: dec(10),
                    unit_cost: dec(100),
                },
                PurchaseLineInput {
                    id: None,
                    item_id: item_b.id,
                    quantity: dec(4),
                    unit_cost: dec(25),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(purchase_lines_of(&engine, purchase.id).await.len(), 2);
    assert_eq!(quantity(&engine, item_a.id, W1).await, dec(10));
    assert_eq!(quantity(&engine, item_b.id, W1).await, dec(4));
    assert_eq!(price(&engine, item_b.id).await, Some(dec!(25.00)));
}

#[tokio::test]
async fn double_delete_and_restore_of_active_are_rejected() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "PL-STATE", CostingMethod::WeightedAverage).await;

    let purchase = engine
        .purchases
        .create(PurchaseInput {
            warehouse_id: W1,
            supplier_id: None,
            doc_date: date("2024-03-01"),
            currency: "USD".to_string(),
            lines: vec![PurchaseLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(10),
                unit_cost: dec(100),
            }],
        })
        .await
        .unwrap();

    // Restoring an active document makes no sense.
    assert!(matches!(
        engine.purchases.restore(purchase.id).await,
        Err(ServiceError::InvalidStatus(_))
    ));

    engine.purchases.delete(purchase.id).await.unwrap();
    assert!(matches!(
        engine.purchases.delete(purchase.id).await,
        Err(ServiceError::InvalidStatus(_))
    ));

    // A deleted document also rejects edits.
    assert!(matches!(
        engine.purchases.update(purchase.id, vec![]).await,
        Err(ServiceError::InvalidStatus(_))
    ));

    assert_eq!(quantity(&engine, item.id, W1).await, dec(0));
}

#[tokio::test]
async fn sale_update_applies_only_the_net_change() {
    let engine = setup_engine().await;
    let item = create_item(&engine, "PL-SALE", CostingMethod::WeightedAverage).await;

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
                quantity: dec(50),
                unit_cost: dec(10),
            }],
        })
        .await
        .unwrap();

    let sale = engine
        .sales
        .create(SaleInput {
            warehouse_id: W1,
            customer_id: None,
            doc_date: date("2024-03-05"),
            currency: "USD".to_string(),
            lines: vec![SaleLineInput {
                id: None,
                item_id: item.id,
                quantity: dec(10),
                unit_price: dec(18),
            }],
        })
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(40));

    let line_id = sale_line::Entity::find()
        .filter(sale_line::Column::SaleId.eq(sale.id))
        .all(engine.db.as_ref())
        .await
        .unwrap()[0]
        .id;

    // Shrinking the sale gives the difference back to the ledger.
    engine
        .sales
        .update(
            sale.id,
            vec![SaleLineInput {
                id: Some(line_id),
                item_id: item.id,
                quantity: dec(4),
                unit_price: dec(18),
            }],
        )
        .await
        .unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(46));

    // Selling has no costing effect either way.
    assert_eq!(price(&engine, item.id).await, Some(dec!(10.00)));

    engine.sales.delete(sale.id).await.unwrap();
    assert_eq!(quantity(&engine, item.id, W1).await, dec(50));
}

#[tokio::test]
async fn deleting_a_purchase_reverses_every_line() {
    let engine = setup_engine().await;
    let item_a = create_item(&engine, "PL-DEL-A", CostingMethod::WeightedAverage).await;
    let item_b = create_item(&engine, "PL-DEL-B", CostingMethod::WeightedAverage).await;

    let purchase = engine
        .purchases
        .create(PurchaseInput {
            warehouse_id: W1,
            supplier_id: None,
            doc_date: date("2024-03-01"),
            currency: "USD".to_string(),
            lines: vec![
                PurchaseLineInput {
                    id: None,
                    item_id: item_a.id,
                    quantity: dec(10),
                    unit_cost: dec(100),
                },
                PurchaseLineInput {
                    id: None,
                    item_id: item_b.id,
                    quantity: dec(20),
                    unit_cost: dec(5),
                },
            ],
        })
        .await
        .unwrap();

    engine.purchases.delete(purchase.id).await.unwrap();
    assert_eq!(quantity(&engine, item_a.id, W1).await, dec(0));
    assert_eq!(quantity(&engine, item_b.id, W1).await, dec(0));

    engine.purchases.restore(purchase.id).await.unwrap();
    assert_eq!(quantity(&engine, item_a.id, W1).await, dec(10));
    assert_eq!(quantity(&engine, item_b.id, W1).await, dec(20));
}
