//! Requires `ORDER_DATABASE_URL` pointing at a scratch Postgres; skips
//! otherwise. Mirrors the teacher's `scenario_*` integration-test naming.

use order_db::{orders, outbox, testkit};
use order_schemas::EventType;
use serde_json::json;

#[tokio::test]
async fn claimed_row_is_invisible_to_a_second_claimant_until_released() {
    let Some(pool) = testkit::db_pool_from_env().await else {
        eprintln!("skipping: ORDER_DATABASE_URL not set");
        return;
    };

    let new_order = orders::NewOrder {
        user_id: "user_claim_test".to_string(),
        total_amount: rust_decimal::Decimal::new(1000, 2),
        currency: "USD".to_string(),
        shipping_address: None,
        items: vec![orders::NewOrderItem {
            product_id: "sku_1".to_string(),
            quantity: 1,
            price: rust_decimal::Decimal::new(1000, 2),
        }],
    };

    let mut tx = pool.begin().await.unwrap();
    let order = orders::insert_order(&mut tx, &new_order, chrono::Utc::now()).await.unwrap();
    let event_id = outbox::insert(
        &mut tx,
        outbox::NewOutboxEvent {
            event_type: EventType::OrderCreated,
            topic: "order.created".to_string(),
            partition_key: Some(order.order.id.to_string()),
            payload: json!({ "order_id": order.order.id }),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    // First claimant holds the row inside an open transaction.
    let mut claim_tx = pool.begin().await.unwrap();
    let claimed = outbox::claim_one(&mut claim_tx).await.unwrap().expect("row must be claimable");
    assert_eq!(claimed.event_id, event_id);

    // A second claimant must skip the locked row and see nothing else new.
    let mut other_tx = pool.begin().await.unwrap();
    let second = outbox::claim_one(&mut other_tx).await.unwrap();
    assert!(second.is_none(), "a locked row must not be claimable by a concurrent claimant");
    other_tx.rollback().await.unwrap();

    outbox::mark_published(&mut claim_tx, claimed.id).await.unwrap();
    claim_tx.commit().await.unwrap();

    // Now that it is published, no one should claim it again.
    let mut final_tx = pool.begin().await.unwrap();
    let after_publish = outbox::claim_one(&mut final_tx).await.unwrap();
    assert!(after_publish.is_none());
}

#[tokio::test]
async fn record_failure_increments_attempts_and_truncates_message() {
    let Some(pool) = testkit::db_pool_from_env().await else {
        eprintln!("skipping: ORDER_DATABASE_URL not set");
        return;
    };

    let new_order = orders::NewOrder {
        user_id: "user_failure_test".to_string(),
        total_amount: rust_decimal::Decimal::new(500, 2),
        currency: "USD".to_string(),
        shipping_address: None,
        items: vec![orders::NewOrderItem {
            product_id: "sku_1".to_string(),
            quantity: 1,
            price: rust_decimal::Decimal::new(500, 2),
        }],
    };

    let mut tx = pool.begin().await.unwrap();
    let order = orders::insert_order(&mut tx, &new_order, chrono::Utc::now()).await.unwrap();
    outbox::insert(
        &mut tx,
        outbox::NewOutboxEvent {
            event_type: EventType::OrderCreated,
            topic: "order.created".to_string(),
            partition_key: Some(order.order.id.to_string()),
            payload: json!({ "order_id": order.order.id }),
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut claim_tx = pool.begin().await.unwrap();
    let claimed = outbox::claim_one(&mut claim_tx).await.unwrap().unwrap();
    claim_tx.commit().await.unwrap();

    let long_message = "x".repeat(1000);
    let attempts = outbox::record_failure(&pool, claimed.id, &long_message, 500).await.unwrap();
    assert_eq!(attempts, 1);
}
