//! The order repository: writes and reads against `orders` / `order_items`,
//! plus the `FOR UPDATE SKIP LOCKED` scans the lifecycle processor drives
//! (spec.md §4.5). Grounded on the same claim-lock idiom as `outbox.rs`.

use crate::error::DbResult;
use chrono::{DateTime, Utc};
use order_schemas::{Order, OrderItem, OrderStatus, OrderWithItems};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// `total_amount` is taken as given, not recomputed from `items` — the
/// client is trusted for the order total, matching the source schema's
/// `OrderCreate.total_amount` field.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Insert a new order and its items into the caller's open transaction.
/// Does not commit; pairs with an `outbox::insert` of `order.created` in the
/// same transaction (spec.md §4.1).
pub async fn insert_order(tx: &mut Transaction<'_, Postgres>, new_order: &NewOrder, now: DateTime<Utc>) -> DbResult<OrderWithItems> {
    let order_id = Uuid::new_v4();
    let total_amount = new_order.total_amount;

    sqlx::query(
        r#"
        insert into orders
            (id, user_id, total_amount, currency, shipping_address, status,
             created_at, updated_at)
        values ($1, $2, $3, $4, $5, 'pending', $6, $6)
        "#,
    )
    .bind(order_id)
    .bind(&new_order.user_id)
    .bind(total_amount)
    .bind(&new_order.currency)
    .bind(&new_order.shipping_address)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let mut items = Vec::with_capacity(new_order.items.len());
    for item in &new_order.items {
        let item_id = Uuid::new_v4();
        sqlx::query(
            r#"
            insert into order_items (id, order_id, product_id, quantity, price)
            values ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(item_id)
        .bind(order_id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut **tx)
        .await?;

        items.push(OrderItem {
            id: item_id,
            order_id,
            product_id: item.product_id.clone(),
            quantity: item.quantity,
            price: item.price,
        });
    }

    Ok(OrderWithItems {
        order: Order {
            id: order_id,
            user_id: new_order.user_id.clone(),
            total_amount,
            currency: new_order.currency.clone(),
            shipping_address: new_order.shipping_address.clone(),
            status: OrderStatus::Pending,
            tracking_number: None,
            carrier: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            shipped_at: None,
        },
        items,
    })
}

pub async fn fetch_order(pool: &PgPool, order_id: Uuid) -> DbResult<Option<OrderWithItems>> {
    let order: Option<Order> = sqlx::query_as("select * from orders where id = $1").bind(order_id).fetch_optional(pool).await?;

    let Some(order) = order else { return Ok(None) };

    let items: Vec<OrderItem> = sqlx::query_as("select * from order_items where order_id = $1 order by product_id asc")
        .bind(order_id)
        .fetch_all(pool)
        .await?;

    Ok(Some(OrderWithItems { order, items }))
}

/// List orders newest-first, paginated. Returns `(page, total_count)`.
pub async fn list_orders(pool: &PgPool, skip: i64, limit: i64) -> DbResult<(Vec<OrderWithItems>, i64)> {
    let orders: Vec<Order> = sqlx::query_as("select * from orders order by created_at desc offset $1 limit $2")
        .bind(skip)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let total: i64 = sqlx::query_scalar("select count(*) from orders").fetch_one(pool).await?;

    let mut with_items = Vec::with_capacity(orders.len());
    for order in orders {
        let items: Vec<OrderItem> = sqlx::query_as("select * from order_items where order_id = $1 order by product_id asc")
            .bind(order.id)
            .fetch_all(pool)
            .await?;
        with_items.push(OrderWithItems { order, items });
    }

    Ok((with_items, total))
}

/// Orders for a user in any of the given statuses — used by the
/// `user.deleted` consumer handler to find orders eligible for
/// cancellation (spec.md §4.6).
pub async fn list_orders_for_user_in_statuses(pool: &PgPool, user_id: &str, statuses: &[OrderStatus]) -> DbResult<Vec<Order>> {
    let status_strs: Vec<&'static str> = statuses.iter().map(|s| s.as_str()).collect();
    let orders: Vec<Order> = sqlx::query_as("select * from orders where user_id = $1 and status = any($2)")
        .bind(user_id)
        .bind(&status_strs)
        .fetch_all(pool)
        .await?;
    Ok(orders)
}

/// Claim a single order in `pending` status older than `confirm_delay`,
/// within the caller's own short transaction — mirrors `outbox::claim_one`
/// so the processor commits one order's transition at a time rather than
/// holding a whole batch of row locks for the sweep's duration.
pub async fn claim_one_confirm_eligible(tx: &mut Transaction<'_, Postgres>, now: DateTime<Utc>, confirm_delay: chrono::Duration) -> DbResult<Option<Order>> {
    let cutoff = now - confirm_delay;
    let order: Option<Order> = sqlx::query_as(
        r#"
        select * from orders
        where status = 'pending' and created_at <= $1
        order by created_at asc
        limit 1
        for update skip locked
        "#,
    )
    .bind(cutoff)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(order)
}

/// Claim a single order in `confirmed` status older than `ship_delay`,
/// within the caller's own short transaction. See
/// [`claim_one_confirm_eligible`] for why this claims one row at a time.
pub async fn claim_one_ship_eligible(tx: &mut Transaction<'_, Postgres>, now: DateTime<Utc>, ship_delay: chrono::Duration) -> DbResult<Option<Order>> {
    let cutoff = now - ship_delay;
    let order: Option<Order> = sqlx::query_as(
        r#"
        select * from orders
        where status = 'confirmed' and confirmed_at <= $1
        order by confirmed_at asc
        limit 1
        for update skip locked
        "#,
    )
    .bind(cutoff)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(order)
}

pub async fn confirm_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid, payment_id: &str, confirmed_at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        update orders
           set status = 'confirmed', payment_id = $2, confirmed_at = $3, updated_at = $3
         where id = $1
        "#,
    )
    .bind(order_id)
    .bind(payment_id)
    .bind(confirmed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn ship_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid, tracking_number: &str, carrier: &str, shipped_at: DateTime<Utc>) -> DbResult<()> {
    sqlx::query(
        r#"
        update orders
           set status = 'shipped', tracking_number = $2, carrier = $3, shipped_at = $4, updated_at = $4
         where id = $1
        "#,
    )
    .bind(order_id)
    .bind(tracking_number)
    .bind(carrier)
    .bind(shipped_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Cancel an order only if it is still `pending` or `confirmed` — a
/// concurrent ship must win the race, not be undone by a late cancellation.
pub async fn cancel_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid, now: DateTime<Utc>) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        update orders
           set status = 'cancelled', updated_at = $2
         where id = $1 and status in ('pending', 'confirmed')
        "#,
    )
    .bind(order_id)
    .bind(now)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

