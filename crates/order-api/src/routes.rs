//! Axum router and handlers for `order-api` (spec.md §6.1). Grounded on
//! `mqk-daemon/src/routes.rs`'s `build_router` + `State<Arc<AppState>>`
//! shape, and on `original_source/backend/app/api/routes/order.py` for the
//! validate -> insert -> outbox -> commit sequence order creation follows.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use order_cache::CachedUser;
use order_db::outbox::NewOutboxEvent;
use order_db::orders::{self, NewOrder, NewOrderItem};
use order_schemas::{EventType, OrderCreatedData, OrderItemSnapshot};
use tracing::{error, warn};
use trace_context::TraceContext;

use crate::api_types::{
    DependencyChecks, ErrorResponse, HealthLiveResponse, HealthReadyResponse, ListOrdersQuery,
    OrderCreateRequest, OrderPublic, OrdersPublic,
};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthLiveResponse { status: "alive" }))
}

async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let db_check = async {
        sqlx::query_scalar::<_, i32>("select 1").fetch_one(&state.pool).await.is_ok()
    };
    let cache_check = async { state.cache.ping().await.is_ok() };

    let (database_ok, redis_ok) = tokio::join!(db_check, cache_check);

    let status = if database_ok && redis_ok { "ready" } else { "not_ready" };
    let checks = DependencyChecks {
        database: if database_ok { "ok" } else { "unavailable" },
        redis: if redis_ok { "ok" } else { "unavailable" },
    };

    let body = HealthReadyResponse { status, checks };
    let code = if database_ok && redis_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(body)).into_response()
}

async fn list_orders(State(state): State<Arc<AppState>>, Query(query): Query<ListOrdersQuery>) -> Response {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);

    match orders::list_orders(&state.pool, skip, limit).await {
        Ok((page, count)) => {
            let data = page.into_iter().map(OrderPublic::from).collect();
            (StatusCode::OK, Json(OrdersPublic { data, count })).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to list orders");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new("internal error"))).into_response()
        }
    }
}

/// `POST /api/v1/orders`: validate the submitting user against the
/// directory (cache-aside), then insert the order and its `order.created`
/// outbox row in one transaction (spec.md §4.1, §4.7).
async fn create_order(State(state): State<Arc<AppState>>, Json(body): Json<OrderCreateRequest>) -> Response {
    let start = Instant::now();

    let user = match validate_user(&state, &body.user_id).await {
        Ok(user) => user,
        Err(response) => {
            state.metrics.order_creation_failures.inc();
            return response;
        }
    };

    if !user.is_active() {
        state.metrics.order_creation_failures.inc();
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("user {} is not active", body.user_id))),
        )
            .into_response();
    }

    let new_order = NewOrder {
        user_id: body.user_id.clone(),
        total_amount: body.total_amount,
        currency: body.currency.clone(),
        shipping_address: body.shipping_address.clone(),
        items: body
            .items
            .iter()
            .map(|item| NewOrderItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                price: item.price,
            })
            .collect(),
    };

    let trace = TraceContext::new_root();
    let result: anyhow::Result<OrderPublic> = trace_context::scope(trace, async {
        let now = chrono::Utc::now();
        let mut tx = state.pool.begin().await?;
        let order = orders::insert_order(&mut tx, &new_order, now).await?;

        let data = OrderCreatedData::new(
            order.order.id,
            order.order.user_id.clone(),
            order.order.total_amount,
            order.order.currency.clone(),
            order.order.shipping_address.clone(),
            order
                .items
                .iter()
                .map(|item| OrderItemSnapshot {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            now,
        );

        order_db::outbox::insert(
            &mut tx,
            NewOutboxEvent {
                event_type: EventType::OrderCreated,
                topic: state.bus_settings.topics.order_created.clone(),
                partition_key: Some(order.order.user_id.clone()),
                payload: serde_json::to_value(&data)?,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(OrderPublic::from(order))
    })
    .await;

    state.metrics.order_creation_duration.observe(start.elapsed().as_secs_f64());

    match result {
        Ok(public) => {
            state.metrics.orders_created.inc();
            (StatusCode::OK, Json(public)).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to create order");
            state.metrics.order_creation_failures.inc();
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new("internal error"))).into_response()
        }
    }
}

/// Cache-aside user lookup: a cache hit skips the directory round-trip
/// entirely; a miss falls through to the directory and populates the cache
/// for next time (spec.md §6.5). Returns a 404 response directly when the
/// user is unknown, so the caller only has to handle the success case.
async fn validate_user(state: &Arc<AppState>, user_id: &str) -> Result<CachedUser, Response> {
    let start = Instant::now();

    let cached = match state.cache.get_user(user_id).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "user cache lookup failed, falling back to directory");
            None
        }
    };

    if let Some(user) = cached {
        state.metrics.user_validation_duration.observe(start.elapsed().as_secs_f64());
        return Ok(user);
    }

    let directory_user = state.user_directory.get_user(user_id).await.map_err(|e| {
        error!(user_id = %user_id, error = %e, "user directory lookup failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::new("internal error"))).into_response()
    })?;

    let Some(directory_user) = directory_user else {
        state.metrics.user_validation_duration.observe(start.elapsed().as_secs_f64());
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("user {user_id} not found"))),
        )
            .into_response());
    };

    let cached = CachedUser {
        user_id: directory_user.user_id,
        email: directory_user.email,
        name: directory_user.name,
        status: directory_user.status,
        created_at: directory_user.created_at,
    };

    if let Err(e) = state.cache.set_user(&cached).await {
        warn!(user_id = %user_id, error = %e, "failed to populate user cache");
    }

    state.metrics.user_validation_duration.observe(start.elapsed().as_secs_f64());
    Ok(cached)
}

async fn metrics() -> Response {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::default_registry().gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }

    (StatusCode::OK, [("content-type", encoder.format_type())], buffer).into_response()
}
