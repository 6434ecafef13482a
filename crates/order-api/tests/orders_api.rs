//! Handler-level scenario tests for `order-api`, composed against the bare
//! router the way `mqk-daemon`'s own scenario tests do. Requires
//! `ORDER_DATABASE_URL` and `ORDER_REDIS_URL`; skips otherwise so `cargo
//! test` stays usable without live services.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::{EventBus, InMemoryBus};
use order_api::AppState;
use order_cache::OrderCache;
use order_config::Settings;
use serde_json::json;
use tower::ServiceExt;
use user_directory_client::MockUserDirectoryClient;

async fn test_settings() -> Option<Settings> {
    std::env::set_var("POSTGRES_SERVER", "unused");
    std::env::set_var("POSTGRES_USER", "unused");
    std::env::set_var("POSTGRES_DB", "unused");
    let settings = Settings::load().expect("required vars are set for the test");
    std::env::remove_var("POSTGRES_SERVER");
    std::env::remove_var("POSTGRES_USER");
    std::env::remove_var("POSTGRES_DB");
    Some(settings)
}

async fn build_test_app() -> Option<axum::Router> {
    let db_url = std::env::var("ORDER_DATABASE_URL").ok()?;
    let redis_url = std::env::var("ORDER_REDIS_URL").ok()?;

    let pool = order_db::connect(&db_url, 5).await.expect("failed to connect to ORDER_DATABASE_URL");
    order_db::migrate(&pool).await.expect("failed to run migrations");

    let cache = OrderCache::connect(&redis_url, 86_400, 604_800).await.expect("failed to connect to ORDER_REDIS_URL");

    let settings = test_settings().await?;
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let user_directory = Arc::new(MockUserDirectoryClient::new());

    let state = Arc::new(AppState::new(pool, cache, bus, user_directory, &settings));
    Some(order_api::build_router(state))
}

#[tokio::test]
async fn create_order_for_an_active_user_returns_pending_order() {
    let Some(app) = build_test_app().await else {
        eprintln!("skipping: ORDER_DATABASE_URL/ORDER_REDIS_URL not set");
        return;
    };

    // `user_abc` hashes to an active mock user (see user-directory-client tests).
    let body = json!({
        "user_id": "user_abc",
        "total_amount": "19.98",
        "currency": "USD",
        "items": [{"product_id": "p1", "quantity": 2, "price": "9.99"}],
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(created["status"], "pending");
    assert_eq!(created["user_id"], "user_abc");
}

#[tokio::test]
async fn create_order_for_an_unknown_user_returns_404() {
    let Some(app) = build_test_app().await else {
        eprintln!("skipping: ORDER_DATABASE_URL/ORDER_REDIS_URL not set");
        return;
    };

    let body = json!({
        "user_id": "not_a_known_prefix",
        "total_amount": "5.00",
        "currency": "USD",
        "items": [{"product_id": "p1", "quantity": 1, "price": "5.00"}],
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/orders")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_live_is_always_ok() {
    let Some(app) = build_test_app().await else {
        eprintln!("skipping: ORDER_DATABASE_URL/ORDER_REDIS_URL not set");
        return;
    };

    let request = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
