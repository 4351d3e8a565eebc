use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use exchange_core::{api::router, state::AppState, user::Role};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn test_app() -> (Router, AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(dir.path()).await.unwrap();
    (router(state.clone()), state, dir)
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn auth(key: &str) -> String {
    format!("TOKEN {key}")
}

async fn post(app: &Router, uri: &str, key: Option<&str>, body: Value) -> axum::response::Response {
    let mut req = Request::builder().method("POST").uri(uri).header("content-type", "application/json");
    if let Some(key) = key {
        req = req.header("Authorization", auth(key));
    }
    app.clone().oneshot(req.body(Body::from(body.to_string())).unwrap()).await.unwrap()
}

async fn get(app: &Router, uri: &str, key: Option<&str>) -> axum::response::Response {
    let mut req = Request::builder().uri(uri);
    if let Some(key) = key {
        req = req.header("Authorization", auth(key));
    }
    app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

async fn delete(app: &Router, uri: &str, key: Option<&str>) -> axum::response::Response {
    let mut req = Request::builder().method("DELETE").uri(uri);
    if let Some(key) = key {
        req = req.header("Authorization", auth(key));
    }
    app.clone().oneshot(req.body(Body::empty()).unwrap()).await.unwrap()
}

/// S1 — happy match: a resting SELL fully crosses with an incoming BUY.
#[tokio::test]
async fn happy_match_settles_both_sides() {
    let (app, state, _tmp) = test_app().await;
    let admin = state.users.register("admin".into(), Role::Admin);
    let u1 = state.users.register("u1".into(), Role::User);
    let u2 = state.users.register("u2".into(), Role::User);

    post(&app, "/api/v1/admin/instrument", Some(&admin.api_key), json!({"name": "Memcoin", "ticker": "MEMCOIN"}))
        .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u1.id, "ticker": "RUB", "amount": 10_000}),
    )
    .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u2.id, "ticker": "MEMCOIN", "amount": 10}),
    )
    .await;

    let res = post(
        &app,
        "/api/v1/order",
        Some(&u2.api_key),
        json!({"direction": "SELL", "ticker": "MEMCOIN", "qty": 5, "price": 100}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = post(
        &app,
        "/api/v1/order",
        Some(&u1.api_key),
        json!({"direction": "BUY", "ticker": "MEMCOIN", "qty": 5, "price": 100}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    let balance = body_json(get(&app, "/api/v1/balance", Some(&u1.api_key)).await).await;
    assert_eq!(balance["RUB"], 9_500);
    assert_eq!(balance["MEMCOIN"], 5);

    let balance = body_json(get(&app, "/api/v1/balance", Some(&u2.api_key)).await).await;
    assert_eq!(balance["RUB"], 500);
    assert_eq!(balance["MEMCOIN"], 5);
}

/// S2 — partial fill then cancel refunds only the unfilled remainder.
#[tokio::test]
async fn partial_fill_then_cancel_refunds_remainder() {
    let (app, state, _tmp) = test_app().await;
    let admin = state.users.register("admin".into(), Role::Admin);
    let u1 = state.users.register("u1".into(), Role::User);
    let u2 = state.users.register("u2".into(), Role::User);

    post(&app, "/api/v1/admin/instrument", Some(&admin.api_key), json!({"name": "Memcoin", "ticker": "MEMCOIN"}))
        .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u2.id, "ticker": "MEMCOIN", "amount": 10}),
    )
    .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u1.id, "ticker": "RUB", "amount": 1_000}),
    )
    .await;

    let res = post(
        &app,
        "/api/v1/order",
        Some(&u2.api_key),
        json!({"direction": "SELL", "ticker": "MEMCOIN", "qty": 10, "price": 50}),
    )
    .await;
    let sell_id = body_json(res).await["order_id"].as_str().unwrap().to_string();

    post(
        &app,
        "/api/v1/order",
        Some(&u1.api_key),
        json!({"direction": "BUY", "ticker": "MEMCOIN", "qty": 4, "price": 50}),
    )
    .await;

    let sell_order = body_json(get(&app, &format!("/api/v1/order/{sell_id}"), Some(&u2.api_key)).await).await;
    assert_eq!(sell_order["status"], "PARTIALLY_EXECUTED");
    assert_eq!(sell_order["filled"], 4);

    let res = delete(&app, &format!("/api/v1/order/{sell_id}"), Some(&u2.api_key)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let balance = body_json(get(&app, "/api/v1/balance", Some(&u2.api_key)).await).await;
    assert_eq!(balance["MEMCOIN"], 10);
}

/// S4 — a market order that cannot be fully filled is rejected with zero
/// side effects, never partially executed.
#[tokio::test]
async fn market_order_rejected_on_thin_book() {
    let (app, state, _tmp) = test_app().await;
    let admin = state.users.register("admin".into(), Role::Admin);
    let u1 = state.users.register("u1".into(), Role::User);
    let u2 = state.users.register("u2".into(), Role::User);

    post(&app, "/api/v1/admin/instrument", Some(&admin.api_key), json!({"name": "Memcoin", "ticker": "MEMCOIN"}))
        .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u2.id, "ticker": "MEMCOIN", "amount": 2}),
    )
    .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u1.id, "ticker": "RUB", "amount": 10_000}),
    )
    .await;
    post(
        &app,
        "/api/v1/order",
        Some(&u2.api_key),
        json!({"direction": "SELL", "ticker": "MEMCOIN", "qty": 2, "price": 100}),
    )
    .await;

    let res = post(
        &app,
        "/api/v1/order",
        Some(&u1.api_key),
        json!({"direction": "BUY", "ticker": "MEMCOIN", "qty": 3}),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let balance = body_json(get(&app, "/api/v1/balance", Some(&u1.api_key)).await).await;
    assert_eq!(balance["RUB"], 10_000);
    let orders = body_json(get(&app, "/api/v1/order", Some(&u1.api_key)).await).await;
    assert!(orders.as_array().unwrap().is_empty());
}

/// S6 — two identical buys against a single resting sell serialize: only
/// one executes, the other rests.
#[tokio::test]
async fn concurrent_submits_on_same_instrument_do_not_duplicate_trades() {
    let (app, state, _tmp) = test_app().await;
    let admin = state.users.register("admin".into(), Role::Admin);
    let u1 = state.users.register("u1".into(), Role::User);
    let u2 = state.users.register("u2".into(), Role::User);
    let u3 = state.users.register("u3".into(), Role::User);

    post(&app, "/api/v1/admin/instrument", Some(&admin.api_key), json!({"name": "Memcoin", "ticker": "MEMCOIN"}))
        .await;
    post(
        &app,
        "/api/v1/admin/balance/deposit",
        Some(&admin.api_key),
        json!({"user_id": u1.id, "ticker": "MEMCOIN", "amount": 1}),
    )
    .await;
    for u in [&u2, &u3] {
        post(
            &app,
            "/api/v1/admin/balance/deposit",
            Some(&admin.api_key),
            json!({"user_id": u.id, "ticker": "RUB", "amount": 1_000}),
        )
        .await;
    }
    post(
        &app,
        "/api/v1/order",
        Some(&u1.api_key),
        json!({"direction": "SELL", "ticker": "MEMCOIN", "qty": 1, "price": 100}),
    )
    .await;

    let (r2, r3) = tokio::join!(
        post(&app, "/api/v1/order", Some(&u2.api_key), json!({"direction": "BUY", "ticker": "MEMCOIN", "qty": 1, "price": 100})),
        post(&app, "/api/v1/order", Some(&u3.api_key), json!({"direction": "BUY", "ticker": "MEMCOIN", "qty": 1, "price": 100})),
    );
    assert_eq!(r2.status(), StatusCode::OK);
    assert_eq!(r3.status(), StatusCode::OK);

    let trades = body_json(get(&app, "/api/v1/public/transactions/MEMCOIN", None).await).await;
    assert_eq!(trades.as_array().unwrap().len(), 1);
}
