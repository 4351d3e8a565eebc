use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::collections::HashMap;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AdminUser, AuthUser};
use crate::errors::AppError;
use crate::instrument::{RUB, is_valid_ticker_format};
use crate::orderbook::Level;
use crate::orders::{Direction, Order, OrderBody, OrderStatus};
use crate::state::AppState;
use crate::trade::Trade;
use crate::user::{Role, User};

/// Deserializes the request body, logging a warning with a body preview
/// on failure rather than letting the rejection pass through silently.
pub struct LoggedJson<T>(pub T);

impl<S, T> axum::extract::FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.to_string()))?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(error = %e, %method, %uri, body_preview = %preview, "request body rejected");
                Err(AppError::Validation(e.to_string()))
            }
        }
    }
}

fn user_dto(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "name": user.name,
        "role": user.role,
        "api_key": user.api_key,
    })
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
}

async fn register(
    State(state): State<AppState>,
    LoggedJson(body): LoggedJson<RegisterRequest>,
) -> impl IntoResponse {
    let user = state.users.register(body.name, Role::User);
    info!(user_id = %user.id, "user registered");
    (StatusCode::OK, Json(user_dto(&user)))
}

async fn list_instruments(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.catalog.list())
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct OrderBookView {
    bid_levels: Vec<Level>,
    ask_levels: Vec<Level>,
}

async fn orderbook_depth(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !state.catalog.exists(&ticker) {
        return Err(AppError::InstrumentUnknown);
    }
    let limit = q.limit.unwrap_or(10);
    let bid_levels = state.engine.book_depth(&ticker, Direction::Buy, limit).await;
    let ask_levels = state.engine.book_depth(&ticker, Direction::Sell, limit).await;
    Ok(Json(OrderBookView { bid_levels, ask_levels }))
}

async fn recent_trades(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !state.catalog.exists(&ticker) {
        return Err(AppError::InstrumentUnknown);
    }
    let limit = q.limit.unwrap_or(10);
    let trades: Vec<Trade> = state
        .trades
        .list(&ticker, limit)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(trades))
}

async fn get_balance(State(state): State<AppState>, AuthUser(user): AuthUser) -> impl IntoResponse {
    let mut assets: Vec<String> = state.catalog.list().into_iter().map(|i| i.ticker).collect();
    assets.push(RUB.to_string());
    let mut out = HashMap::new();
    for asset in assets {
        if let Some((available, reserved)) = state.ledger.get_if_present(user.id, &asset).await {
            out.insert(asset, available + reserved);
        }
    }
    Json(out)
}

fn order_dto(order: &Order) -> serde_json::Value {
    json!({
        "id": order.id(),
        "user_id": order.user_id(),
        "ticker": order.ticker(),
        "direction": order.direction(),
        "qty": order.qty(),
        "price": order.price(),
        "filled": order.filled(),
        "status": order.status(),
    })
}

async fn submit_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    LoggedJson(body): LoggedJson<OrderBody>,
) -> Result<impl IntoResponse, AppError> {
    let order_id = state.engine.submit(user.id, body).await?;
    info!(user_id = %user.id, order_id = %order_id, "order submitted");
    Ok(Json(json!({"success": true, "order_id": order_id})))
}

async fn list_orders(State(state): State<AppState>, AuthUser(user): AuthUser) -> impl IntoResponse {
    let orders: Vec<_> = state
        .orders
        .list_by_user(user.id)
        .into_iter()
        .filter(|o| o.status() != OrderStatus::Cancelled)
        .map(|o| order_dto(&o))
        .collect();
    Json(orders)
}

async fn get_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.orders.get(id).ok_or(AppError::NotFound)?;
    if order.user_id() != user.id {
        return Err(AppError::Forbidden);
    }
    Ok(Json(order_dto(&order)))
}

async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.cancel(user.id, id).await?;
    info!(user_id = %user.id, order_id = %id, "order cancelled");
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct CreateInstrumentRequest {
    name: String,
    ticker: String,
}

async fn create_instrument(
    State(state): State<AppState>,
    _admin: AdminUser,
    LoggedJson(body): LoggedJson<CreateInstrumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !is_valid_ticker_format(&body.ticker) {
        return Err(AppError::Validation("invalid ticker format".into()));
    }
    state.catalog.register(body.name, body.ticker)?;
    Ok(StatusCode::OK)
}

async fn delete_instrument(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(ticker): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.catalog.remove(&ticker)?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct AdminBalanceRequest {
    user_id: Uuid,
    ticker: String,
    amount: u64,
}

async fn admin_deposit(
    State(state): State<AppState>,
    _admin: AdminUser,
    LoggedJson(body): LoggedJson<AdminBalanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.amount == 0 {
        return Err(AppError::Validation("amount must be > 0".into()));
    }
    state.users.get(body.user_id).ok_or(AppError::NotFound)?;
    state.ledger.deposit(body.user_id, &body.ticker, body.amount).await;
    info!(user_id = %body.user_id, ticker = %body.ticker, amount = body.amount, "admin deposit");
    Ok(StatusCode::OK)
}

async fn admin_withdraw(
    State(state): State<AppState>,
    _admin: AdminUser,
    LoggedJson(body): LoggedJson<AdminBalanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.amount == 0 {
        return Err(AppError::Validation("amount must be > 0".into()));
    }
    state.users.get(body.user_id).ok_or(AppError::NotFound)?;
    state.ledger.withdraw(body.user_id, &body.ticker, body.amount).await?;
    info!(user_id = %body.user_id, ticker = %body.ticker, amount = body.amount, "admin withdraw");
    Ok(StatusCode::OK)
}

async fn admin_delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.users.get(id).ok_or(AppError::NotFound)?;
    for order in state.orders.list_by_user(id) {
        if order.status().is_cancellable() {
            let _ = state.engine.cancel(id, order.id()).await;
        }
    }
    state.users.remove(id);
    info!(user_id = %id, "admin deleted user");
    Ok(StatusCode::OK)
}

/// Constructs the application's `Router` with every route in the
/// external interface, wired to shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/public/register", post(register))
        .route("/api/v1/public/instrument", get(list_instruments))
        .route("/api/v1/public/orderbook/{ticker}", get(orderbook_depth))
        .route("/api/v1/public/transactions/{ticker}", get(recent_trades))
        .route("/api/v1/balance", get(get_balance))
        .route("/api/v1/order", post(submit_order).get(list_orders))
        .route("/api/v1/order/{id}", get(get_order).delete(cancel_order))
        .route("/api/v1/admin/instrument", post(create_instrument))
        .route("/api/v1/admin/instrument/{ticker}", delete(delete_instrument))
        .route("/api/v1/admin/balance/deposit", post(admin_deposit))
        .route("/api/v1/admin/balance/withdraw", post(admin_withdraw))
        .route("/api/v1/admin/user/{id}", delete(admin_delete_user))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_response(DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .with_state(state)
}
