use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::errors::AppError;
use crate::instrument::{InstrumentCatalog, RUB, Ticker};
use crate::ledger::{BalanceLedger, ReserveSource};
use crate::orderbook::{OrderBook, RestingEntry};
use crate::orders::{Direction, Order, OrderBody, OrderId, OrderStatus, OrderStore};
use crate::store::TradeStore;
use crate::trade::SettledTrade;
use crate::user::UserId;

struct MakerUpdate {
    order_id: OrderId,
    new_filled: u64,
    new_status: OrderStatus,
}

struct MatchPlan {
    trades: Vec<SettledTrade>,
    maker_updates: Vec<MakerUpdate>,
    /// Price-improvement refunds back to the taker's available RUB.
    refunds: Vec<u64>,
    taker_filled: u64,
    taker_status: OrderStatus,
}

/// The coordinator spec.md §4.5 describes: validates, reserves, matches,
/// settles and finalizes a submission; also handles cancellation. One
/// mutex per instrument realizes the "serializes per-instrument"
/// requirement of spec.md §5.
pub struct MatchingEngine {
    catalog: Arc<InstrumentCatalog>,
    ledger: Arc<BalanceLedger>,
    orders: Arc<OrderStore>,
    trades: Arc<TradeStore>,
    books: RwLock<HashMap<Ticker, Arc<Mutex<OrderBook>>>>,
}

impl MatchingEngine {
    pub fn new(
        catalog: Arc<InstrumentCatalog>,
        ledger: Arc<BalanceLedger>,
        orders: Arc<OrderStore>,
        trades: Arc<TradeStore>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            orders,
            trades,
            books: RwLock::new(HashMap::new()),
        }
    }

    pub async fn book_depth(&self, ticker: &str, side: Direction, limit: usize) -> Vec<crate::orderbook::Level> {
        let book = self.book_for(ticker).await;
        let book = book.lock().await;
        book.depth(side, limit)
    }

    async fn book_for(&self, ticker: &str) -> Arc<Mutex<OrderBook>> {
        if let Some(book) = self.books.read().await.get(ticker) {
            return book.clone();
        }
        let mut books = self.books.write().await;
        books
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())))
            .clone()
    }

    /// `POST /api/v1/order` (spec.md §4.5). Returns the new order's id.
    pub async fn submit(&self, user_id: UserId, body: OrderBody) -> Result<OrderId, AppError> {
        let (ticker, direction, qty, price) = match &body {
            OrderBody::Limit(b) => (b.ticker.clone(), b.direction, b.qty, Some(b.price)),
            OrderBody::Market(b) => (b.ticker.clone(), b.direction, b.qty, None),
        };

        if qty == 0 {
            return Err(AppError::Validation("qty must be > 0".into()));
        }
        if let Some(p) = price {
            if p == 0 {
                return Err(AppError::Validation("price must be > 0".into()));
            }
        }
        if !self.catalog.exists(&ticker) {
            return Err(AppError::NotFound);
        }

        let book = self.book_for(&ticker).await;
        let mut book_guard = book.lock().await;

        let (reserve_asset, reserve_amount, reservation_price) =
            self.compute_reservation(&book_guard, direction, &ticker, qty, price)?;
        self.ledger
            .reserve(user_id, &reserve_asset, reserve_amount)
            .await?;

        let order_id = Uuid::new_v4();
        let now = SystemTime::now();

        let mut plan_book = book_guard.clone();
        let plan = self.run_match(
            &mut plan_book,
            order_id,
            user_id,
            &ticker,
            direction,
            qty,
            price,
            reservation_price,
            now,
        );

        let is_market = price.is_none();
        if is_market {
            debug_assert_eq!(plan.taker_filled, qty, "market pre-walk guarantees a full fill");
        }

        let projections: Vec<_> = plan.trades.iter().map(|t| t.projection()).collect();
        if let Err(e) = self.trades.append_batch(&projections) {
            // Nothing beyond the initial reservation has happened yet;
            // release it and fail the whole submission (spec.md §4.5's
            // commit/rollback unit).
            self.ledger.release(user_id, &reserve_asset, reserve_amount).await;
            return Err(AppError::Internal(format!("trade log append failed: {e}")));
        }

        // Persistence succeeded: the rest is infallible in-memory work.
        for (trade, refund) in plan.trades.iter().zip(plan.refunds.iter()) {
            self.apply_settlement(trade).await;
            if *refund > 0 {
                self.ledger.release(trade.buyer_id, RUB, *refund).await;
            }
        }

        for update in &plan.maker_updates {
            self.orders
                .update_status_and_filled(update.order_id, update.new_status, update.new_filled)
                .expect("resting order vanished from the store mid-match");
        }

        *book_guard = plan_book;

        let remaining = qty - plan.taker_filled;
        let order = match price {
            Some(p) => Order::Limit {
                id: order_id,
                user_id,
                ticker: ticker.clone(),
                direction,
                qty,
                price: p,
                filled: plan.taker_filled,
                status: plan.taker_status,
                timestamp: now,
            },
            None => Order::Market {
                id: order_id,
                user_id,
                ticker: ticker.clone(),
                direction,
                qty,
                filled: plan.taker_filled,
                status: plan.taker_status,
                timestamp: now,
            },
        };
        self.orders.insert(order);

        if remaining > 0 {
            debug_assert!(price.is_some(), "a market order never leaves a remainder");
        }

        Ok(order_id)
    }

    async fn apply_settlement(&self, trade: &SettledTrade) {
        self.ledger
            .settle(
                trade.seller_id,
                &trade.ticker,
                trade.buyer_id,
                &trade.ticker,
                trade.amount,
                ReserveSource::Reserved,
            )
            .await
            .expect("seller's reservation must cover the matched quantity");
        self.ledger
            .settle(
                trade.buyer_id,
                RUB,
                trade.seller_id,
                RUB,
                trade.amount * trade.price,
                ReserveSource::Reserved,
            )
            .await
            .expect("buyer's reservation must cover the matched cost");
    }

    /// Reservation rule, spec.md §4.5.1. Reads the book (no mutation) to
    /// pre-walk market orders; returns `(asset, amount, reservation_price)`
    /// where `reservation_price` is `Some` only for BUY limit orders, used
    /// later to compute the price-improvement refund.
    fn compute_reservation(
        &self,
        book: &OrderBook,
        direction: Direction,
        ticker: &str,
        qty: u64,
        price: Option<u64>,
    ) -> Result<(String, u64, Option<u64>), AppError> {
        match (direction, price) {
            (Direction::Buy, Some(p)) => Ok((RUB.to_string(), qty * p, Some(p))),
            (Direction::Sell, Some(_)) => Ok((ticker.to_string(), qty, None)),
            (Direction::Buy, None) => {
                let cost = book
                    .quote_market_buy_cost(qty)
                    .ok_or(AppError::LiquidityInsufficient)?;
                Ok((RUB.to_string(), cost, None))
            }
            (Direction::Sell, None) => {
                if book.aggregate_qty(Direction::Buy) < qty {
                    return Err(AppError::LiquidityInsufficient);
                }
                Ok((ticker.to_string(), qty, None))
            }
        }
    }

    /// Matching loop, spec.md §4.5.2, run against a private clone of the
    /// book so the real book and ledger are only touched after the trade
    /// log append durably succeeds.
    #[allow(clippy::too_many_arguments)]
    fn run_match(
        &self,
        plan_book: &mut OrderBook,
        taker_order_id: OrderId,
        taker_user: UserId,
        ticker: &str,
        direction: Direction,
        qty: u64,
        limit_price: Option<u64>,
        reservation_price: Option<u64>,
        now: SystemTime,
    ) -> MatchPlan {
        let opp = direction.opposite();
        let mut remaining = qty;
        let mut trades = Vec::new();
        let mut maker_updates = Vec::new();
        let mut refunds = Vec::new();

        while remaining > 0 {
            let Some((p, front)) = plan_book.peek_front(opp) else {
                break;
            };
            if let Some(lp) = limit_price {
                let exhausted = match direction {
                    Direction::Buy => p > lp,
                    Direction::Sell => p < lp,
                };
                if exhausted {
                    break;
                }
            }
            let maker_order_id = front.order_id;
            let maker_user = front.user_id;
            let x = remaining.min(front.remaining_qty);

            let (buyer_id, seller_id) = match direction {
                Direction::Buy => (taker_user, maker_user),
                Direction::Sell => (maker_user, taker_user),
            };
            trades.push(SettledTrade {
                ticker: ticker.to_string(),
                amount: x,
                price: p,
                buyer_id,
                seller_id,
                timestamp: now,
            });

            let refund = match (direction, reservation_price) {
                (Direction::Buy, Some(rp)) if p < rp => (rp - p) * x,
                _ => 0,
            };
            refunds.push(refund);

            let maker_order = self
                .orders
                .get(maker_order_id)
                .expect("resting entry without a backing order record");
            let new_filled = maker_order.filled() + x;
            let new_status = if new_filled >= maker_order.qty() {
                OrderStatus::Executed
            } else {
                OrderStatus::PartiallyExecuted
            };
            maker_updates.push(MakerUpdate {
                order_id: maker_order_id,
                new_filled,
                new_status,
            });

            plan_book.consume_front(opp, x);
            remaining -= x;
        }

        let taker_filled = qty - remaining;
        let taker_status = if limit_price.is_none() {
            OrderStatus::Executed
        } else if remaining == 0 {
            OrderStatus::Executed
        } else if taker_filled > 0 {
            OrderStatus::PartiallyExecuted
        } else {
            OrderStatus::New
        };

        if remaining > 0 {
            if let Some(price) = limit_price {
                let reserved_funds = match direction {
                    Direction::Buy => remaining * price,
                    Direction::Sell => remaining,
                };
                plan_book.push(
                    direction,
                    price,
                    RestingEntry {
                        order_id: taker_order_id,
                        user_id: taker_user,
                        remaining_qty: remaining,
                        reserved_funds,
                    },
                );
            }
        }

        MatchPlan {
            trades,
            maker_updates,
            refunds,
            taker_filled,
            taker_status,
        }
    }

    /// `DELETE /api/v1/order/{id}` (spec.md §4.5).
    pub async fn cancel(&self, user_id: UserId, order_id: OrderId) -> Result<(), AppError> {
        let order = self.orders.get(order_id).ok_or(AppError::NotFound)?;
        if order.user_id() != user_id {
            return Err(AppError::Forbidden);
        }
        if !order.status().is_cancellable() {
            return Err(AppError::NotCancellable);
        }

        let book = self.book_for(order.ticker()).await;
        let mut book_guard = book.lock().await;
        let (entry, _price) = book_guard
            .remove(order_id)
            .ok_or_else(|| AppError::Internal("resting order missing from the book".into()))?;
        drop(book_guard);

        let refund_asset = match order.direction() {
            Direction::Buy => RUB.to_string(),
            Direction::Sell => order.ticker().clone(),
        };
        self.ledger
            .release(user_id, &refund_asset, entry.reserved_funds)
            .await;

        self.orders
            .update_status_and_filled(order_id, OrderStatus::Cancelled, order.filled())
            .expect("order just looked up must still exist");
        Ok(())
    }
}
