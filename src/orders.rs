use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instrument::Ticker;
use crate::user::UserId;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyExecuted,
    Executed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Executed | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyExecuted)
    }
}

/// Body of a `POST /api/v1/order` request: the tagged union spec.md calls
/// out as the "polymorphic order body". The engine branches on this tag
/// once, at entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OrderBody {
    Limit(LimitOrderBody),
    Market(MarketOrderBody),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitOrderBody {
    pub direction: Direction,
    pub ticker: Ticker,
    pub qty: u64,
    pub price: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketOrderBody {
    pub direction: Direction,
    pub ticker: Ticker,
    pub qty: u64,
}

/// A persisted order. Market orders never carry a resting representation
/// on the book; they execute fully on arrival or are rejected (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Order {
    Limit {
        id: OrderId,
        user_id: UserId,
        ticker: Ticker,
        direction: Direction,
        qty: u64,
        price: u64,
        filled: u64,
        status: OrderStatus,
        timestamp: SystemTime,
    },
    Market {
        id: OrderId,
        user_id: UserId,
        ticker: Ticker,
        direction: Direction,
        qty: u64,
        filled: u64,
        status: OrderStatus,
        timestamp: SystemTime,
    },
}

impl Order {
    pub fn id(&self) -> OrderId {
        match self {
            Order::Limit { id, .. } | Order::Market { id, .. } => *id,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Order::Limit { user_id, .. } | Order::Market { user_id, .. } => *user_id,
        }
    }

    pub fn ticker(&self) -> &Ticker {
        match self {
            Order::Limit { ticker, .. } | Order::Market { ticker, .. } => ticker,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Order::Limit { direction, .. } | Order::Market { direction, .. } => *direction,
        }
    }

    pub fn qty(&self) -> u64 {
        match self {
            Order::Limit { qty, .. } | Order::Market { qty, .. } => *qty,
        }
    }

    pub fn filled(&self) -> u64 {
        match self {
            Order::Limit { filled, .. } | Order::Market { filled, .. } => *filled,
        }
    }

    pub fn status(&self) -> OrderStatus {
        match self {
            Order::Limit { status, .. } | Order::Market { status, .. } => *status,
        }
    }

    pub fn price(&self) -> Option<u64> {
        match self {
            Order::Limit { price, .. } => Some(*price),
            Order::Market { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderStoreError {
    #[error("order not found")]
    NotFound,
}

/// Durable record of every submitted order, with mutable status and
/// filled quantity (spec.md §4.2). The monotonicity rule ("status may
/// not regress from EXECUTED/CANCELLED; filled may only increase") is an
/// engine-internal invariant, not something an external caller can
/// violate, so a breach here is a programming bug in the engine, not a
/// recoverable condition.
pub struct OrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, order: Order) {
        self.orders.write().unwrap().insert(order.id(), order);
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.read().unwrap().get(&id).cloned()
    }

    pub fn list_by_user(&self, user_id: UserId) -> Vec<Order> {
        self.orders
            .read()
            .unwrap()
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect()
    }

    /// Updates status and filled quantity on an existing order.
    /// `filled` may only increase and `status` may not regress out of a
    /// terminal state; callers (the engine) must never attempt either.
    pub fn update_status_and_filled(
        &self,
        id: OrderId,
        status: OrderStatus,
        filled: u64,
    ) -> Result<(), OrderStoreError> {
        let mut orders = self.orders.write().unwrap();
        let order = orders.get_mut(&id).ok_or(OrderStoreError::NotFound)?;
        debug_assert!(
            filled >= order.filled(),
            "filled must be monotonically increasing"
        );
        debug_assert!(
            !order.status().is_terminal() || status == order.status(),
            "status must not regress out of a terminal state"
        );
        match order {
            Order::Limit {
                status: s,
                filled: f,
                ..
            }
            | Order::Market {
                status: s,
                filled: f,
                ..
            } => {
                *s = status;
                *f = filled;
            }
        }
        Ok(())
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}
