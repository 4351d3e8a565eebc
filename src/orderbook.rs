use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use crate::orders::{Direction, OrderId};
use crate::user::UserId;

/// A resting limit order sitting on one side of the book.
#[derive(Debug, Clone)]
pub struct RestingEntry {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub remaining_qty: u64,
    pub reserved_funds: u64,
}

/// Aggregated depth at one price level, as exposed by the public
/// orderbook endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Level {
    pub price: u64,
    pub qty: u64,
}

/// Per-instrument order book: two price-sorted maps, each a FIFO queue
/// of resting entries (spec.md §4.4). Bids are keyed ascending by price
/// in the `BTreeMap`, walked in reverse for best-first access since the
/// best bid is the highest price; asks are walked forward since the best
/// ask is the lowest price.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BTreeMap<u64, VecDeque<RestingEntry>>,
    asks: BTreeMap<u64, VecDeque<RestingEntry>>,
    /// order_id -> (side, price), so `remove` never scans every level.
    index: HashMap<OrderId, (Direction, u64)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn side(&self, side: Direction) -> &BTreeMap<u64, VecDeque<RestingEntry>> {
        match side {
            Direction::Buy => &self.bids,
            Direction::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Direction) -> &mut BTreeMap<u64, VecDeque<RestingEntry>> {
        match side {
            Direction::Buy => &mut self.bids,
            Direction::Sell => &mut self.asks,
        }
    }

    /// Best price on `side`: highest bid, lowest ask.
    pub fn best(&self, side: Direction) -> Option<u64> {
        match side {
            Direction::Buy => self.bids.keys().next_back().copied(),
            Direction::Sell => self.asks.keys().next().copied(),
        }
    }

    pub fn push(&mut self, side: Direction, price: u64, entry: RestingEntry) {
        self.index.insert(entry.order_id, (side, price));
        self.side_mut(side)
            .entry(price)
            .or_default()
            .push_back(entry);
    }

    /// The earliest entry at the best price: price-time priority.
    pub fn peek_front(&self, side: Direction) -> Option<(u64, &RestingEntry)> {
        let price = self.best(side)?;
        let entry = self.side(side).get(&price)?.front()?;
        Some((price, entry))
    }

    /// Reduces the front entry's remaining quantity by `delta`, shrinking
    /// `reserved_funds` by the same proportion (the per-unit rate is
    /// invariant for an entry's whole life: its price never changes).
    /// Removes the entry if it reaches zero, and the level if it becomes
    /// empty.
    pub fn consume_front(&mut self, side: Direction, delta: u64) {
        let Some(price) = self.best(side) else {
            return;
        };
        let levels = match side {
            Direction::Buy => &mut self.bids,
            Direction::Sell => &mut self.asks,
        };
        let Some(queue) = levels.get_mut(&price) else {
            return;
        };
        let remove_level;
        let mut removed_id = None;
        {
            let Some(front) = queue.front_mut() else {
                return;
            };
            debug_assert!(delta <= front.remaining_qty);
            let unit_reserve = front.reserved_funds / front.remaining_qty;
            front.remaining_qty -= delta;
            front.reserved_funds -= delta * unit_reserve;
            if front.remaining_qty == 0 {
                let removed = queue.pop_front().unwrap();
                removed_id = Some(removed.order_id);
            }
            remove_level = queue.is_empty();
        }
        if remove_level {
            levels.remove(&price);
        }
        if let Some(order_id) = removed_id {
            self.index.remove(&order_id);
        }
    }

    /// O(1) lookup of the level via the index, then a scan within that
    /// single price level's FIFO to remove the specific entry.
    pub fn remove(&mut self, order_id: OrderId) -> Option<(RestingEntry, u64)> {
        let (side, price) = self.index.remove(&order_id)?;
        let levels = self.side_mut(side);
        let queue = levels.get_mut(&price)?;
        let pos = queue.iter().position(|e| e.order_id == order_id)?;
        let entry = queue.remove(pos)?;
        if queue.is_empty() {
            levels.remove(&price);
        }
        Some((entry, price))
    }

    pub fn is_empty(&self, side: Direction) -> bool {
        self.side(side).is_empty()
    }

    /// Aggregate qty available on `side`, used by the market-order
    /// liquidity pre-walk.
    pub fn aggregate_qty(&self, side: Direction) -> u64 {
        self.side(side)
            .values()
            .flat_map(|q| q.iter())
            .map(|e| e.remaining_qty)
            .sum()
    }

    /// Walks the ask side from the best price up, accumulating the exact
    /// RUB cost of filling `qty` units. `None` if the book cannot fully
    /// fill it (spec.md §4.5.1's BUY-market pre-walk).
    pub fn quote_market_buy_cost(&self, qty: u64) -> Option<u64> {
        let mut remaining = qty;
        let mut cost: u128 = 0;
        for (&price, queue) in self.asks.iter() {
            if remaining == 0 {
                break;
            }
            let level_qty: u64 = queue.iter().map(|e| e.remaining_qty).sum();
            let take = remaining.min(level_qty);
            cost += u128::from(take) * u128::from(price);
            remaining -= take;
        }
        if remaining > 0 {
            None
        } else {
            Some(cost.try_into().expect("trade cost overflowed u64"))
        }
    }

    /// Top `limit` aggregated price levels on `side`, best-first.
    pub fn depth(&self, side: Direction, limit: usize) -> Vec<Level> {
        let levels = self.side(side).iter().map(|(price, queue)| Level {
            price: *price,
            qty: queue.iter().map(|e| e.remaining_qty).sum(),
        });
        match side {
            Direction::Buy => levels.rev().take(limit).collect(),
            Direction::Sell => levels.take(limit).collect(),
        }
    }

    /// No crossed book at rest (spec.md I5): best bid < best ask whenever
    /// both sides are non-empty.
    #[cfg(test)]
    pub fn is_crossed(&self) -> bool {
        match (self.best(Direction::Buy), self.best(Direction::Sell)) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}
