use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::instrument::Ticker;
use crate::user::UserId;

/// The external trade projection (spec.md §3): no party identities.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Trade {
    pub ticker: Ticker,
    pub amount: u64,
    pub price: u64,
    #[bincode(with_serde)]
    pub timestamp: SystemTime,
}

/// The in-engine record: price comes from the resting (maker) order,
/// amount is the quantity filled, buyer/seller are needed for settlement
/// and are never exposed outside the engine.
#[derive(Debug, Clone)]
pub struct SettledTrade {
    pub ticker: Ticker,
    pub amount: u64,
    pub price: u64,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub timestamp: SystemTime,
}

impl SettledTrade {
    pub fn projection(&self) -> Trade {
        Trade {
            ticker: self.ticker.clone(),
            amount: self.amount,
            price: self.price,
            timestamp: self.timestamp,
        }
    }
}
