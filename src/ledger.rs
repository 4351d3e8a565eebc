use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::instrument::Ticker;
use crate::user::UserId;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds")]
    InsufficientFunds,
}

/// Which partition a settlement draws from: the resting side's own
/// reservation, or (rarely) the taker's available balance for a leg that
/// was never reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveSource {
    Available,
    Reserved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceEntry {
    pub available: u64,
    pub reserved: u64,
}

impl BalanceEntry {
    pub fn total(&self) -> u64 {
        self.available + self.reserved
    }
}

/// Per-(user, asset) integer balances with atomic reserve/commit/refund
/// primitives (spec.md §4.1). A balance record exists iff touched;
/// absence reads as `(0, 0)`. One mutex guards the whole map: every
/// operation here completes in O(1) so contention stays low, and it
/// keeps the "atomic per key" guarantee trivially true without needing
/// per-key locks.
pub struct BalanceLedger {
    balances: Mutex<HashMap<(UserId, Ticker), BalanceEntry>>,
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self {
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, user: UserId, asset: &str) -> (u64, u64) {
        let balances = self.balances.lock().await;
        let entry = balances
            .get(&(user, asset.to_string()))
            .copied()
            .unwrap_or_default();
        (entry.available, entry.reserved)
    }

    /// Like [`get`](Self::get), but distinguishes "no row" from a row
    /// that nets to zero (e.g. deposited then fully withdrawn).
    pub async fn get_if_present(&self, user: UserId, asset: &str) -> Option<(u64, u64)> {
        let balances = self.balances.lock().await;
        balances
            .get(&(user, asset.to_string()))
            .map(|e| (e.available, e.reserved))
    }

    pub async fn deposit(&self, user: UserId, asset: &str, amount: u64) {
        debug_assert!(amount > 0);
        let mut balances = self.balances.lock().await;
        let entry = balances.entry((user, asset.to_string())).or_default();
        entry.available += amount;
    }

    pub async fn withdraw(&self, user: UserId, asset: &str, amount: u64) -> Result<(), LedgerError> {
        debug_assert!(amount > 0);
        let mut balances = self.balances.lock().await;
        let entry = balances.entry((user, asset.to_string())).or_default();
        if entry.available < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        entry.available -= amount;
        Ok(())
    }

    pub async fn reserve(&self, user: UserId, asset: &str, amount: u64) -> Result<(), LedgerError> {
        debug_assert!(amount > 0);
        let mut balances = self.balances.lock().await;
        let entry = balances.entry((user, asset.to_string())).or_default();
        if entry.available < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        entry.available -= amount;
        entry.reserved += amount;
        Ok(())
    }

    pub async fn release(&self, user: UserId, asset: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        let mut balances = self.balances.lock().await;
        let entry = balances.entry((user, asset.to_string())).or_default();
        debug_assert!(entry.reserved >= amount, "releasing more than reserved");
        entry.reserved -= amount;
        entry.available += amount;
    }

    /// Moves `amount` from `from_user`'s `from_asset` (drawn from
    /// `from_source`) to `to_user`'s `to_asset.available`. The two legs
    /// of a trade are two calls to `settle`, one for each asset.
    pub async fn settle(
        &self,
        from_user: UserId,
        from_asset: &str,
        to_user: UserId,
        to_asset: &str,
        amount: u64,
        from_source: ReserveSource,
    ) -> Result<(), LedgerError> {
        debug_assert!(amount > 0);
        let mut balances = self.balances.lock().await;
        {
            let from_entry = balances
                .entry((from_user, from_asset.to_string()))
                .or_default();
            match from_source {
                ReserveSource::Available => {
                    if from_entry.available < amount {
                        return Err(LedgerError::InsufficientFunds);
                    }
                    from_entry.available -= amount;
                }
                ReserveSource::Reserved => {
                    if from_entry.reserved < amount {
                        return Err(LedgerError::InsufficientFunds);
                    }
                    from_entry.reserved -= amount;
                }
            }
        }
        let to_entry = balances.entry((to_user, to_asset.to_string())).or_default();
        to_entry.available += amount;
        Ok(())
    }
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn deposit_then_reserve_then_release() {
        let ledger = BalanceLedger::new();
        let u = Uuid::new_v4();
        ledger.deposit(u, "RUB", 1000).await;
        ledger.reserve(u, "RUB", 400).await.unwrap();
        assert_eq!(ledger.get(u, "RUB").await, (600, 400));
        ledger.release(u, "RUB", 400).await;
        assert_eq!(ledger.get(u, "RUB").await, (1000, 0));
    }

    #[tokio::test]
    async fn reserve_insufficient_funds() {
        let ledger = BalanceLedger::new();
        let u = Uuid::new_v4();
        ledger.deposit(u, "RUB", 100).await;
        assert_eq!(
            ledger.reserve(u, "RUB", 200).await,
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(ledger.get(u, "RUB").await, (100, 0));
    }

    #[tokio::test]
    async fn settle_moves_between_users() {
        let ledger = BalanceLedger::new();
        let buyer = Uuid::new_v4();
        let seller = Uuid::new_v4();
        ledger.deposit(buyer, "RUB", 1000).await;
        ledger.reserve(buyer, "RUB", 500).await.unwrap();
        ledger
            .settle(buyer, "RUB", seller, "RUB", 500, ReserveSource::Reserved)
            .await
            .unwrap();
        assert_eq!(ledger.get(buyer, "RUB").await, (500, 0));
        assert_eq!(ledger.get(seller, "RUB").await, (500, 0));
    }

    #[tokio::test]
    async fn withdraw_insufficient_funds_leaves_balance_untouched() {
        let ledger = BalanceLedger::new();
        let u = Uuid::new_v4();
        ledger.deposit(u, "RUB", 50).await;
        assert_eq!(
            ledger.withdraw(u, "RUB", 100).await,
            Err(LedgerError::InsufficientFunds)
        );
        assert_eq!(ledger.get(u, "RUB").await, (50, 0));
    }

    #[tokio::test]
    async fn get_if_present_distinguishes_untouched_from_zeroed() {
        let ledger = BalanceLedger::new();
        let u = Uuid::new_v4();
        assert_eq!(ledger.get_if_present(u, "RUB").await, None);

        ledger.deposit(u, "RUB", 50).await;
        ledger.withdraw(u, "RUB", 50).await.unwrap();
        assert_eq!(ledger.get_if_present(u, "RUB").await, Some((0, 0)));
    }
}
