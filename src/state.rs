use std::path::Path;
use std::sync::Arc;

use crate::engine::MatchingEngine;
use crate::instrument::InstrumentCatalog;
use crate::ledger::BalanceLedger;
use crate::orders::OrderStore;
use crate::store::{StoreResult, TradeStore};
use crate::user::UserStore;

/// Shared application state handed to every route (spec.md §4). `RUB` is
/// bootstrapped as a reserved asset at startup: it is never a member of
/// the instrument catalog but every user's cash balance lives under it.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<InstrumentCatalog>,
    pub users: Arc<UserStore>,
    pub ledger: Arc<BalanceLedger>,
    pub orders: Arc<OrderStore>,
    pub trades: Arc<TradeStore>,
    pub engine: Arc<MatchingEngine>,
}

impl AppState {
    pub async fn new(store_path: impl AsRef<Path>) -> StoreResult<Self> {
        let catalog = Arc::new(InstrumentCatalog::new());
        let users = Arc::new(UserStore::new());
        let ledger = Arc::new(BalanceLedger::new());
        let orders = Arc::new(OrderStore::new());
        let trades = Arc::new(TradeStore::open(store_path)?);
        let engine = Arc::new(MatchingEngine::new(
            catalog.clone(),
            ledger.clone(),
            orders.clone(),
            trades.clone(),
        ));
        Ok(Self {
            catalog,
            users,
            ledger,
            orders,
            trades,
            engine,
        })
    }
}
