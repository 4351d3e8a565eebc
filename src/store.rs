use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use parity_db::{BTreeIterator, ColId, Db, Options};
use thiserror::Error;

use crate::trade::Trade;

/// Errors from the key/value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),
    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only trade history, persisted through ParityDB (spec.md §4.3).
///
/// Key layout (big-endian for lexicographic == chronological ordering):
/// `"{ticker}:" + ts_nanos(u128) + seq(u64)`. The sequence counter breaks
/// ties between trades stamped in the same nanosecond, which happens
/// routinely when several fills land in one matching pass.
pub struct TradeStore {
    db: Db,
    seq: AtomicU64,
}

impl TradeStore {
    /// Open (or create) a ParityDB at `path`, with a single column and a
    /// B-tree index for prefix scans per ticker.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 1);
        opts.columns[0].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(TradeStore {
            db,
            seq: AtomicU64::new(0),
        })
    }

    #[inline]
    fn to_nanos(ts: SystemTime) -> u128 {
        ts.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos()
    }

    #[inline]
    fn prefix(ticker: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(ticker.len() + 1);
        k.extend_from_slice(ticker.as_bytes());
        k.push(b':');
        k
    }

    #[inline]
    fn encode_key(ticker: &str, trade: &Trade, seq: u64) -> Vec<u8> {
        let mut key = Self::prefix(ticker);
        key.extend_from_slice(&Self::to_nanos(trade.timestamp).to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Appends a trade under the composite key described above.
    pub fn append(&self, trade: &Trade) -> StoreResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let col: ColId = 0;
        let key = Self::encode_key(&trade.ticker, trade, seq);
        let value = bincode::encode_to_vec(trade, standard())?;
        self.db.commit(vec![(col, key, Some(value))])?;
        Ok(())
    }

    /// Appends a whole match's trades in a single ParityDB commit, so a
    /// multi-fill match either persists in full or not at all — the
    /// durability half of the engine's commit/rollback unit.
    pub fn append_batch(&self, trades: &[Trade]) -> StoreResult<()> {
        if trades.is_empty() {
            return Ok(());
        }
        let col: ColId = 0;
        let mut writes = Vec::with_capacity(trades.len());
        for trade in trades {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            let key = Self::encode_key(&trade.ticker, trade, seq);
            let value = bincode::encode_to_vec(trade, standard())?;
            writes.push((col, key, Some(value)));
        }
        self.db.commit(writes)?;
        Ok(())
    }

    /// The `limit` most recent trades for `ticker`, newest first
    /// (spec.md §4.3 / §6). Scans the ticker's committed range ascending
    /// then reverses, since ParityDB's B-tree iterator only walks
    /// forward; per-ticker history is bounded in practice by the trading
    /// activity on a single instrument.
    pub fn list(&self, ticker: &str, limit: usize) -> StoreResult<Vec<Trade>> {
        let col: ColId = 0;
        let mut it: BTreeIterator<'_> = self.db.iter(col)?;
        let prefix = Self::prefix(ticker);
        it.seek(&prefix)?;

        let mut all = Vec::new();
        while let Some((k, v)) = it.next()? {
            if !k.starts_with(&prefix) {
                break;
            }
            let (trade, _): (Trade, usize) = bincode::decode_from_slice(&v, standard())?;
            all.push(trade);
        }
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn trade(ticker: &str, price: u64, nanos: u64) -> Trade {
        Trade {
            ticker: ticker.to_string(),
            amount: 1,
            price,
            timestamp: UNIX_EPOCH + Duration::from_nanos(nanos),
        }
    }

    #[test]
    fn list_returns_newest_first() {
        let dir = tempdir().unwrap();
        let store = TradeStore::open(dir.path()).unwrap();
        store.append(&trade("MEMCOIN", 100, 1)).unwrap();
        store.append(&trade("MEMCOIN", 101, 2)).unwrap();
        store.append(&trade("MEMCOIN", 102, 3)).unwrap();

        let recent = store.list("MEMCOIN", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].price, 102);
        assert_eq!(recent[1].price, 101);
    }

    #[test]
    fn list_isolates_by_ticker() {
        let dir = tempdir().unwrap();
        let store = TradeStore::open(dir.path()).unwrap();
        store.append(&trade("MEMCOIN", 100, 1)).unwrap();
        store.append(&trade("OTHER", 50, 2)).unwrap();

        let recent = store.list("MEMCOIN", 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].price, 100);
    }

    #[test]
    fn same_nanosecond_trades_both_persist() {
        let dir = tempdir().unwrap();
        let store = TradeStore::open(dir.path()).unwrap();
        store.append(&trade("MEMCOIN", 100, 5)).unwrap();
        store.append(&trade("MEMCOIN", 101, 5)).unwrap();

        let recent = store.list("MEMCOIN", 10).unwrap();
        assert_eq!(recent.len(), 2);
    }
}
