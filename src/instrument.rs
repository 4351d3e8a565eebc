use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// The reserved quote-currency asset. Never registrable as an instrument.
pub const RUB: &str = "RUB";

/// A ticker: 2-10 uppercase letters, validated at every entry point that
/// accepts one from outside.
pub type Ticker = String;

pub fn is_valid_ticker_format(ticker: &str) -> bool {
    let len = ticker.len();
    (2..=10).contains(&len) && ticker.bytes().all(|b| b.is_ascii_uppercase())
}

#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("invalid ticker format")]
    BadFormat,
    #[error("RUB is a reserved asset and cannot be registered as an instrument")]
    ReservedTicker,
    #[error("instrument already exists")]
    AlreadyExists,
    #[error("instrument not found")]
    NotFound,
}

/// A tradeable instrument, e.g. `{name: "Memcoin", ticker: "MEMCOIN"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub ticker: Ticker,
}

/// Admin-managed registry of instruments. `RUB` is never a member: it is
/// cash, not a tradeable instrument.
pub struct InstrumentCatalog {
    instruments: RwLock<HashMap<Ticker, Instrument>>,
}

impl InstrumentCatalog {
    pub fn new() -> Self {
        Self {
            instruments: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, name: String, ticker: Ticker) -> Result<(), InstrumentError> {
        if !is_valid_ticker_format(&ticker) {
            return Err(InstrumentError::BadFormat);
        }
        if ticker == RUB {
            return Err(InstrumentError::ReservedTicker);
        }
        let mut instruments = self.instruments.write().unwrap();
        if instruments.contains_key(&ticker) {
            return Err(InstrumentError::AlreadyExists);
        }
        instruments.insert(ticker.clone(), Instrument { name, ticker });
        Ok(())
    }

    pub fn remove(&self, ticker: &str) -> Result<(), InstrumentError> {
        let mut instruments = self.instruments.write().unwrap();
        instruments
            .remove(ticker)
            .map(|_| ())
            .ok_or(InstrumentError::NotFound)
    }

    pub fn exists(&self, ticker: &str) -> bool {
        self.instruments.read().unwrap().contains_key(ticker)
    }

    pub fn get(&self, ticker: &str) -> Option<Instrument> {
        self.instruments.read().unwrap().get(ticker).cloned()
    }

    pub fn list(&self) -> Vec<Instrument> {
        self.instruments.read().unwrap().values().cloned().collect()
    }
}

impl Default for InstrumentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_lowercase_and_bad_length() {
        assert!(!is_valid_ticker_format("memcoin"));
        assert!(!is_valid_ticker_format("A"));
        assert!(!is_valid_ticker_format("TOOLONGTICKERXX"));
        assert!(is_valid_ticker_format("MEMCOIN"));
    }

    #[test]
    fn rejects_rub_registration() {
        let cat = InstrumentCatalog::new();
        assert!(matches!(
            cat.register("Rouble".into(), RUB.into()),
            Err(InstrumentError::ReservedTicker)
        ));
    }

    #[test]
    fn register_then_duplicate_fails() {
        let cat = InstrumentCatalog::new();
        cat.register("Memcoin".into(), "MEMCOIN".into()).unwrap();
        assert!(matches!(
            cat.register("Memcoin2".into(), "MEMCOIN".into()),
            Err(InstrumentError::AlreadyExists)
        ));
        assert!(cat.exists("MEMCOIN"));
    }

    #[test]
    fn remove_unknown_fails() {
        let cat = InstrumentCatalog::new();
        assert!(matches!(cat.remove("MEMCOIN"), Err(InstrumentError::NotFound)));
    }
}
