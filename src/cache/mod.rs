//! Read side of the shared state cache.
//!
//! An external stream process writes book tickers and execution reports
//! here using the stream's abbreviated field names. Everything read back is
//! translated into the REST shapes before it leaves this module.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::exchange::{BookTicker, OrderSnapshot, Side};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::orders::OrderStatus;

mod sqlite;

pub use sqlite::SqliteCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub trait StateCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
}

impl<T: StateCache + ?Sized> StateCache for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key)
    }
}

pub fn ticker_key(symbol: &str) -> String {
    format!("bookTicker_{}", symbol)
}

/// `bookTicker` stream event as stored in the cache.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamedBookTicker {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bid_price: String,
    #[serde(rename = "B")]
    pub bid_qty: String,
    #[serde(rename = "a")]
    pub ask_price: String,
    #[serde(rename = "A")]
    pub ask_qty: String,
}

impl From<StreamedBookTicker> for BookTicker {
    fn from(t: StreamedBookTicker) -> Self {
        BookTicker {
            symbol: t.symbol,
            bid_price: t.bid_price,
            bid_qty: t.bid_qty,
            ask_price: t.ask_price,
            ask_qty: t.ask_qty,
        }
    }
}

/// Last `executionReport` seen for an order, keyed by client order id.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamedExecutionReport {
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "q")]
    pub orig_qty: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    #[serde(rename = "S", default)]
    pub side: Option<Side>,
}

impl From<StreamedExecutionReport> for OrderSnapshot {
    fn from(r: StreamedExecutionReport) -> Self {
        OrderSnapshot {
            symbol: r.symbol,
            side: r.side,
            client_order_id: r.client_order_id,
            price: r.price,
            orig_qty: r.orig_qty,
            status: r.status,
        }
    }
}

/// Read and decode one entry. Any failure, including an entry that does
/// not match the stream schema, is logged and reported as a miss.
fn lookup<S: DeserializeOwned>(cache: &dyn StateCache, key: &str) -> Option<S> {
    let raw = match cache.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            log(
                Level::Warn,
                Domain::Cache,
                "cache_read_failed",
                obj(&[("key", v_str(key)), ("error", v_str(&err.to_string()))]),
            );
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(entry) => Some(entry),
        Err(err) => {
            log(
                Level::Warn,
                Domain::Cache,
                "cache_entry_malformed",
                obj(&[("key", v_str(key)), ("error", v_str(&err.to_string()))]),
            );
            None
        }
    }
}

pub fn read_ticker(cache: &dyn StateCache, symbol: &str) -> Option<BookTicker> {
    lookup::<StreamedBookTicker>(cache, &ticker_key(symbol)).map(BookTicker::from)
}

pub fn read_order(cache: &dyn StateCache, client_order_id: &str) -> Option<OrderSnapshot> {
    lookup::<StreamedExecutionReport>(cache, client_order_id).map(OrderSnapshot::from)
}

/// Process-local cache, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    pub fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

impl StateCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.entries
            .read()
            .map(|entries| entries.get(key).cloned())
            .map_err(|_| CacheError::Unavailable("memory cache lock poisoned".into()))
    }
}

/// No cache configured: every read misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl StateCache for NoCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl StateCache for Broken {
        fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_ticker_normalized_from_stream_schema() {
        let cache = MemoryCache::new();
        cache.put(
            "bookTicker_BTCUSDT",
            r#"{"s":"BTCUSDT","b":"100.00","B":"1","a":"100.10","A":"1"}"#,
        );
        let ticker = read_ticker(&cache, "BTCUSDT").unwrap();
        assert_eq!(
            ticker,
            BookTicker {
                symbol: "BTCUSDT".into(),
                bid_price: "100.00".into(),
                bid_qty: "1".into(),
                ask_price: "100.10".into(),
                ask_qty: "1".into(),
            }
        );
        let rest = serde_json::to_value(&ticker).unwrap();
        assert_eq!(rest["bidPrice"], "100.00");
        assert_eq!(rest["askPrice"], "100.10");
    }

    #[test]
    fn test_ticker_read_is_idempotent() {
        let cache = MemoryCache::new();
        cache.put(
            "bookTicker_ETHUSDT",
            r#"{"u":1,"s":"ETHUSDT","b":"2000.1","B":"3","a":"2000.2","A":"4"}"#,
        );
        assert_eq!(read_ticker(&cache, "ETHUSDT"), read_ticker(&cache, "ETHUSDT"));
    }

    #[test]
    fn test_execution_report_normalized() {
        let cache = MemoryCache::new();
        cache.put(
            "x-AZA73711",
            r#"{"e":"executionReport","s":"BTCUSDT","S":"SELL","c":"x-AZA73711","q":"0.001","p":"101.00","X":"FILLED"}"#,
        );
        let snap = read_order(&cache, "x-AZA73711").unwrap();
        assert_eq!(snap.client_order_id, "x-AZA73711");
        assert_eq!(snap.status, OrderStatus::Filled);
        assert_eq!(snap.price, "101.00");
        assert_eq!(snap.orig_qty, "0.001");
        assert_eq!(snap.side, Some(Side::Sell));
    }

    #[test]
    fn test_malformed_and_failed_reads_are_misses() {
        let cache = MemoryCache::new();
        cache.put("bookTicker_BTCUSDT", r#"{"s":"BTCUSDT","b":"100.00"}"#);
        cache.put("cid", "not json");
        assert!(read_ticker(&cache, "BTCUSDT").is_none());
        assert!(read_order(&cache, "cid").is_none());
        assert!(read_ticker(&Broken, "BTCUSDT").is_none());
        assert!(read_order(&NoCache, "cid").is_none());
    }
}
