use std::sync::Arc;

use crate::cache::{self, StateCache};
use crate::exchange::{BinanceSpot, BookTicker, GatewayError, OrderSnapshot};
use crate::logging::{log, obj, v_str, Domain, Level};

/// Cache-first lookups with a REST fallback.
///
/// A miss never waits for the cache to fill; the fallback request runs in
/// the same call under the client's retry budget.
pub struct MarketDataResolver {
    api: Arc<BinanceSpot>,
    cache: Box<dyn StateCache>,
}

impl MarketDataResolver {
    pub fn new(api: Arc<BinanceSpot>, cache: Box<dyn StateCache>) -> Self {
        Self { api, cache }
    }

    pub async fn get_ticker(&self, symbol: &str) -> Option<BookTicker> {
        if let Some(ticker) = cache::read_ticker(self.cache.as_ref(), symbol) {
            return Some(ticker);
        }
        fallback("get_ticker", symbol, self.api.get_ticker_from_api(symbol).await)
    }

    pub async fn get_order(&self, symbol: &str, client_order_id: &str) -> Option<OrderSnapshot> {
        if let Some(order) = cache::read_order(self.cache.as_ref(), client_order_id) {
            return Some(order);
        }
        fallback(
            "get_order",
            client_order_id,
            self.api.get_order_from_api(symbol, client_order_id).await,
        )
    }

    /// Average price, or 0.0 when it cannot be read.
    pub async fn get_avg_price(&self, symbol: &str) -> f64 {
        fallback("get_avg_price", symbol, self.api.get_avg_price(symbol).await).unwrap_or(0.0)
    }
}

fn fallback<T>(op: &str, subject: &str, result: Result<T, GatewayError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log(
                Level::Warn,
                Domain::Market,
                "lookup_failed",
                obj(&[
                    ("op", v_str(op)),
                    ("subject", v_str(subject)),
                    ("error", v_str(&err.to_string())),
                ]),
            );
            None
        }
    }
}
