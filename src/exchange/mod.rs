use serde::{Deserialize, Serialize};
use thiserror::Error;

mod binance;
pub mod client_id;
pub mod retry;
pub mod signing;
pub mod transport;

pub use binance::{AccountInfo, Balance, BinanceSpot, CancelAck, OrderRequest};
pub use client_id::ClientOrderIdGenerator;
pub use transport::{HttpTransport, Transport, TransportError};

use crate::orders::OrderStatus;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No usable answer. The request may or may not have reached the exchange.
    #[error("transport failure after {attempts} attempt(s): {last}")]
    Transport { attempts: u32, last: TransportError },
    #[error("exchange rejected request (http {status}, code {code}): {msg}")]
    Rejected { status: u16, code: i64, msg: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl GatewayError {
    /// True when the request might have taken effect on the exchange.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Limit,
    Market,
    Stop,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::Stop => "STOP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeInForce {
    #[default]
    Gtc,
    Ioc,
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

/// Best bid/ask in the REST `bookTicker` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTicker {
    pub symbol: String,
    pub bid_price: String,
    pub bid_qty: String,
    pub ask_price: String,
    pub ask_qty: String,
}

impl BookTicker {
    pub fn bid(&self) -> f64 {
        self.bid_price.parse().unwrap_or(0.0)
    }

    pub fn ask(&self) -> f64 {
        self.ask_price.parse().unwrap_or(0.0)
    }
}

/// An order in the REST schema. Returned by placement, status queries and
/// the open-orders listing; only the fields the engine reads are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<Side>,
    pub client_order_id: String,
    pub price: String,
    pub orig_qty: String,
    pub status: OrderStatus,
}

impl OrderSnapshot {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn qty_f64(&self) -> f64 {
        self.orig_qty.parse().unwrap_or(0.0)
    }
}

/// Decimal rendering used in request parameters: up to 8 places, no
/// trailing zeros.
pub fn fmt_decimal(value: f64) -> String {
    let s = format!("{:.8}", value);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
