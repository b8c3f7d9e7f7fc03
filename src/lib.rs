//! Grid market-making against a spot exchange.
//!
//! A small ladder of limit orders is kept around the average price. Each
//! cycle reconciles the local order ledger with the exchange (cache first,
//! REST fallback) and tops the ladder back up.

pub mod cache;
pub mod config;
pub mod engine;
pub mod exchange;
pub mod grid;
pub mod logging;
pub mod orders;
pub mod resolver;

pub use config::GridConfig;
pub use engine::{CycleReport, FillRecord, GridEngine};
