//! Ladder pricing: where the next buy/sell goes and how big it is.

use crate::config::GridConfig;
use crate::exchange::Side;

/// Live top of book used to keep new orders from crossing the spread.
/// Zero means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

#[derive(Debug, Clone)]
pub struct GridPolicy {
    gap: f64,
    quantity: f64,
    price_step: f64,
    qty_step: f64,
}

impl GridPolicy {
    pub fn new(gap: f64, quantity: f64, price_step: f64, qty_step: f64) -> Self {
        Self {
            gap,
            quantity,
            price_step,
            qty_step,
        }
    }

    pub fn from_config(cfg: &GridConfig) -> Self {
        Self::new(cfg.gap_percent, cfg.quantity, cfg.min_price, cfg.min_qty)
    }

    /// Target price for `side`, `gap` away from `last`, on the tick grid.
    ///
    /// A buy is never above a known bid and a sell never below a known ask;
    /// a target that would cross is snapped to that side of the book.
    pub fn price(&self, last: f64, side: Side, quote: &Quote) -> f64 {
        let gap = match side {
            Side::Buy => -self.gap,
            Side::Sell => self.gap,
        };
        let price = round_to(last * (1.0 + gap), self.price_step);

        match side {
            Side::Buy if quote.bid > 0.0 && price > quote.bid => round_to(quote.bid, self.price_step),
            Side::Sell if price > 0.0 && price < quote.ask => round_to(quote.ask, self.price_step),
            _ => price,
        }
    }

    /// Constant order size on the quantity grid.
    pub fn size(&self) -> f64 {
        round_to(self.quantity, self.qty_step)
    }
}

/// Number of decimals in `step` as written, e.g. 0.01 -> 2, 1 -> 0.
pub fn step_decimals(step: f64) -> usize {
    let s = format!("{}", step);
    s.split_once('.').map(|(_, frac)| frac.len()).unwrap_or(0).min(12)
}

/// Round `value` to the nearest multiple of `step`, cleaned to the step's
/// decimal places so 99.00000000001 comes back as 99.0.
pub fn round_to(value: f64, step: f64) -> f64 {
    if !(step > 0.0) || !value.is_finite() {
        return value;
    }
    let snapped = (value / step).round() * step;
    let factor = 10f64.powi(step_decimals(step) as i32);
    (snapped * factor).round() / factor
}
