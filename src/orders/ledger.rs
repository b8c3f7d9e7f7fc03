use std::cmp::Ordering;

use super::status::OrderStatus;
use crate::exchange::{OrderSnapshot, Side};

/// A resting limit order this process placed and still believes is open.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub client_order_id: String,
    pub price: f64,
    pub quantity: f64,
    pub status: OrderStatus,
}

impl Order {
    /// Build from a placement acknowledgement. Fields missing in the ack fall
    /// back to what was requested.
    pub fn from_placement(symbol: &str, side: Side, price: f64, quantity: f64, ack: &OrderSnapshot) -> Self {
        Self {
            symbol: ack.symbol.clone().unwrap_or_else(|| symbol.to_string()),
            side,
            client_order_id: ack.client_order_id.clone(),
            price: ack.price.parse::<f64>().ok().filter(|p| *p > 0.0).unwrap_or(price),
            quantity: ack.orig_qty.parse::<f64>().ok().filter(|q| *q > 0.0).unwrap_or(quantity),
            status: ack.status.clone(),
        }
    }
}

/// Local view of outstanding orders, one list per side.
#[derive(Debug, Clone, Default)]
pub struct OrderLedger {
    buys: Vec<Order>,
    sells: Vec<Order>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_mut(&mut self, side: Side) -> &mut Vec<Order> {
        match side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        }
    }

    pub fn side(&self, side: Side) -> &[Order] {
        match side {
            Side::Buy => &self.buys,
            Side::Sell => &self.sells,
        }
    }

    pub fn len(&self, side: Side) -> usize {
        self.side(side).len()
    }

    pub fn total(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn contains(&self, client_order_id: &str) -> bool {
        self.get(client_order_id).is_some()
    }

    pub fn get(&self, client_order_id: &str) -> Option<&Order> {
        self.iter().find(|o| o.client_order_id == client_order_id)
    }

    /// Append to the order's side. An id already present is replaced in place
    /// so an order never sits in the ledger twice.
    pub fn track(&mut self, order: Order) {
        self.untrack_from_other_side(&order);
        let list = self.side_mut(order.side);
        match list.iter_mut().find(|o| o.client_order_id == order.client_order_id) {
            Some(existing) => *existing = order,
            None => list.push(order),
        }
    }

    fn untrack_from_other_side(&mut self, order: &Order) {
        let other = match order.side {
            Side::Buy => &mut self.sells,
            Side::Sell => &mut self.buys,
        };
        other.retain(|o| o.client_order_id != order.client_order_id);
    }

    /// Remove by client order id from whichever side holds it.
    pub fn untrack(&mut self, client_order_id: &str) -> Option<Order> {
        for list in [&mut self.buys, &mut self.sells] {
            if let Some(idx) = list.iter().position(|o| o.client_order_id == client_order_id) {
                return Some(list.remove(idx));
            }
        }
        None
    }

    pub fn set_status(&mut self, client_order_id: &str, status: OrderStatus) {
        for list in [&mut self.buys, &mut self.sells] {
            if let Some(o) = list.iter_mut().find(|o| o.client_order_id == client_order_id) {
                o.status = status;
                return;
            }
        }
    }

    /// Buys ascending by price, sells descending.
    pub fn sort_for_display(&mut self) {
        let by_price = |a: &Order, b: &Order| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal);
        self.buys.sort_by(by_price);
        self.sells.sort_by(|a, b| by_price(b, a));
    }

    /// The order cap enforcement cancels: the first one after sorting.
    pub fn cap_candidate(&self, side: Side) -> Option<&Order> {
        self.side(side).first()
    }

    /// Buys then sells, in their current order.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.buys.iter().chain(self.sells.iter())
    }

    pub fn clear(&mut self) {
        self.buys.clear();
        self.sells.clear();
    }
}
