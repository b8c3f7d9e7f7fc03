//! One reconciliation cycle over the order ledger.
//!
//! Refresh market data, check every tracked order against the exchange,
//! drop finished orders, refill empty sides and trim over-full ones. Nothing
//! in a cycle returns an error: a failed step is logged and the cycle moves
//! on, so the ledger is retried next time round.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::StateCache;
use crate::config::GridConfig;
use crate::exchange::{BinanceSpot, GatewayError, OrderRequest, OrderSnapshot, Side};
use crate::grid::{GridPolicy, Quote};
use crate::logging::{
    log, log_cycle, log_fill, log_order_submit, log_status, obj, v_num, v_str, Domain, Level,
};
use crate::orders::{action_for, is_expected_transition, Order, OrderLedger, OrderStatus, StatusAction};
use crate::resolver::MarketDataResolver;

/// Fill records kept in memory; older ones live on in the `fill` log.
pub const FILL_HISTORY: usize = 500;

/// Audit entry for an order observed as filled.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRecord {
    pub symbol: String,
    pub side: Side,
    pub client_order_id: String,
    pub price: f64,
    pub quantity: f64,
    pub ts_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub market_available: bool,
    pub checked: usize,
    pub removed: Vec<String>,
    pub placed: Vec<String>,
    pub cancelled: Vec<String>,
    pub fills: usize,
}

pub struct GridEngine {
    cfg: GridConfig,
    policy: GridPolicy,
    api: Arc<BinanceSpot>,
    resolver: MarketDataResolver,
    ledger: OrderLedger,
    fills: Vec<FillRecord>,
    quote: Quote,
    avg_price: f64,
}

impl GridEngine {
    pub fn new(cfg: GridConfig, api: Arc<BinanceSpot>, cache: Box<dyn StateCache>) -> Self {
        Self {
            policy: GridPolicy::from_config(&cfg),
            resolver: MarketDataResolver::new(Arc::clone(&api), cache),
            api,
            cfg,
            ledger: OrderLedger::new(),
            fills: Vec::new(),
            quote: Quote::default(),
            avg_price: 0.0,
        }
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut OrderLedger {
        &mut self.ledger
    }

    pub fn fills(&self) -> &[FillRecord] {
        &self.fills
    }

    pub fn quote(&self) -> Quote {
        self.quote
    }

    async fn refresh_market(&mut self) {
        let symbol = self.cfg.symbol.clone();
        self.quote = match self.resolver.get_ticker(&symbol).await {
            Some(t) => Quote {
                bid: t.bid(),
                ask: t.ask(),
            },
            None => Quote::default(),
        };
        self.avg_price = self.resolver.get_avg_price(&symbol).await;
        log(
            Level::Debug,
            Domain::Market,
            "market_refresh",
            obj(&[
                ("symbol", v_str(&symbol)),
                ("bid", v_num(self.quote.bid)),
                ("ask", v_num(self.quote.ask)),
                ("avg", v_num(self.avg_price)),
            ]),
        );
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        self.refresh_market().await;
        report.market_available = self.avg_price > 0.0;

        self.ledger.sort_for_display();

        // Work from a snapshot; removals are applied after the walk.
        let tracked: Vec<Order> = self.ledger.iter().cloned().collect();
        let mut finished: Vec<String> = Vec::new();
        // Sides already attempted this cycle are not refilled until the next.
        let mut attempted: HashSet<Side> = HashSet::new();

        for order in tracked {
            report.checked += 1;
            let Some(snapshot) = self
                .resolver
                .get_order(&order.symbol, &order.client_order_id)
                .await
            else {
                log_status(&order.client_order_id, order.side.as_str(), "UNRESOLVED", "keep");
                continue;
            };

            if !is_expected_transition(&order.status, &snapshot.status) {
                log(
                    Level::Warn,
                    Domain::Ledger,
                    "unexpected_transition",
                    obj(&[
                        ("client_order_id", v_str(&order.client_order_id)),
                        ("from", v_str(order.status.as_str())),
                        ("to", v_str(snapshot.status.as_str())),
                    ]),
                );
            }

            match action_for(&snapshot.status) {
                StatusAction::Keep => {
                    log_status(&order.client_order_id, order.side.as_str(), snapshot.status.as_str(), "keep");
                    self.ledger.set_status(&order.client_order_id, snapshot.status.clone());
                }
                StatusAction::Untrack => {
                    log_status(&order.client_order_id, order.side.as_str(), snapshot.status.as_str(), "untrack");
                    finished.push(order.client_order_id.clone());
                }
                StatusAction::UntrackAndReplace => {
                    log_status(&order.client_order_id, order.side.as_str(), snapshot.status.as_str(), "replace");
                    finished.push(order.client_order_id.clone());
                    self.record_fill(&order, &snapshot);
                    report.fills += 1;
                    self.place_pair(&mut report, &mut attempted).await;
                }
            }
        }

        for client_order_id in finished {
            if self.ledger.untrack(&client_order_id).is_some() {
                report.removed.push(client_order_id);
            }
        }

        self.ledger.sort_for_display();
        for side in [Side::Buy, Side::Sell] {
            let open = self.ledger.len(side);
            if open == 0 {
                if !attempted.contains(&side) {
                    self.place(side, &mut report, &mut attempted).await;
                }
            } else if open > self.cfg.max_orders {
                self.enforce_cap(side, &mut report).await;
            }
        }

        log_cycle(
            self.quote.bid,
            self.quote.ask,
            self.avg_price,
            self.ledger.len(Side::Buy),
            self.ledger.len(Side::Sell),
            report.placed.len(),
            report.removed.len() + report.cancelled.len(),
        );
        report
    }

    fn record_fill(&mut self, order: &Order, snapshot: &OrderSnapshot) {
        let price = Some(snapshot.price_f64()).filter(|p| *p > 0.0).unwrap_or(order.price);
        let quantity = Some(snapshot.qty_f64()).filter(|q| *q > 0.0).unwrap_or(order.quantity);
        log_fill(&order.client_order_id, &order.symbol, order.side.as_str(), price, quantity);
        if self.fills.len() >= FILL_HISTORY {
            let excess = self.fills.len() + 1 - FILL_HISTORY;
            self.fills.drain(..excess);
        }
        self.fills.push(FillRecord {
            symbol: order.symbol.clone(),
            side: order.side,
            client_order_id: order.client_order_id.clone(),
            price,
            quantity,
            ts_ms: chrono::Utc::now().timestamp_millis() as u64,
        });
    }

    /// Re-center after a fill: one sell and one buy at the average price.
    async fn place_pair(&mut self, report: &mut CycleReport, attempted: &mut HashSet<Side>) {
        self.place(Side::Sell, report, attempted).await;
        self.place(Side::Buy, report, attempted).await;
    }

    /// Place one limit order on `side`. A failure is logged and leaves the
    /// ledger untouched; the empty-side check tries again next cycle.
    async fn place(
        &mut self,
        side: Side,
        report: &mut CycleReport,
        attempted: &mut HashSet<Side>,
    ) -> Option<String> {
        if !(self.avg_price > 0.0) {
            log(
                Level::Warn,
                Domain::Exec,
                "placement_skipped",
                obj(&[
                    ("side", v_str(side.as_str())),
                    ("msg", v_str("no average price")),
                ]),
            );
            return None;
        }

        let price = self.policy.price(self.avg_price, side, &self.quote);
        let quantity = self.policy.size();
        if !(price > 0.0 && quantity > 0.0) {
            log(
                Level::Warn,
                Domain::Exec,
                "placement_skipped",
                obj(&[
                    ("side", v_str(side.as_str())),
                    ("price", v_num(price)),
                    ("qty", v_num(quantity)),
                ]),
            );
            return None;
        }

        attempted.insert(side);
        let client_order_id = self.api.next_client_order_id();
        let req = OrderRequest::limit(&self.cfg.symbol, side, quantity, price)
            .with_client_order_id(client_order_id.clone());
        log_order_submit(&client_order_id, &self.cfg.symbol, side.as_str(), price, quantity);

        match self.api.place_order(&req).await {
            Ok(ack) => {
                let order = Order::from_placement(&self.cfg.symbol, side, price, quantity, &ack);
                let id = order.client_order_id.clone();
                self.ledger.track(order);
                report.placed.push(id.clone());
                Some(id)
            }
            Err(err) => {
                log_exec_failure("placement_failed", side, &client_order_id, &err);
                None
            }
        }
    }

    /// Cancel the first order on an over-full side. It leaves the ledger
    /// only once the exchange confirms.
    async fn enforce_cap(&mut self, side: Side, report: &mut CycleReport) {
        let Some(target) = self.ledger.cap_candidate(side).cloned() else {
            return;
        };
        match self
            .api
            .cancel_order(&target.symbol, &target.client_order_id)
            .await
        {
            Ok(_) => {
                self.ledger.untrack(&target.client_order_id);
                report.cancelled.push(target.client_order_id);
            }
            Err(err) => log_exec_failure("cancel_failed", side, &target.client_order_id, &err),
        }
    }

    /// Cancel every open order for the symbol and forget the local ledger.
    pub async fn cancel_all_open(&mut self) -> Result<usize, GatewayError> {
        let acks = self.api.cancel_open_orders(&self.cfg.symbol).await?;
        self.ledger.clear();
        log(
            Level::Info,
            Domain::Exec,
            "cancel_all_open",
            obj(&[
                ("symbol", v_str(&self.cfg.symbol)),
                ("count", v_num(acks.len() as f64)),
            ]),
        );
        Ok(acks.len())
    }

    /// Status the engine last recorded for a tracked order.
    pub fn tracked_status(&self, client_order_id: &str) -> Option<&OrderStatus> {
        self.ledger.get(client_order_id).map(|o| &o.status)
    }
}

fn log_exec_failure(event: &str, side: Side, client_order_id: &str, err: &GatewayError) {
    log(
        Level::Warn,
        Domain::Exec,
        event,
        obj(&[
            ("client_order_id", v_str(client_order_id)),
            ("side", v_str(side.as_str())),
            ("unknown_outcome", serde_json::Value::Bool(err.is_unknown_outcome())),
            ("error", v_str(&err.to_string())),
        ]),
    );
}
