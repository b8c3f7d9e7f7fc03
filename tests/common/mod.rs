//! In-process stand-in for the spot REST API.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gridtrader::cache::StateCache;
use gridtrader::exchange::retry::RetryPolicy;
use gridtrader::exchange::signing::Secret;
use gridtrader::exchange::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};
use gridtrader::exchange::{BinanceSpot, Side};
use gridtrader::orders::{Order, OrderStatus};
use gridtrader::{GridConfig, GridEngine};

#[derive(Debug, Clone)]
pub struct FakeOrder {
    pub side: String,
    pub price: String,
    pub qty: String,
    pub status: String,
}

#[derive(Default)]
struct State {
    ticker: Option<(String, String)>,
    avg_price: Option<String>,
    orders: HashMap<String, FakeOrder>,
    raw_order_bodies: HashMap<String, String>,
    place_error: Option<TransportError>,
    place_rejection: Option<String>,
    cancel_rejection: Option<String>,
    requests: Vec<HttpRequest>,
}

#[derive(Default)]
pub struct FakeExchange {
    state: Mutex<State>,
}

pub fn query_map(req: &HttpRequest) -> HashMap<String, String> {
    req.query()
        .unwrap_or("")
        .split('&')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn ok(body: String) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse { status: 200, body })
}

fn status(code: u16, body: &str) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse {
        status: code,
        body: body.to_string(),
    })
}

impl FakeExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_ticker(&self, bid: &str, ask: &str) {
        self.with_state(|s| s.ticker = Some((bid.into(), ask.into())));
    }

    pub fn set_avg_price(&self, price: &str) {
        self.with_state(|s| s.avg_price = Some(price.into()));
    }

    pub fn register(&self, client_order_id: &str, side: Side, price: &str, status: &str) {
        self.with_state(|s| {
            s.orders.insert(
                client_order_id.into(),
                FakeOrder {
                    side: side.as_str().into(),
                    price: price.into(),
                    qty: "0.001".into(),
                    status: status.into(),
                },
            )
        });
    }

    pub fn set_status(&self, client_order_id: &str, status: &str) {
        self.with_state(|s| {
            if let Some(o) = s.orders.get_mut(client_order_id) {
                o.status = status.into();
            }
        });
    }

    pub fn set_raw_order_body(&self, client_order_id: &str, body: &str) {
        self.with_state(|s| {
            s.raw_order_bodies.insert(client_order_id.into(), body.into());
        });
    }

    pub fn fail_placement(&self, err: TransportError) {
        self.with_state(|s| s.place_error = Some(err));
    }

    pub fn reject_placement(&self, body: &str) {
        self.with_state(|s| s.place_rejection = Some(body.into()));
    }

    pub fn reject_cancel(&self, body: &str) {
        self.with_state(|s| s.cancel_rejection = Some(body.into()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.with_state(|s| s.requests.clone())
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path() == path)
            .count()
    }

    /// Query parameters of every placement, in order.
    pub fn placements(&self) -> Vec<HashMap<String, String>> {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Post && r.path() == "/api/v3/order")
            .map(query_map)
            .collect()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == Method::Delete && r.path() == "/api/v3/order")
            .map(|r| query_map(r)["origClientOrderId"].clone())
            .collect()
    }

    fn respond(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let q = query_map(req);
        let mut s = self.state.lock().unwrap();
        s.requests.push(req.clone());

        match (req.method, req.path()) {
            (Method::Get, "/api/v3/ticker/bookTicker") => match &s.ticker {
                Some((bid, ask)) => ok(format!(
                    r#"{{"symbol":"{}","bidPrice":"{}","bidQty":"1","askPrice":"{}","askQty":"1"}}"#,
                    q["symbol"], bid, ask
                )),
                None => status(503, r#"{"code":-1003,"msg":"unavailable"}"#),
            },
            (Method::Get, "/api/v3/avgPrice") => match &s.avg_price {
                Some(p) => ok(format!(r#"{{"mins":5,"price":"{}"}}"#, p)),
                None => status(503, r#"{"code":-1003,"msg":"unavailable"}"#),
            },
            (Method::Post, "/api/v3/order") => {
                if let Some(err) = &s.place_error {
                    return Err(err.clone());
                }
                if let Some(body) = &s.place_rejection {
                    return status(400, body);
                }
                let cid = q["newClientOrderId"].clone();
                let order = FakeOrder {
                    side: q["side"].clone(),
                    price: q["price"].clone(),
                    qty: q["quantity"].clone(),
                    status: "NEW".into(),
                };
                let body = format!(
                    r#"{{"symbol":"{}","orderId":1,"clientOrderId":"{}","price":"{}","origQty":"{}","status":"NEW","side":"{}"}}"#,
                    q["symbol"], cid, order.price, order.qty, order.side
                );
                s.orders.insert(cid, order);
                ok(body)
            }
            (Method::Get, "/api/v3/order") => {
                let cid = q["origClientOrderId"].clone();
                if let Some(body) = s.raw_order_bodies.get(&cid) {
                    return ok(body.clone());
                }
                match s.orders.get(&cid) {
                    Some(o) => ok(format!(
                        r#"{{"symbol":"BTCUSDT","clientOrderId":"{}","price":"{}","origQty":"{}","status":"{}","side":"{}"}}"#,
                        cid, o.price, o.qty, o.status, o.side
                    )),
                    None => status(400, r#"{"code":-2013,"msg":"Order does not exist."}"#),
                }
            }
            (Method::Delete, "/api/v3/order") => {
                if let Some(body) = &s.cancel_rejection {
                    return status(400, body);
                }
                let cid = q["origClientOrderId"].clone();
                match s.orders.get_mut(&cid) {
                    Some(o) => {
                        o.status = "CANCELED".into();
                        ok(format!(
                            r#"{{"symbol":"BTCUSDT","origClientOrderId":"{}","clientOrderId":"cancel-1","status":"CANCELED"}}"#,
                            cid
                        ))
                    }
                    None => status(400, r#"{"code":-2011,"msg":"Unknown order sent."}"#),
                }
            }
            (Method::Delete, "/api/v3/openOrders") => {
                let mut acks = Vec::new();
                for (cid, o) in s.orders.iter_mut().filter(|(_, o)| o.status == "NEW") {
                    o.status = "CANCELED".into();
                    acks.push(format!(
                        r#"{{"symbol":"BTCUSDT","origClientOrderId":"{}","status":"CANCELED"}}"#,
                        cid
                    ));
                }
                ok(format!("[{}]", acks.join(",")))
            }
            _ => status(404, r#"{"code":-1,"msg":"no such endpoint"}"#),
        }
    }
}

#[async_trait]
impl Transport for FakeExchange {
    async fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.respond(req)
    }
}

pub fn test_config() -> GridConfig {
    GridConfig {
        symbol: "BTCUSDT".into(),
        api_key: Some("test-key".into()),
        api_secret: Some(Secret::new("test-secret")),
        gap_percent: 0.01,
        quantity: 0.001,
        min_price: 0.01,
        min_qty: 0.0001,
        max_orders: 3,
        host: "https://fake.exchange".into(),
        http_attempts: 2,
        http_timeout_ms: 200,
        cancel_attempts: 1,
        ..GridConfig::default()
    }
}

pub fn fast_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts: attempts,
        attempt_timeout: Duration::from_millis(200),
        base_delay_ms: 0,
        max_delay_ms: 0,
        jitter_factor: 0.0,
    }
}

pub fn engine_with(cfg: GridConfig, fake: Arc<FakeExchange>, cache: Box<dyn StateCache>) -> GridEngine {
    let api = BinanceSpot::new(&cfg, fake).with_retry(fast_retry(cfg.http_attempts));
    GridEngine::new(cfg, Arc::new(api), cache)
}

pub fn tracked(client_order_id: &str, side: Side, price: f64) -> Order {
    Order {
        symbol: "BTCUSDT".into(),
        side,
        client_order_id: client_order_id.into(),
        price,
        quantity: 0.001,
        status: OrderStatus::New,
    }
}
