use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::client_id::ClientOrderIdGenerator;
use super::retry::{send_with_retry, RetryPolicy};
use super::signing::{build_query, signed_query, Params, Secret};
use super::transport::{HttpRequest, Method, Transport};
use super::{fmt_decimal, BookTicker, GatewayError, OrderSnapshot, OrderType, Side, TimeInForce};
use crate::config::GridConfig;
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::orders::OrderStatus;

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Signed REST client for the spot API.
///
/// Owns the transport, credentials, retry policy and the client order id
/// counter. Calls never touch local order state.
pub struct BinanceSpot {
    transport: Arc<dyn Transport>,
    host: String,
    api_key: Option<String>,
    secret: Option<Secret>,
    recv_window: u64,
    retry: RetryPolicy,
    cancel_attempts: u32,
    ids: ClientOrderIdGenerator,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: f64,
    pub client_order_id: Option<String>,
    pub time_in_force: TimeInForce,
    pub stop_price: f64,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price,
            client_order_id: None,
            time_in_force: TimeInForce::Gtc,
            stop_price: 0.0,
        }
    }

    pub fn with_client_order_id(mut self, id: String) -> Self {
        self.client_order_id = Some(id);
        self
    }

    fn to_params(&self, client_order_id: &str) -> Result<Params, GatewayError> {
        let mut params = Params::new();
        params.insert("symbol".into(), self.symbol.clone());
        params.insert("side".into(), self.side.as_str().into());
        params.insert("type".into(), self.order_type.as_str().into());
        params.insert("quantity".into(), fmt_decimal(self.quantity));
        params.insert("newClientOrderId".into(), client_order_id.to_string());

        match self.order_type {
            OrderType::Limit => {
                params.insert("price".into(), fmt_decimal(self.price));
                params.insert("timeInForce".into(), self.time_in_force.as_str().into());
            }
            OrderType::Market => {}
            OrderType::Stop => {
                if !(self.stop_price > 0.0) {
                    return Err(GatewayError::InvalidConfiguration(format!(
                        "stopPrice must be greater than 0, got {}",
                        self.stop_price
                    )));
                }
                params.insert("price".into(), fmt_decimal(self.price));
                params.insert("stopPrice".into(), fmt_decimal(self.stop_price));
            }
        }
        Ok(params)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct PlaceResponse {
    symbol: Option<String>,
    client_order_id: Option<String>,
    price: Option<String>,
    orig_qty: Option<String>,
    status: Option<OrderStatus>,
}

#[derive(Deserialize, Debug)]
struct AvgPrice {
    price: String,
}

/// Acknowledgement of a single cancel.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CancelAck {
    pub symbol: Option<String>,
    pub orig_client_order_id: Option<String>,
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Balance {
    pub asset: String,
    pub free: String,
    pub locked: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountInfo {
    pub can_trade: bool,
    pub balances: Vec<Balance>,
}

impl BinanceSpot {
    pub fn new(cfg: &GridConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            host: cfg.host.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            secret: cfg.api_secret.clone(),
            recv_window: cfg.recv_window,
            retry: cfg.retry_policy(),
            cancel_attempts: cfg.cancel_attempts,
            ids: ClientOrderIdGenerator::new(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn next_client_order_id(&self) -> String {
        self.ids.next()
    }

    fn timestamp_ms() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        mut params: Params,
        signed: bool,
    ) -> Result<HttpRequest, GatewayError> {
        let query = if signed {
            let secret = self
                .secret
                .as_ref()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| GatewayError::InvalidConfiguration("missing API secret".into()))?;
            params
                .entry("timestamp".into())
                .or_insert_with(|| Self::timestamp_ms().to_string());
            params
                .entry("recvWindow".into())
                .or_insert_with(|| self.recv_window.to_string());
            signed_query(&params, secret).map_err(GatewayError::InvalidConfiguration)?
        } else {
            build_query(&params)
        };

        let mut url = format!("{}{}", self.host, path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let headers = self
            .api_key
            .iter()
            .map(|k| (API_KEY_HEADER.to_string(), k.clone()))
            .collect();

        Ok(HttpRequest {
            method,
            url,
            headers,
            timeout: self.retry.attempt_timeout,
        })
    }

    async fn request_with(
        &self,
        policy: &RetryPolicy,
        method: Method,
        path: &str,
        params: Params,
        signed: bool,
    ) -> Result<Value, GatewayError> {
        let req = self.build_request(method, path, params, signed)?;
        log(
            Level::Debug,
            Domain::Exec,
            "http_request",
            obj(&[("method", v_str(method.as_str())), ("path", v_str(path))]),
        );
        let resp = send_with_retry(self.transport.as_ref(), &req, policy, path).await?;
        serde_json::from_str(&resp.body)
            .map_err(|e| GatewayError::Malformed(format!("{} {}: {}", method.as_str(), path, e)))
    }

    /// Issue one request under the client's retry policy and return the JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: Params,
        signed: bool,
    ) -> Result<Value, GatewayError> {
        self.request_with(&self.retry, method, path, params, signed).await
    }

    async fn request_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: Params,
        signed: bool,
    ) -> Result<T, GatewayError> {
        let value = self.request(method, path, params, signed).await?;
        decode(value, path)
    }

    pub async fn get_ticker_from_api(&self, symbol: &str) -> Result<BookTicker, GatewayError> {
        let params = symbol_params(symbol);
        self.request_as(Method::Get, "/api/v3/ticker/bookTicker", params, false)
            .await
    }

    /// Current average price; the anchor every grid order is priced from.
    pub async fn get_avg_price(&self, symbol: &str) -> Result<f64, GatewayError> {
        let avg: AvgPrice = self
            .request_as(Method::Get, "/api/v3/avgPrice", symbol_params(symbol), false)
            .await?;
        avg.price
            .parse()
            .map_err(|_| GatewayError::Malformed(format!("avgPrice not a number: {}", avg.price)))
    }

    /// Place an order. The client order id is minted here when the request
    /// carries none, before anything goes on the wire, and every retry
    /// reuses it.
    pub async fn place_order(&self, req: &OrderRequest) -> Result<OrderSnapshot, GatewayError> {
        let client_order_id = req
            .client_order_id
            .clone()
            .unwrap_or_else(|| self.next_client_order_id());
        let params = req.to_params(&client_order_id)?;

        let resp: PlaceResponse = self
            .request_as(Method::Post, "/api/v3/order", params, true)
            .await?;

        Ok(OrderSnapshot {
            symbol: Some(resp.symbol.unwrap_or_else(|| req.symbol.clone())),
            side: Some(req.side),
            client_order_id: resp.client_order_id.unwrap_or(client_order_id),
            price: resp.price.unwrap_or_else(|| fmt_decimal(req.price)),
            orig_qty: resp.orig_qty.unwrap_or_else(|| fmt_decimal(req.quantity)),
            status: resp.status.unwrap_or(OrderStatus::New),
        })
    }

    pub async fn get_order_from_api(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<OrderSnapshot, GatewayError> {
        let mut params = symbol_params(symbol);
        params.insert("origClientOrderId".into(), client_order_id.to_string());
        self.request_as(Method::Get, "/api/v3/order", params, true).await
    }

    pub async fn cancel_order(
        &self,
        symbol: &str,
        client_order_id: &str,
    ) -> Result<CancelAck, GatewayError> {
        let mut params = symbol_params(symbol);
        params.insert("origClientOrderId".into(), client_order_id.to_string());
        let policy = self.retry.with_attempts(self.cancel_attempts);
        let value = self
            .request_with(&policy, Method::Delete, "/api/v3/order", params, true)
            .await?;
        decode(value, "/api/v3/order")
    }

    pub async fn get_open_orders(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<OrderSnapshot>, GatewayError> {
        let params = symbol.map(symbol_params).unwrap_or_default();
        self.request_as(Method::Get, "/api/v3/openOrders", params, true)
            .await
    }

    pub async fn cancel_open_orders(&self, symbol: &str) -> Result<Vec<CancelAck>, GatewayError> {
        self.request_as(Method::Delete, "/api/v3/openOrders", symbol_params(symbol), true)
            .await
    }

    pub async fn get_account_info(&self) -> Result<AccountInfo, GatewayError> {
        self.request_as(Method::Get, "/api/v3/account", Params::new(), true)
            .await
    }
}

fn symbol_params(symbol: &str) -> Params {
    let mut params = Params::new();
    params.insert("symbol".into(), symbol.to_string());
    params
}

fn decode<T: DeserializeOwned>(value: Value, path: &str) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::Malformed(format!("{}: {}", path, e)))
}
