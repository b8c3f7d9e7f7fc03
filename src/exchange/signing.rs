use std::collections::BTreeMap;
use std::fmt;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request parameters. Keys iterate in sorted order, which is the canonical
/// order the exchange recomputes when it checks the signature.
pub type Params = BTreeMap<String, String>;

/// API secret. Never printed, never serialized.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Join parameters as `key=value` pairs with `&`, in key order.
pub fn build_query(params: &Params) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Sign a query string with HMAC-SHA256 (Binance style).
/// Returns hex-encoded signature.
pub fn sign_query(query: &str, secret: &Secret) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.expose().as_bytes())
        .map_err(|e| format!("HMAC error: {}", e))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Canonical query with the `signature` parameter appended last.
pub fn signed_query(params: &Params, secret: &Secret) -> Result<String, String> {
    let query = build_query(params);
    let signature = sign_query(&query, secret)?;
    if query.is_empty() {
        Ok(format!("signature={}", signature))
    } else {
        Ok(format!("{}&signature={}", query, signature))
    }
}
