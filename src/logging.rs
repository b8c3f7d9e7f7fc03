//! Structured JSON-lines logging.
//!
//! Every record carries a run id, a sequence number, a level and a domain,
//! and goes both to stdout and to `LOG_DIR/<run_id>/events.jsonl`.
//! Credentials and signatures are redacted before anything is written.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Market, // Ticker and average price reads
    Cache,  // Cache hits, misses, bad entries
    Exec,   // Requests, placements, cancels
    Fill,   // Fill audit trail
    Ledger, // Tracked order set changes
    System, // Startup, cycle summaries, shutdown
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Market => "market",
            Domain::Cache => "cache",
            Domain::Exec => "exec",
            Domain::Fill => "fill",
            Domain::Ledger => "ledger",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);

        let events = match create_dir_all(&run_dir).and_then(|_| File::create(run_dir.join("events.jsonl"))) {
            Ok(file) => Some(Mutex::new(BufWriter::new(file))),
            Err(err) => {
                eprintln!("[log] events log unavailable, stdout only: {}", err);
                None
            }
        };

        RunContext { run_id, events }
    })
}

const REDACTED_KEYS: [&str; 6] = [
    "authorization",
    "X-MBX-APIKEY",
    "api_key",
    "api_secret",
    "secret",
    "signature",
];

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in REDACTED_KEYS {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["client_order_id", "symbol", "side", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < Level::from_env() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain.as_str(), event, fields);
}

fn build_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) -> Value {
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ensure_run_context().run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));
    Value::Object(entry)
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let line = build_record(level, component, event, fields).to_string();
    if let Some(events) = &ensure_run_context().events {
        write_line(events, &line);
    }
    println!("{}", line);
}

// =============================================================================
// Domain helpers
// =============================================================================

pub fn log_order_submit(client_order_id: &str, symbol: &str, side: &str, price: f64, qty: f64) {
    log(
        Level::Info,
        Domain::Exec,
        "order_submit",
        obj(&[
            ("client_order_id", v_str(client_order_id)),
            ("symbol", v_str(symbol)),
            ("side", v_str(side)),
            ("price", v_num(price)),
            ("qty", v_num(qty)),
        ]),
    );
}

pub fn log_fill(client_order_id: &str, symbol: &str, side: &str, price: f64, qty: f64) {
    log(
        Level::Info,
        Domain::Fill,
        "fill",
        obj(&[
            ("client_order_id", v_str(client_order_id)),
            ("symbol", v_str(symbol)),
            ("side", v_str(side)),
            ("price", v_num(price)),
            ("qty", v_num(qty)),
        ]),
    );
}

pub fn log_status(client_order_id: &str, side: &str, status: &str, action: &str) {
    log(
        Level::Debug,
        Domain::Ledger,
        "order_status",
        obj(&[
            ("client_order_id", v_str(client_order_id)),
            ("side", v_str(side)),
            ("status", v_str(status)),
            ("action", v_str(action)),
        ]),
    );
}

pub fn log_cycle(bid: f64, ask: f64, avg: f64, buys: usize, sells: usize, placed: usize, removed: usize) {
    log(
        Level::Info,
        Domain::System,
        "cycle",
        obj(&[
            ("bid", v_num(bid)),
            ("ask", v_num(ask)),
            ("avg", v_num(avg)),
            ("buys", json!(buys)),
            ("sells", json!(sells)),
            ("placed", json!(placed)),
            ("removed", json!(removed)),
        ]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}
