use std::sync::Arc;

use anyhow::{Context, Result};
use gridtrader::cache::{NoCache, SqliteCache, StateCache};
use gridtrader::exchange::{BinanceSpot, HttpTransport};
use gridtrader::logging::{log, obj, v_num, v_str, Domain, Level};
use gridtrader::{GridConfig, GridEngine};
use tokio::time::{sleep, Duration};

fn load_config() -> Result<GridConfig> {
    let cfg = match std::env::var("CONFIG_PATH") {
        Ok(path) => GridConfig::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => GridConfig::from_env(),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn open_cache(cfg: &GridConfig) -> Result<Box<dyn StateCache>> {
    let cache: Box<dyn StateCache> = match &cfg.cache_path {
        Some(path) => Box::new(SqliteCache::open(path).with_context(|| format!("opening cache {}", path))?),
        None => Box::new(NoCache),
    };
    Ok(cache)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = load_config()?;
    let cache = open_cache(&cfg)?;
    let api = Arc::new(BinanceSpot::new(&cfg, Arc::new(HttpTransport::new())));

    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("symbol", v_str(&cfg.symbol)),
            ("gap_percent", v_num(cfg.gap_percent)),
            ("quantity", v_num(cfg.quantity)),
            ("max_orders", v_num(cfg.max_orders as f64)),
            ("cache", v_str(cfg.cache_path.as_deref().unwrap_or("none"))),
        ]),
    );

    let cycle_pause = Duration::from_secs(cfg.cycle_secs);
    let error_pause = Duration::from_secs(cfg.error_sleep_secs);
    let mut engine = GridEngine::new(cfg.clone(), api, cache);

    if cfg.cancel_on_start {
        if let Err(err) = engine.cancel_all_open().await {
            log(
                Level::Warn,
                Domain::System,
                "cancel_on_start_failed",
                obj(&[("error", v_str(&err.to_string()))]),
            );
        }
    }

    loop {
        let report = engine.run_cycle().await;
        if report.market_available {
            sleep(cycle_pause).await;
        } else {
            log(
                Level::Warn,
                Domain::System,
                "market_unavailable",
                obj(&[("retry_in_secs", v_num(error_pause.as_secs() as f64))]),
            );
            sleep(error_pause).await;
        }
    }
}
