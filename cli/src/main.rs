//! Binary entry point (§6 "CLI surface"): one positional argument,
//! `backtest` (default) or `live`. Anything else prints usage and exits 0;
//! an uncaught startup error exits non-zero.
//!
//! Both modes load the same `config.properties` ([`talus_integration::settings::Settings`])
//! and run the same [`talus_strategies::Donchian48`] reference strategy —
//! `backtest` replays it through [`talus_backtest::BacktestEngine`] against a
//! CSV file or REST history, `live` wires it into a running
//! [`talus_core::engine::TradingEngine`] against the configured exchange.

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use rust_decimal_macros::dec;
use tracing::{error, info};

use talus_backtest::BacktestEngine;
use talus_core::engine::TradingEngine;
use talus_core::logging::init_logging;
use talus_data::source::MarketFeed;
use talus_data::{BinanceFeed, OkxFeed};
use talus_execution::client::binance::BinanceClient;
use talus_execution::client::okx::OkxClient;
use talus_execution::client::ExchangeClient;
use talus_integration::settings::{ConfigError, Settings};
use talus_markets::{ExchangeId, InstrumentSpec, Symbol};
use talus_strategies::{Donchian48, Donchian48Config};

const CONFIG_PATH: &str = "config.properties";
const DATA_ROOT: &str = "data";
const BACKTEST_TRADES_CSV: &str = "logs/backtest-trades.csv";
const STRATEGY_ID: &str = "donchian-48";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] talus_core::error::CoreError),
    #[error(transparent)]
    Backtest(#[from] talus_backtest::BacktestError),
    #[error(transparent)]
    Execution(#[from] talus_execution::ExecutionError),
    #[error("exchange {0} has no configured client/feed pair")]
    UnsupportedExchange(ExchangeId),
}

enum Mode {
    Backtest,
    Live,
}

fn print_usage() {
    println!("usage: talus [backtest|live]");
    println!();
    println!("  backtest   replay bar history through BacktestEngine (default)");
    println!("  live       run TradingEngine against the configured exchange");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let mode = match std::env::args().nth(1).as_deref() {
        None | Some("backtest") => Mode::Backtest,
        Some("live") => Mode::Live,
        Some(_) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    match run(mode).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(mode: Mode) -> Result<(), CliError> {
    let settings = Settings::load(CONFIG_PATH)?;

    match mode {
        Mode::Backtest => run_backtest(settings).await,
        Mode::Live => run_live(settings).await,
    }
}

/// There is no exchange-info endpoint in scope here (§9 names none): both
/// venues' real `LOT_SIZE`/`tickSz` filters are fetched per-symbol at
/// runtime in the original systems this rewrite targets, which is out of
/// this spec's surface. Conservative, symbol-agnostic USDT-perp defaults
/// stand in; a deployment with tighter venue limits should fail closed at
/// `RiskGate` (rejecting below-minimum orders) rather than silently
/// accepting an oversized one.
fn default_instrument_spec(symbol: &Symbol) -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol.clone(),
        qty_step: dec!(0.001),
        min_qty: dec!(0.001),
        min_notional: dec!(5),
        price_tick: dec!(0.1),
    }
}

fn build_client_and_feed(
    settings: &Settings,
    instrument: InstrumentSpec,
) -> Result<(Arc<dyn ExchangeClient>, Arc<dyn MarketFeed>), CliError> {
    match settings.live.exchange {
        ExchangeId::Binance => {
            let client = BinanceClient::new(&settings.binance)?;
            client.register_instrument(instrument);
            let feed = BinanceFeed::new(&settings.binance);
            Ok((Arc::new(client), Arc::new(feed)))
        }
        ExchangeId::Okx => {
            let client = OkxClient::new(&settings.okx)?;
            client.register_instrument(instrument);
            let feed = OkxFeed::new(&settings.okx);
            Ok((Arc::new(client), Arc::new(feed)))
        }
        other => Err(CliError::UnsupportedExchange(other)),
    }
}

fn build_feed_only(settings: &Settings) -> Result<Arc<dyn MarketFeed>, CliError> {
    match settings.live.exchange {
        ExchangeId::Binance => Ok(Arc::new(BinanceFeed::new(&settings.binance))),
        ExchangeId::Okx => Ok(Arc::new(OkxFeed::new(&settings.okx))),
        other => Err(CliError::UnsupportedExchange(other)),
    }
}

/// Cooldown is not one of Donchian-48's tunables (§4.2's reference
/// parameters cover only the channel/ATR/sizing inputs); gating re-entry to
/// one channel-length of bars avoids immediately re-entering the same
/// breakout that just stopped out.
fn cooldown_bars_for(config: &Donchian48Config) -> u32 {
    config.channel_period as u32
}

async fn run_live(settings: Settings) -> Result<(), CliError> {
    let instrument = default_instrument_spec(&settings.live.symbol);
    let (client, feed) = build_client_and_feed(&settings, instrument.clone())?;

    let mut instruments = HashMap::new();
    instruments.insert(settings.live.symbol.clone(), instrument);

    let engine = TradingEngine::new(
        settings.live.exchange,
        settings.live.leverage,
        &settings.risk,
        &settings.health,
        instruments,
        client,
        feed,
        settings.live.orphan_position_adopt,
        settings.live.orphan_position_stop_loss_percent,
        DATA_ROOT,
    )?;
    let engine = Arc::new(engine);

    engine.recover().await?;

    let config = Donchian48Config::default();
    let cooldown_bars = cooldown_bars_for(&config);
    let strategy = Donchian48::new(STRATEGY_ID, settings.live.symbol.clone(), settings.live.interval, config);
    engine.register_strategy(Box::new(strategy), cooldown_bars, settings.live.history_count).await?;

    engine.start(settings.live.symbol.clone(), settings.live.interval);
    engine.start_sync_loop();
    info!(exchange = %settings.live.exchange, symbol = %settings.live.symbol, "trading engine running, press Ctrl+C to stop");

    let _ = tokio::signal::ctrl_c().await;
    engine.stop().await;
    Ok(())
}

async fn run_backtest(settings: Settings) -> Result<(), CliError> {
    let symbol = settings.live.symbol.clone();
    let interval = settings.live.interval;
    let instrument = default_instrument_spec(&symbol);

    let bars = match &settings.backtest.data_file {
        Some(path) => talus_backtest::data::load_bars_csv(path, &symbol, interval)?,
        None => {
            let feed = build_feed_only(&settings)?;
            let end = settings.backtest.end_time.unwrap_or_else(chrono::Utc::now);
            let start = settings.backtest.start_time.unwrap_or_else(|| end - chrono::Duration::days(365));
            talus_backtest::data::fetch_bar_series(&*feed, &symbol, interval, start, end).await?
        }
    };

    if bars.is_empty() {
        return Err(CliError::Backtest(talus_backtest::BacktestError::EmptyBarSeries));
    }
    info!(bar_count = bars.len(), %symbol, "loaded backtest bar series");

    let mut strategy = Donchian48::new(STRATEGY_ID, symbol, interval, Donchian48Config::default());
    let engine = BacktestEngine::new(settings.backtest.clone(), instrument);
    let (report, trades) = engine.run(&mut strategy, &bars);

    talus_backtest::trade_log::write_trades_csv(BACKTEST_TRADES_CSV, &trades)?;
    info!(
        total_return_pct = %report.total_return_pct,
        max_drawdown_pct = %report.max_drawdown_pct,
        win_rate = %report.win_rate,
        trades = trades.len(),
        "backtest complete, trade log written to {}",
        BACKTEST_TRADES_CSV
    );
    Ok(())
}
