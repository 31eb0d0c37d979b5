//! Parses the flat `config.properties` key–value file into an immutable
//! [`Settings`] value, constructed once at startup and passed by reference to
//! every component from then on (Design Note: "Rearchitect [the global
//! singleton config] as an immutable settings value constructed once at
//! startup and passed explicitly to every component. Test doubles then need
//! no file I/O.").
//!
//! [`Settings::parse`] never touches the filesystem; [`Settings::load`] reads
//! the file and delegates to it. Every recognized key has the default this
//! module's doc comments and the external-interfaces table both describe;
//! unrecognized keys are ignored (forward compatible with venue-specific
//! extensions that individual deployments may add).

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::signing::Secret;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required key '{0}'")]
    MissingKey(String),
    #[error("key '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("key '{key}' value {value} is outside the allowed range [{min}, {max}]")]
    OutOfRange {
        key: String,
        value: Decimal,
        min: Decimal,
        max: Decimal,
    },
}

/// A flat `key=value` property map, parsed once.
#[derive(Debug, Default, Clone)]
struct Properties(HashMap<String, String>);

impl Properties {
    fn parse(raw: &str) -> Self {
        let mut map = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Properties(map)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|err| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Backtest,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginType {
    Isolated,
    Crossed,
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub exchange: talus_markets::ExchangeId,
    pub symbol: talus_markets::Symbol,
    pub interval: talus_markets::Interval,
    pub history_count: u32,
    pub leverage: u32,
    pub margin_type: MarginType,
    pub allow_existing_position: bool,
    pub orphan_position_adopt: bool,
    pub orphan_position_stop_loss_percent: Decimal,
}

#[derive(Debug, Clone)]
pub struct RiskSettings {
    pub per_trade: Decimal,
    pub max_drawdown: Decimal,
    pub max_consecutive_losses: u32,
    pub max_position_ratio: Decimal,
    pub max_stop_loss_percent: Decimal,
    pub max_positions_per_symbol: u32,
    pub margin_buffer: Decimal,
}

#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub enabled: bool,
    pub min_sample: u32,
    pub max_consecutive_losses: u32,
    pub min_ev_negative_trades: u32,
    pub ev_min: Decimal,
}

#[derive(Debug, Clone)]
pub struct BacktestSettings {
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub initial_capital: Decimal,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub slippage: Decimal,
    pub spread: Decimal,
    pub leverage: u32,
    pub limit_order_max_bars: u32,
    pub data_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BinanceSettings {
    pub api_key: Option<String>,
    pub api_secret: Option<Secret>,
    pub testnet_enabled: bool,
    pub testnet_rest_base_url: Option<String>,
    pub testnet_ws_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OkxSettings {
    pub api_key: Option<String>,
    pub api_secret: Option<Secret>,
    pub passphrase: Option<Secret>,
    pub demo_trading_enabled: bool,
    pub demo_rest_url: Option<String>,
    pub demo_ws_public_url: Option<String>,
    pub demo_ws_business_url: Option<String>,
    pub td_mode: String,
    pub min_notional: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// The fully-resolved, immutable configuration every component is
/// constructed from. Nothing downstream re-reads the properties file or a
/// global; everything is a plain value reachable from here.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: AppMode,
    pub live: LiveSettings,
    pub risk: RiskSettings,
    pub health: HealthSettings,
    pub backtest: BacktestSettings,
    pub binance: BinanceSettings,
    pub okx: OkxSettings,
    pub proxy: ProxySettings,
}

impl Settings {
    /// Read and parse `path` as a `config.properties` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse an in-memory `config.properties` payload. No file I/O — used
    /// directly by tests to build a `Settings` without touching disk.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let props = Properties::parse(raw);

        let mode = match props.get_or("app.mode", "backtest").as_str() {
            "backtest" => AppMode::Backtest,
            "live" => AppMode::Live,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "app.mode".into(),
                    value: other.into(),
                    reason: "expected 'backtest' or 'live'".into(),
                })
            }
        };

        let live = parse_live(&props)?;
        let risk = parse_risk(&props)?;
        let health = parse_health(&props)?;
        let backtest = parse_backtest(&props)?;
        let binance = parse_binance(&props);
        let okx = parse_okx(&props)?;
        let proxy = ProxySettings {
            host: props.get("proxy.host").map(str::to_string),
            port: match props.get("proxy.port") {
                None => None,
                Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "proxy.port".into(),
                    value: raw.into(),
                    reason: "expected a port number".into(),
                })?),
            },
        };

        Ok(Settings {
            mode,
            live,
            risk,
            health,
            backtest,
            binance,
            okx,
            proxy,
        })
    }
}

fn bounded(
    key: &str,
    value: Decimal,
    min: Decimal,
    max: Decimal,
) -> Result<Decimal, ConfigError> {
    if value < min || value > max {
        Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            min,
            max,
        })
    } else {
        Ok(value)
    }
}

fn parse_live(props: &Properties) -> Result<LiveSettings, ConfigError> {
    let exchange_raw = props.get_or("live.exchange", "binance");
    let exchange = exchange_raw
        .parse::<talus_markets::ExchangeId>()
        .map_err(|err| ConfigError::InvalidValue {
            key: "live.exchange".into(),
            value: exchange_raw.clone(),
            reason: err.to_string(),
        })?;

    let symbol_raw = props.get_or("live.symbol", "BTC-USDT");
    let symbol =
        talus_markets::Symbol::parse(&symbol_raw).map_err(|err| ConfigError::InvalidValue {
            key: "live.symbol".into(),
            value: symbol_raw.clone(),
            reason: err.to_string(),
        })?;

    let interval_raw = props.get_or("live.interval", "15m");
    let interval =
        interval_raw
            .parse::<talus_markets::Interval>()
            .map_err(|err| ConfigError::InvalidValue {
                key: "live.interval".into(),
                value: interval_raw.clone(),
                reason: err.to_string(),
            })?;

    let history_count: u32 = props.parse_or("live.history.count", 200)?;
    if history_count < 120 {
        return Err(ConfigError::InvalidValue {
            key: "live.history.count".into(),
            value: history_count.to_string(),
            reason: "must be at least 120 bars of warm-up".into(),
        });
    }

    let margin_type_raw = props.get_or("live.margin.type", "ISOLATED");
    let margin_type = match margin_type_raw.to_uppercase().as_str() {
        "ISOLATED" => MarginType::Isolated,
        "CROSSED" => MarginType::Crossed,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "live.margin.type".into(),
                value: other.into(),
                reason: "expected 'ISOLATED' or 'CROSSED'".into(),
            })
        }
    };

    let orphan_stop_pct: Decimal =
        props.parse_or("live.orphan.position.stop.loss.percent", Decimal::new(2, 2))?;
    let orphan_stop_pct = bounded(
        "live.orphan.position.stop.loss.percent",
        orphan_stop_pct,
        Decimal::new(1, 4),
        Decimal::new(5, 1),
    )?;

    Ok(LiveSettings {
        exchange,
        symbol,
        interval,
        history_count,
        leverage: props.parse_or("live.leverage", 1)?,
        margin_type,
        allow_existing_position: props.parse_or("live.start.allow.existing.position", true)?,
        orphan_position_adopt: props.parse_or("live.orphan.position.adopt", true)?,
        orphan_position_stop_loss_percent: orphan_stop_pct,
    })
}

fn parse_risk(props: &Properties) -> Result<RiskSettings, ConfigError> {
    let per_trade: Decimal = props.parse_or("risk.per.trade", Decimal::new(1, 2))?;
    let per_trade = bounded(
        "risk.per.trade",
        per_trade,
        Decimal::new(5, 3),
        Decimal::new(2, 2),
    )?;

    Ok(RiskSettings {
        per_trade,
        max_drawdown: props.parse_or("risk.max.drawdown", Decimal::new(30, 2))?,
        max_consecutive_losses: props.parse_or("risk.max.consecutive.losses", 3)?,
        max_position_ratio: props.parse_or("risk.max.position.ratio", Decimal::ONE)?,
        max_stop_loss_percent: props.parse_or("risk.max.stop.loss.percent", Decimal::from(50))?,
        max_positions_per_symbol: props.parse_or("risk.max.positions.per.symbol", 1)?,
        margin_buffer: props.parse_or("risk.margin.buffer", Decimal::new(12, 1))?,
    })
}

fn parse_health(props: &Properties) -> Result<HealthSettings, ConfigError> {
    Ok(HealthSettings {
        enabled: props.parse_or("monitor.health.enabled", false)?,
        min_sample: props.parse_or("monitor.health.min.sample", 30)?,
        max_consecutive_losses: props.parse_or("monitor.health.max.consecutive.losses", 7)?,
        min_ev_negative_trades: props.parse_or("monitor.health.min.ev.negative.trades", 30)?,
        ev_min: props.parse_or("monitor.ev.min", Decimal::ZERO)?,
    })
}

fn parse_backtest(props: &Properties) -> Result<BacktestSettings, ConfigError> {
    let parse_instant = |key: &str| -> Result<Option<chrono::DateTime<chrono::Utc>>, ConfigError> {
        match props.get(key) {
            None => Ok(None),
            Some(raw) => chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| Some(dt.with_timezone(&chrono::Utc)))
                .map_err(|err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: err.to_string(),
                }),
        }
    };

    Ok(BacktestSettings {
        start_time: parse_instant("backtest.start.time")?,
        end_time: parse_instant("backtest.end.time")?,
        initial_capital: props.parse_or("backtest.initial.capital", Decimal::from(10_000))?,
        maker_fee: props.parse_or("backtest.maker.fee", Decimal::new(2, 4))?,
        taker_fee: props.parse_or("backtest.taker.fee", Decimal::new(4, 4))?,
        slippage: props.parse_or("backtest.slippage", Decimal::new(5, 4))?,
        spread: props.parse_or("backtest.spread", Decimal::new(2, 4))?,
        leverage: props.parse_or("backtest.leverage", 1)?,
        limit_order_max_bars: props.parse_or("backtest.limit.order.max.bars", 3)?,
        data_file: props.get("backtest.data.file").map(str::to_string),
    })
}

fn parse_binance(props: &Properties) -> BinanceSettings {
    BinanceSettings {
        api_key: props.get("binance.api.key").map(str::to_string),
        api_secret: props.get("binance.api.secret").map(Secret::new),
        testnet_enabled: props
            .parse_or("binance.testnet.enabled", false)
            .unwrap_or(false),
        testnet_rest_base_url: props.get("binance.testnet.rest.base.url").map(str::to_string),
        testnet_ws_base_url: props.get("binance.testnet.ws.base.url").map(str::to_string),
    }
}

fn parse_okx(props: &Properties) -> Result<OkxSettings, ConfigError> {
    Ok(OkxSettings {
        api_key: props.get("okx.api.key").map(str::to_string),
        api_secret: props.get("okx.api.secret").map(Secret::new),
        passphrase: props.get("okx.api.passphrase").map(Secret::new),
        demo_trading_enabled: props.parse_or("okx.demo.trading.enabled", false)?,
        demo_rest_url: props.get("okx.demo.rest.url").map(str::to_string),
        demo_ws_public_url: props.get("okx.demo.ws.public.url").map(str::to_string),
        demo_ws_business_url: props.get("okx.demo.ws.business.url").map(str::to_string),
        td_mode: props.get_or("okx.td.mode", "cross"),
        min_notional: props.parse_or("okx.min.notional", Decimal::from(5))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_file_is_empty() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings.mode, AppMode::Backtest);
        assert_eq!(settings.live.interval, talus_markets::Interval::M15);
        assert_eq!(settings.live.history_count, 200);
        assert_eq!(settings.risk.per_trade, Decimal::new(1, 2));
    }

    #[test]
    fn parses_recognized_keys() {
        let raw = "app.mode=live\nlive.exchange=okx\nlive.symbol=ETH-USDT\nrisk.per.trade=0.02\n";
        let settings = Settings::parse(raw).unwrap();
        assert_eq!(settings.mode, AppMode::Live);
        assert_eq!(settings.live.exchange, talus_markets::ExchangeId::Okx);
        assert_eq!(settings.live.symbol.base, "ETH");
        assert_eq!(settings.risk.per_trade, Decimal::new(2, 2));
    }

    #[test]
    fn rejects_risk_per_trade_outside_hard_bounds() {
        let raw = "risk.per.trade=0.1\n";
        assert!(matches!(
            Settings::parse(raw),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_history_count_below_minimum_warmup() {
        let raw = "live.history.count=50\n";
        assert!(Settings::parse(raw).is_err());
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let raw = "# a comment\n\napp.mode=live\n! another comment\n";
        let settings = Settings::parse(raw).unwrap();
        assert_eq!(settings.mode, AppMode::Live);
    }

    #[test]
    fn secrets_are_never_exposed_via_debug() {
        let raw = "binance.api.secret=super-secret\n";
        let settings = Settings::parse(raw).unwrap();
        let rendered = format!("{:?}", settings.binance.api_secret);
        assert!(!rendered.contains("super-secret"));
    }
}
