//! Writes `logs/backtest-trades.csv` (§6 persisted state layout): one row
//! per [`ClosedTrade`], exit reason and metrics included.

use std::path::Path;

use serde::Serialize;
use talus_execution::trade::ClosedTrade;

use crate::error::BacktestError;

#[derive(Serialize)]
struct TradeRow<'a> {
    id: &'a str,
    symbol: String,
    side: &'static str,
    strategy_id: &'a str,
    entry_price: String,
    exit_price: String,
    qty: String,
    gross_pnl: String,
    fee: String,
    net_pnl: String,
    exit_reason: &'static str,
    opened_at: String,
    closed_at: String,
}

fn exit_reason_label(reason: talus_execution::trade::ExitReason) -> &'static str {
    use talus_execution::trade::ExitReason::*;
    match reason {
        StopLoss => "STOP_LOSS",
        TakeProfit => "TAKE_PROFIT",
        TrailingStop => "TRAILING_STOP",
        TimeStop => "TIME_STOP",
        StrategyExit => "STRATEGY_EXIT",
        ForceClose => "FORCE_CLOSE",
    }
}

fn side_label(side: talus_markets::Side) -> &'static str {
    match side {
        talus_markets::Side::Long => "LONG",
        talus_markets::Side::Short => "SHORT",
    }
}

/// Overwrites `path` with a header row plus one row per trade, oldest first.
pub fn write_trades_csv(path: impl AsRef<Path>, trades: &[ClosedTrade]) -> Result<(), BacktestError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| BacktestError::Io { path: path.display().to_string(), source })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|err| match err.into_kind() {
        csv::ErrorKind::Io(source) => BacktestError::Io { path: path.display().to_string(), source },
        other => BacktestError::Io { path: path.display().to_string(), source: std::io::Error::other(other.to_string()) },
    })?;

    for trade in trades {
        let row = TradeRow {
            id: &trade.id,
            symbol: trade.symbol.to_string(),
            side: side_label(trade.side),
            strategy_id: &trade.strategy_id,
            entry_price: trade.entry_price.to_string(),
            exit_price: trade.exit_price.to_string(),
            qty: trade.qty.to_string(),
            gross_pnl: trade.gross_pnl.to_string(),
            fee: trade.fee.to_string(),
            net_pnl: trade.net_pnl().to_string(),
            exit_reason: exit_reason_label(trade.exit_reason),
            opened_at: trade.opened_at.to_rfc3339(),
            closed_at: trade.closed_at.to_rfc3339(),
        };
        writer.serialize(row).map_err(|err| match err.into_kind() {
            csv::ErrorKind::Io(source) => BacktestError::Io { path: path.display().to_string(), source },
            other => BacktestError::Io { path: path.display().to_string(), source: std::io::Error::other(other.to_string()) },
        })?;
    }

    writer.flush().map_err(|source| BacktestError::Io { path: path.display().to_string(), source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use talus_execution::trade::ExitReason;
    use talus_markets::{Side, Symbol};

    fn sample_trade() -> ClosedTrade {
        ClosedTrade {
            id: "t1".into(),
            symbol: Symbol::new("BTC"),
            side: Side::Long,
            entry_price: dec!(100),
            exit_price: dec!(105),
            qty: dec!(1),
            gross_pnl: dec!(5),
            fee: dec!(0.1),
            strategy_id: "donchian-48".into(),
            exit_reason: ExitReason::TakeProfit,
            opened_at: Utc::now(),
            closed_at: Utc::now(),
        }
    }

    #[test]
    fn writes_a_header_and_one_row_per_trade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backtest-trades.csv");
        write_trades_csv(&path, &[sample_trade(), sample_trade()]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,symbol,side"));
        assert!(lines[1].contains("TAKE_PROFIT"));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("backtest-trades.csv");
        write_trades_csv(&path, &[sample_trade()]).unwrap();
        assert!(path.exists());
    }
}
