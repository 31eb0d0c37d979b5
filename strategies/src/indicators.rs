//! Shared indicator math for strategies built on finalized bar windows:
//! Average True Range and the Donchian channel (§4.2's Donchian-48 example).

use rust_decimal::Decimal;
use talus_data::Bar;
use talus_markets::decimal::checked_div_or_zero;

/// True range for each bar after the first, using the prior bar's close:
/// `max(high−low, |high−prevClose|, |low−prevClose|)`.
fn true_ranges(bars: &[Bar]) -> Vec<Decimal> {
    bars.windows(2)
        .map(|pair| {
            let (prev, bar) = (&pair[0], &pair[1]);
            let range = bar.high - bar.low;
            let high_gap = (bar.high - prev.close).abs();
            let low_gap = (bar.low - prev.close).abs();
            range.max(high_gap).max(low_gap)
        })
        .collect()
}

/// Average True Range: the SMA of true range across `bars` (§4.2: "ATR(48)
/// via SMA of true range"). `bars` must hold `period + 1` bars for a
/// `period`-bar ATR — the extra leading bar supplies the first previous
/// close. Returns zero if fewer than two bars are given.
pub fn atr(bars: &[Bar]) -> Decimal {
    let ranges = true_ranges(bars);
    if ranges.is_empty() {
        return Decimal::ZERO;
    }
    let sum: Decimal = ranges.iter().sum();
    checked_div_or_zero(sum, Decimal::from(ranges.len()))
}

/// Highest high across `bars` (§4.2: "Upper = max high of previous 48 bars").
pub fn donchian_upper(bars: &[Bar]) -> Decimal {
    bars.iter().map(|bar| bar.high).max().unwrap_or(Decimal::ZERO)
}

/// Lowest low across `bars` (§4.2: "Lower = min low of previous 48 bars").
pub fn donchian_lower(bars: &[Bar]) -> Decimal {
    bars.iter()
        .map(|bar| bar.low)
        .min()
        .unwrap_or(Decimal::ZERO)
}
