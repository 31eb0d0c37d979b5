//! Decimal helpers shared across the pipeline.
//!
//! All monetary values are [`rust_decimal::Decimal`]; floating point never
//! represents a price, quantity, fee, or equity value anywhere in this
//! workspace. Division against a zero denominator yields zero rather than
//! panicking or propagating an error, preserving pipeline liveness (Design
//! Note: "Division by zero yields zero, not an exception").

use rust_decimal::{Decimal, RoundingStrategy};

/// Default decimal places for a price value absent a per-symbol override.
pub const DEFAULT_PRICE_SCALE: u32 = 8;
/// Default decimal places for a quantity value absent a per-symbol override.
pub const DEFAULT_QTY_SCALE: u32 = 3;
/// Decimal places used for percentage figures (drawdown, stop distance, ...).
pub const PERCENT_SCALE: u32 = 2;

/// `numerator / denominator`, or [`Decimal::ZERO`] if `denominator` is zero.
pub fn checked_div_or_zero(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
    }
}

/// Round a raw quantity down to the nearest multiple of `step` (never rounds
/// up — a long/short size must never exceed what risk sizing computed).
pub fn round_step_down(raw: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return raw;
    }
    let units = (raw / step).floor();
    units * step
}

/// Round a raw price to the nearest multiple of `tick`, away from the
/// position (outward rounding keeps a protective stop strictly outside the
/// current side): a stop that triggers a `Sell` (closing a long) rounds
/// **up**; a stop that triggers a `Buy` (closing a short) rounds **down**.
pub fn round_stop_price_tick(raw: Decimal, tick: Decimal, closing_side: crate::side::OrderSide) -> Decimal {
    if tick.is_zero() {
        return raw;
    }
    let units = raw / tick;
    let rounded_units = match closing_side {
        crate::side::OrderSide::Sell => units.ceil(),
        crate::side::OrderSide::Buy => units.floor(),
    };
    rounded_units * tick
}

/// `HALF_UP` rounding to `scale` decimal places, the convention the spec
/// calls for on displayed/persisted prices.
pub fn round_half_up(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::side::OrderSide;
    use rust_decimal_macros::dec;

    #[test]
    fn division_by_zero_yields_zero() {
        assert_eq!(checked_div_or_zero(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(checked_div_or_zero(dec!(10), dec!(4)), dec!(2.5));
    }

    #[test]
    fn step_rounding_never_rounds_up() {
        assert_eq!(round_step_down(dec!(0.1009), dec!(0.001)), dec!(0.100));
        assert_eq!(round_step_down(dec!(0.0999), dec!(0.001)), dec!(0.099));
    }

    #[test]
    fn stop_price_rounds_outward_from_the_position() {
        // Closing a long (Sell stop) rounds up, away from the entry.
        assert_eq!(
            round_stop_price_tick(dec!(49000.1), dec!(1), OrderSide::Sell),
            dec!(49001)
        );
        // Closing a short (Buy stop) rounds down.
        assert_eq!(
            round_stop_price_tick(dec!(49000.9), dec!(1), OrderSide::Buy),
            dec!(49000)
        );
    }
}
