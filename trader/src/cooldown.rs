//! Entry cooldown tracking (§4.2): blocks a strategy's entries for
//! `cooldownBars` finalized bars after its last entry, while leaving exits
//! and in-position management ungated.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Cooldown {
    cooldown_bars: u32,
    bars_since_last_entry: u32,
    last_seen_open_time: Option<DateTime<Utc>>,
}

impl Cooldown {
    pub fn new(cooldown_bars: u32) -> Self {
        Cooldown {
            cooldown_bars,
            // Start inactive: nothing blocks the first entry.
            bars_since_last_entry: cooldown_bars,
            last_seen_open_time: None,
        }
    }

    /// `true` while entries remain blocked.
    pub fn is_active(&self) -> bool {
        self.bars_since_last_entry < self.cooldown_bars
    }

    /// Advance the counter once per unique bar open time (§4.2: "The
    /// evaluator increments the counter once per unique bar open time").
    /// Duplicate intra-bar updates at the same open time are no-ops.
    pub fn on_bar(&mut self, open_time: DateTime<Utc>) {
        if self.last_seen_open_time != Some(open_time) {
            self.bars_since_last_entry = self.bars_since_last_entry.saturating_add(1);
            self.last_seen_open_time = Some(open_time);
        }
    }

    /// Reset the counter after a fresh entry.
    pub fn record_entry(&mut self) {
        self.bars_since_last_entry = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_time(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minute * 60, 0).unwrap()
    }

    #[test]
    fn starts_inactive_so_first_entry_is_unblocked() {
        let cooldown = Cooldown::new(3);
        assert!(!cooldown.is_active());
    }

    #[test]
    fn blocks_entries_until_cooldown_bars_elapse() {
        let mut cooldown = Cooldown::new(3);
        cooldown.record_entry();
        assert!(cooldown.is_active());

        cooldown.on_bar(bar_time(1));
        assert!(cooldown.is_active());
        cooldown.on_bar(bar_time(2));
        assert!(cooldown.is_active());
        cooldown.on_bar(bar_time(3));
        assert!(!cooldown.is_active());
    }

    #[test]
    fn duplicate_open_time_does_not_advance_counter() {
        let mut cooldown = Cooldown::new(1);
        cooldown.record_entry();
        cooldown.on_bar(bar_time(1));
        cooldown.on_bar(bar_time(1));
        assert!(cooldown.is_active());
        cooldown.on_bar(bar_time(2));
        assert!(!cooldown.is_active());
    }
}
