use serde::{Deserialize, Serialize};
use std::fmt;

/// Candle interval. A closed enumeration — the spec recognizes exactly these
/// four timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
    H1,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognized interval code: {0}")]
pub struct ParseIntervalError(String);

impl Interval {
    pub fn minutes(self) -> i64 {
        match self {
            Interval::M1 => 1,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::H1 => 60,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::H1 => "1h",
        }
    }

    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "1h" => Ok(Interval::H1),
            other => Err(ParseIntervalError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_variant() {
        for interval in [Interval::M1, Interval::M5, Interval::M15, Interval::H1] {
            assert_eq!(interval.code().parse::<Interval>().unwrap(), interval);
        }
    }

    #[test]
    fn minutes_match_code() {
        assert_eq!(Interval::M15.minutes(), 15);
        assert_eq!(Interval::H1.minutes(), 60);
    }
}
