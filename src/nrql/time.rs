//! Time windows for SINCE/UNTIL clauses.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::token::{Token, TokenStream};

/// Unit of a relative time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    fn keyword(self, amount: u64) -> &'static str {
        let singular = amount == 1;
        match (self, singular) {
            (TimeUnit::Seconds, true) => "second",
            (TimeUnit::Seconds, false) => "seconds",
            (TimeUnit::Minutes, true) => "minute",
            (TimeUnit::Minutes, false) => "minutes",
            (TimeUnit::Hours, true) => "hour",
            (TimeUnit::Hours, false) => "hours",
            (TimeUnit::Days, true) => "day",
            (TimeUnit::Days, false) => "days",
            (TimeUnit::Weeks, true) => "week",
            (TimeUnit::Weeks, false) => "weeks",
        }
    }

    fn seconds(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3_600,
            TimeUnit::Days => 86_400,
            TimeUnit::Weeks => 604_800,
        }
    }

    /// Tokens for `<amount> <unit>`, e.g. `1 second`.
    pub fn to_tokens(self, amount: u64) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::LitInt(amount as i64))
            .space()
            .push(Token::TimeUnit(self.keyword(amount)));
        ts
    }
}

/// The time range a query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimeWindow {
    /// `SINCE <amount> <unit> ago`
    Relative { amount: u64, unit: TimeUnit },
    /// `SINCE <epoch ms> [UNTIL <epoch ms>]`
    Absolute { since_ms: i64, until_ms: Option<i64> },
}

impl TimeWindow {
    pub fn minutes(amount: u64) -> Self {
        TimeWindow::Relative {
            amount,
            unit: TimeUnit::Minutes,
        }
    }

    pub fn hours(amount: u64) -> Self {
        TimeWindow::Relative {
            amount,
            unit: TimeUnit::Hours,
        }
    }

    /// Length of the window, when it is bounded.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            TimeWindow::Relative { amount, unit } => {
                Some(Duration::from_secs(amount.saturating_mul(unit.seconds())))
            }
            TimeWindow::Absolute {
                since_ms,
                until_ms: Some(until_ms),
            } if until_ms >= since_ms => Some(Duration::from_millis((until_ms - since_ms) as u64)),
            TimeWindow::Absolute { .. } => None,
        }
    }

    pub fn to_tokens(&self) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.push(Token::Since).space();
        match self {
            TimeWindow::Relative { amount, unit } => {
                ts.append(&unit.to_tokens(*amount)).space().push(Token::Ago);
            }
            TimeWindow::Absolute { since_ms, until_ms } => {
                ts.push(Token::LitInt(*since_ms));
                if let Some(until) = until_ms {
                    ts.space()
                        .push(Token::Until)
                        .space()
                        .push(Token::LitInt(*until));
                }
            }
        }
        ts
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_tokens().serialize())
    }
}

/// Error parsing a shorthand time window such as `30m`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time window '{0}': expected <number><s|m|h|d|w>")]
pub struct ParseTimeWindowError(pub String);

impl FromStr for TimeWindow {
    type Err = ParseTimeWindowError;

    /// Parse shorthand like `30m`, `6h`, `7d`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseTimeWindowError(s.to_string());
        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(err)?;
        let (digits, suffix) = s.split_at(split);
        let amount: u64 = digits.parse().map_err(|_| err())?;
        if amount == 0 {
            return Err(err());
        }
        let unit = match suffix {
            "s" => TimeUnit::Seconds,
            "m" => TimeUnit::Minutes,
            "h" => TimeUnit::Hours,
            "d" => TimeUnit::Days,
            "w" => TimeUnit::Weeks,
            _ => return Err(err()),
        };
        Ok(TimeWindow::Relative { amount, unit })
    }
}
