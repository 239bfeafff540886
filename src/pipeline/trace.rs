//! Transport-trace timestamps and the delivery delay derived from them.
//!
//! Every relay appends a `Received:` header ending in an RFC 1123Z-ish date.
//! The dates are loosely formatted and buried in free text, so the parser
//! first locates a candidate with a regex and only then hands it to chrono.

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::trace;

use crate::error::TraceTimeError;

/// Finds and parses the timestamp inside one `Received:` header value.
#[derive(Debug, Clone)]
pub struct TraceTimeParser {
    regex: Regex,
}

impl TraceTimeParser {
    /// Compile the timestamp pattern.
    pub fn new() -> Self {
        // Leading `.*` is greedy, so the last date in the value wins.
        Self {
            regex: Regex::new(r".*([A-Za-z_]{3}, \d+ [A-Za-z_]+ \d+ \d+:\d+:\d+ [-+]?\d+).*")
                .unwrap(),
        }
    }

    /// Parse the timestamp carried by a single trace header value.
    pub fn parse(&self, value: &str) -> Result<DateTime<FixedOffset>, TraceTimeError> {
        let candidate = self
            .regex
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or(TraceTimeError::NotFound)?;

        parse_rfc1123z(candidate)
    }

    /// Parse every value, dropping the ones without a usable timestamp.
    pub fn collect<'a, I>(&self, values: I) -> Timestamps
    where
        I: IntoIterator<Item = &'a str>,
    {
        values
            .into_iter()
            .filter_map(|value| match self.parse(value) {
                Ok(ts) => Some(ts),
                Err(e) => {
                    trace!(header = value, error = %e, "Skipping trace header");
                    None
                }
            })
            .collect()
    }
}

impl Default for TraceTimeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `Mon, 2 Jan 2006 15:04:05 -0700`.
///
/// The weekday only has to look like a weekday; it is not checked against the
/// date, since relays get it wrong often enough.
fn parse_rfc1123z(candidate: &str) -> Result<DateTime<FixedOffset>, TraceTimeError> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(candidate) {
        return Ok(dt);
    }

    let without_weekday = candidate
        .split_once(", ")
        .map(|(_, rest)| rest)
        .unwrap_or(candidate);

    let normalized = expand_short_year(without_weekday);
    DateTime::parse_from_str(&normalized, "%d %b %Y %H:%M:%S %z").map_err(|e| {
        TraceTimeError::Invalid {
            value: candidate.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Widen a two- or three-digit year the way RFC 2822 parsing does:
/// below 50 is 20xx, anything else 19xx.
fn expand_short_year(date: &str) -> String {
    let mut parts: Vec<String> = date.split(' ').map(str::to_string).collect();
    if let Some(year) = parts.get_mut(2)
        && year.len() < 4
        && let Ok(value) = year.parse::<u32>()
    {
        let full = if value < 50 { value + 2000 } else { value + 1900 };
        *year = full.to_string();
    }
    parts.join(" ")
}

/// Timestamps gathered from one message's trace headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timestamps(Vec<DateTime<FixedOffset>>);

impl Timestamps {
    /// Sort ascending by instant, regardless of each timestamp's offset.
    pub fn sort(&mut self) {
        self.0.sort_unstable();
    }

    /// Whole seconds between the earliest and latest timestamp.
    ///
    /// Zero when there are fewer than two timestamps.
    pub fn delay_secs(&mut self) -> i64 {
        if self.0.len() < 2 {
            return 0;
        }
        self.sort();
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) => last.signed_duration_since(*first).num_seconds(),
            _ => 0,
        }
    }
}

impl FromIterator<DateTime<FixedOffset>> for Timestamps {
    fn from_iter<T: IntoIterator<Item = DateTime<FixedOffset>>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
