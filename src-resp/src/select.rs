//! Channel selection by SNCL patterns and epoch.

use crate::error::{RespError, Result};
use crate::model::{Channel, Sncl};
use chrono::NaiveDateTime;
use regex::Regex;

/// One code pattern: a glob with `*` and `?`, or the empty code.
#[derive(Debug, Clone)]
enum CodePattern {
    Empty,
    Glob(Regex),
}

impl CodePattern {
    fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() || pattern == "??" {
            return Ok(CodePattern::Empty);
        }
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');
        Regex::new(&expr)
            .map(CodePattern::Glob)
            .map_err(|e| RespError::Config(format!("invalid pattern '{}': {}", pattern, e)))
    }

    fn matches(&self, code: &str) -> bool {
        match self {
            CodePattern::Empty => code.is_empty(),
            CodePattern::Glob(re) => re.is_match(code),
        }
    }
}

/// Splits a list of codes separated by commas or blanks.
///
/// An empty list stays one empty pattern so that `""` selects blank codes.
fn parse_list(list: &str) -> Result<Vec<CodePattern>> {
    let items: Vec<&str> = list
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return Ok(vec![CodePattern::Empty]);
    }
    items.into_iter().map(CodePattern::parse).collect()
}

/// Selects channels by station, channel, network and location patterns and
/// an optional instant that must fall inside the channel epoch.
#[derive(Debug, Clone)]
pub struct ChannelFilter {
    stations: Vec<CodePattern>,
    channels: Vec<CodePattern>,
    networks: Vec<CodePattern>,
    locations: Vec<CodePattern>,
    time: Option<NaiveDateTime>,
}

impl Default for ChannelFilter {
    fn default() -> Self {
        Self::any()
    }
}

impl ChannelFilter {
    /// A filter that accepts every channel.
    pub fn any() -> Self {
        let all = || vec![CodePattern::Glob(Regex::new("^.*$").expect("valid regex"))];
        Self {
            stations: all(),
            channels: all(),
            networks: all(),
            locations: all(),
            time: None,
        }
    }

    /// Builds a filter from comma separated pattern lists.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error when a pattern cannot be compiled.
    pub fn new(
        stations: &str,
        channels: &str,
        networks: &str,
        locations: &str,
        time: Option<NaiveDateTime>,
    ) -> Result<Self> {
        Ok(Self {
            stations: parse_list(stations)?,
            channels: parse_list(channels)?,
            networks: parse_list(networks)?,
            locations: parse_list(locations)?,
            time,
        })
    }

    pub fn time(&self) -> Option<NaiveDateTime> {
        self.time
    }

    pub fn matches_sncl(&self, sncl: &Sncl) -> bool {
        let any = |patterns: &[CodePattern], code: &str| patterns.iter().any(|p| p.matches(code));
        any(&self.stations, &sncl.station)
            && any(&self.channels, &sncl.channel)
            && any(&self.networks, &sncl.network)
            && any(&self.locations, &sncl.location)
    }

    /// True when the filter instant lies in `[start, end)`; an open end never closes.
    pub fn matches_epoch(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> bool {
        match self.time {
            None => true,
            Some(t) => start.is_none_or(|s| s <= t) && end.is_none_or(|e| t < e),
        }
    }

    pub fn matches(&self, channel: &Channel) -> bool {
        self.matches_sncl(&channel.sncl) && self.matches_epoch(channel.start, channel.end)
    }
}
