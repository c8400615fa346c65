//! Time range parsing for trimmed downloads.
//!
//! Accepted forms are `start-end`, `start-` and `start`, where each offset
//! is either plain seconds (`90`, `90s`, `1.5`) or a clock value
//! (`1:30`, `01:02:03.250`).

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::{Error, Result};

static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:(\d+):)?(\d+):)?(\d+(?:\.\d+)?)s?$").expect("valid time offset regex")
});

/// A trim window over the source media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start: Duration,
    /// End offset; `None` means until the end of the source.
    pub end: Option<Duration>,
}

impl TimeRange {
    pub fn new(start: Duration, end: Option<Duration>) -> Result<Self> {
        if let Some(end) = end
            && end <= start
        {
            return Err(Error::InvalidTimeRange(format!(
                "end {:?} is not after start {:?}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the window, `None` when open-ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_sub(self.start))
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_zero() && self.end.is_none()
    }
}

fn parse_offset(s: &str) -> Result<Duration> {
    let caps = OFFSET_RE
        .captures(s.trim())
        .ok_or_else(|| Error::InvalidTimeRange(format!("invalid offset {:?}", s)))?;

    let field = |idx: usize| -> f64 {
        caps.get(idx)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let (hours, minutes, seconds) = (field(1), field(2), field(3));
    if caps.get(2).is_some() && seconds >= 60.0 {
        return Err(Error::InvalidTimeRange(format!("invalid offset {:?}", s)));
    }

    Duration::try_from_secs_f64(hours * 3600.0 + minutes * 60.0 + seconds)
        .map_err(|_| Error::InvalidTimeRange(format!("offset out of range {:?}", s)))
}

fn format_offset(d: Duration) -> String {
    let millis = d.subsec_millis();
    if millis == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}.{:03}s", d.as_secs(), millis)
    }
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidTimeRange("empty time range".to_string()));
        }

        match s.split_once('-') {
            Some((start, end)) => {
                let start = if start.trim().is_empty() {
                    Duration::ZERO
                } else {
                    parse_offset(start)?
                };
                let end = if end.trim().is_empty() {
                    None
                } else {
                    Some(parse_offset(end)?)
                };
                Self::new(start, end)
            }
            None => Self::new(parse_offset(s)?, None),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", format_offset(self.start), format_offset(end)),
            None => write!(f, "{}-", format_offset(self.start)),
        }
    }
}
