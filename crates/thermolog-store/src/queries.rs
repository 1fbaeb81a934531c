//! Log scanning and history query resolution.
//!
//! The log has no index, so every query is a sequential scan over
//! [`Records`]. [`Since`] wraps that scan with a cutoff filter and is what the
//! HTTP layer streams out. [`HistoryQuery`] turns the optional request
//! parameters into a concrete cutoff.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use thermolog_store::HistoryQuery;
//!
//! let week = Duration::from_secs(7 * 86_400);
//! let now = Some(1_700_086_400);
//!
//! // Explicit bound wins over everything else
//! assert_eq!(HistoryQuery::new().since(1_700_000_000).days(3).resolve(now, week), 1_700_000_000);
//!
//! // Relative lookback
//! assert_eq!(HistoryQuery::new().days(1).resolve(now, week), 1_700_000_000);
//!
//! // Clock not synchronized yet: return everything
//! assert_eq!(HistoryQuery::new().resolve(None, week), 0);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use tracing::warn;

use thermolog_types::{Reading, Timestamp};

use crate::codec::{self, DecodeError};

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Lookback used when `days` is given but not positive.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

/// Compute `now - lookback`, saturating instead of overflowing.
pub fn cutoff_before(now: Timestamp, lookback: Duration) -> Timestamp {
    let secs = i64::try_from(lookback.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(secs)
}

/// Sequential decoder over raw log lines.
///
/// Yields one item per line: the decoded reading or the reason it was
/// rejected. A final line without its newline is an interrupted append and is
/// reported as [`DecodeError::Truncated`] whatever it contains. An I/O error
/// ends the scan; it is logged and never surfaced, so a query over a damaged
/// file returns what could be read.
pub struct Records<R> {
    reader: R,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Records<R> {
    /// Scan records from any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(64),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<Reading, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) if self.buf.last() != Some(&b'\n') => {
                self.done = true;
                Some(Err(DecodeError::Truncated))
            }
            Ok(_) => Some(codec::decode_bytes(&self.buf)),
            Err(e) => {
                warn!("Stopping log scan after read error: {}", e);
                self.done = true;
                None
            }
        }
    }
}

/// Records at or after a cutoff, in stored order.
///
/// Returned by [`ReadingLog::since`](crate::ReadingLog::since). Lines that
/// fail to decode are skipped.
pub struct Since {
    records: Option<Records<BufReader<File>>>,
    cutoff: Timestamp,
}

impl Since {
    pub(crate) fn new(records: Option<Records<BufReader<File>>>, cutoff: Timestamp) -> Self {
        Self { records, cutoff }
    }

    /// The cutoff this sequence filters on.
    pub fn cutoff(&self) -> Timestamp {
        self.cutoff
    }
}

impl Iterator for Since {
    type Item = Reading;

    fn next(&mut self) -> Option<Reading> {
        let cutoff = self.cutoff;
        let records = self.records.as_mut()?;
        records
            .by_ref()
            .filter_map(|r| r.ok())
            .find(|r| r.is_at_or_after(cutoff))
    }
}

/// Parameters of a history request, resolved to a single cutoff.
///
/// Precedence: an explicit `since` timestamp, then a relative `days`
/// lookback, then the retention window. Relative lookbacks need a valid
/// clock; without one the cutoff is epoch 0 and everything is returned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Absolute lower bound (epoch seconds).
    pub since: Option<Timestamp>,
    /// Relative lookback in days. Values `<= 0` mean [`DEFAULT_LOOKBACK_DAYS`].
    pub days: Option<i64>,
}

impl HistoryQuery {
    /// Create a query that defaults to the retention window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only include readings at or after this timestamp.
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Only include readings from the last `days` days.
    pub fn days(mut self, days: i64) -> Self {
        self.days = Some(days);
        self
    }

    /// Resolve to a cutoff given the current time (if known) and the
    /// retention window.
    pub fn resolve(&self, now: Option<Timestamp>, retention: Duration) -> Timestamp {
        if let Some(since) = self.since {
            return since;
        }

        let Some(now) = now else {
            return 0;
        };

        match self.days {
            Some(days) => {
                let days = if days <= 0 { DEFAULT_LOOKBACK_DAYS } else { days };
                now.saturating_sub(days.saturating_mul(SECONDS_PER_DAY))
            }
            None => cutoff_before(now, retention),
        }
    }
}
