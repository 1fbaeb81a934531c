//! Flash-friendly reading log for thermolog.
//!
//! This crate stores timestamped temperature/humidity readings in a single
//! line-oriented text file and keeps it bounded to a retention window.
//!
//! # Features
//!
//! - O(1) append per reading, synced before returning
//! - Retention compaction through an atomic temp-file rename
//! - "Latest" and "since cutoff" queries as linear scans that skip corrupt lines
//! - Lazy, single-pass [`Since`] iterator for streaming large results
//! - Advisory [`WriterLock`] so only one process writes a log at a time
//!
//! # Example
//!
//! ```no_run
//! use thermolog_store::ReadingLog;
//! use thermolog_types::Reading;
//!
//! let log = ReadingLog::open_default()?;
//! log.append(&Reading::new(1_700_000_000, 21.0, 49.5))?;
//!
//! for reading in log.since(1_700_000_000)? {
//!     println!("{reading}");
//! }
//!
//! // Drop everything older than a week
//! log.compact(1_700_000_000 - 7 * 86_400)?;
//! # Ok::<(), thermolog_store::Error>(())
//! ```

pub mod codec;
mod compact;
mod error;
mod lock;
mod queries;
mod store;

use std::time::Duration;

pub use codec::DecodeError;
pub use compact::CompactStats;
pub use error::{Error, Result};
pub use lock::WriterLock;
pub use queries::{
    DEFAULT_LOOKBACK_DAYS, HistoryQuery, Records, SECONDS_PER_DAY, Since, cutoff_before,
};
pub use store::ReadingLog;

/// Default retention window: seven days.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 86_400);

/// Default log path following platform conventions.
///
/// - Linux: `~/.local/share/thermolog/readings.csv`
/// - macOS: `~/Library/Application Support/thermolog/readings.csv`
/// - Windows: `C:\Users\<user>\AppData\Local\thermolog\readings.csv`
pub fn default_log_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("thermolog")
        .join("readings.csv")
}
