//! Retention compaction.
//!
//! Compaction rewrites the log keeping only records at or after a cutoff.
//! It is the only operation that rewrites existing data, so it is meant to
//! run rarely (hours apart) rather than after every append: retention is
//! enforced eventually, not instantly.
//!
//! The rewrite is a two-phase commit: survivors are written to a sibling
//! temporary file which is synced, then renamed over the original. A crash
//! before the rename leaves the original log untouched; a crash after it
//! leaves the compacted log. There is no window in which neither exists.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use thermolog_types::Timestamp;

use crate::codec;
use crate::error::{Error, Result};
use crate::store::ReadingLog;

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompactStats {
    /// Records at or after the cutoff, still in the log.
    pub kept: usize,
    /// Records older than the cutoff, removed.
    pub expired: usize,
    /// Lines that failed to decode, removed.
    pub corrupt: usize,
    /// Whether the log file was actually rewritten.
    pub rewritten: bool,
}

impl CompactStats {
    fn needs_rewrite(&self) -> bool {
        self.expired > 0 || self.corrupt > 0
    }
}

impl ReadingLog {
    /// Drop every record older than `cutoff` and every corrupt line.
    ///
    /// Records at or after the cutoff are kept in their original order. When
    /// there is nothing to drop the file is left alone, so a pass over an
    /// already-compact log costs one read and no flash writes.
    pub fn compact(&self, cutoff: Timestamp) -> Result<CompactStats> {
        let mut stats = self.survey(cutoff)?;
        if !stats.needs_rewrite() {
            debug!(
                "Log {} already compact ({} records >= {})",
                self.path().display(),
                stats.kept,
                cutoff
            );
            return Ok(stats);
        }

        let tmp = temp_path(self.path());
        if let Err(e) = self.rewrite(&tmp, cutoff) {
            discard(&tmp);
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp, self.path()) {
            discard(&tmp);
            return Err(Error::Replace {
                path: self.path().to_path_buf(),
                source: e,
            });
        }
        sync_parent(self.path());

        stats.rewritten = true;
        info!(
            "Compacted {}: kept {}, expired {}, corrupt {} (cutoff {})",
            self.path().display(),
            stats.kept,
            stats.expired,
            stats.corrupt,
            cutoff
        );
        Ok(stats)
    }

    /// Read-only pass counting what a compaction would keep and drop.
    fn survey(&self, cutoff: Timestamp) -> Result<CompactStats> {
        let mut stats = CompactStats::default();
        let Some(records) = self.records()? else {
            return Ok(stats);
        };

        for record in records {
            match record {
                Ok(r) if r.is_at_or_after(cutoff) => stats.kept += 1,
                Ok(_) => stats.expired += 1,
                Err(_) => stats.corrupt += 1,
            }
        }
        Ok(stats)
    }

    fn rewrite(&self, tmp: &Path, cutoff: Timestamp) -> Result<()> {
        let Some(records) = self.records()? else {
            return Ok(());
        };

        let mut out = BufWriter::new(File::create(tmp)?);
        for record in records {
            match record {
                Ok(r) if r.is_at_or_after(cutoff) => {
                    out.write_all(codec::encode(&r).as_bytes())?;
                }
                Ok(_) => {}
                Err(e) => debug!("Dropping corrupt line: {}", e),
            }
        }

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {}", tmp.display(), e);
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    let Some(parent) = path.parent() else {
        return;
    };
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
        debug!("Could not sync directory {}: {}", parent.display(), e);
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use thermolog_types::Reading;

    fn log_with(contents: &str) -> (tempfile::TempDir, ReadingLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        fs::write(&path, contents).unwrap();
        (dir, ReadingLog::new(path))
    }

    #[test]
    fn test_compact_drops_expired_records() {
        let (_dir, log) = log_with("1000,20.00,50.00\n1060,20.50,51.00\n1120,21.00,49.50\n");

        let stats = log.compact(1100).unwrap();
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.expired, 2);
        assert!(stats.rewritten);

        assert_eq!(fs::read_to_string(log.path()).unwrap(), "1120,21.00,49.50\n");
    }

    #[test]
    fn test_compact_cutoff_is_inclusive() {
        let (_dir, log) = log_with("1000,20.00,50.00\n1060,20.50,51.00\n");
        let stats = log.compact(1060).unwrap();
        assert_eq!(stats.kept, 1);
        assert_eq!(log.latest().unwrap().unwrap().timestamp, 1060);
    }

    #[test]
    fn test_compact_drops_corrupt_lines() {
        let (_dir, log) = log_with("1000,20.00,50.00\nnot a record\n\n1120,21.00,49.50\n1180,2");

        let stats = log.compact(0).unwrap();
        assert_eq!(stats.kept, 2);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.corrupt, 3);
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "1000,20.00,50.00\n1120,21.00,49.50\n"
        );
    }

    #[test]
    fn test_compact_drops_unterminated_tail() {
        let (_dir, log) = log_with("1000,20.00,50.00\n1120,21.00,4");

        let stats = log.compact(0).unwrap();
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.corrupt, 1);
        assert_eq!(fs::read_to_string(log.path()).unwrap(), "1000,20.00,50.00\n");
    }

    #[test]
    fn test_compact_leaves_compact_log_untouched() {
        let (_dir, log) = log_with("1120,21.00,49.50\n");
        let before = fs::metadata(log.path()).unwrap().modified().unwrap();

        let stats = log.compact(1000).unwrap();
        assert_eq!(stats.kept, 1);
        assert!(!stats.rewritten);
        assert_eq!(fs::metadata(log.path()).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_compact_missing_log_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReadingLog::new(dir.path().join("missing.csv"));

        assert_eq!(log.compact(1000).unwrap(), CompactStats::default());
        assert!(!log.path().exists());
    }

    #[test]
    fn test_compact_removes_temp_file() {
        let (dir, log) = log_with("1000,20.00,50.00\n1120,21.00,49.50\n");
        log.compact(1100).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("readings.csv")]);
    }

    #[test]
    fn test_compact_everything_expired_leaves_empty_log() {
        let (_dir, log) = log_with("1000,20.00,50.00\n1060,20.50,51.00\n");
        let stats = log.compact(5000).unwrap();
        assert_eq!(stats.kept, 0);
        assert!(log.path().exists());
        assert_eq!(log.latest().unwrap(), None);
    }

    #[test]
    fn test_append_after_compact() {
        let (_dir, log) = log_with("1000,20.00,50.00\n1120,21.00,49.50\n");
        log.compact(1100).unwrap();
        log.append(&Reading::new(1180, 21.5, 48.0)).unwrap();

        let stamps: Vec<_> = log.since(0).unwrap().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![1120, 1180]);
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let tmp = temp_path(Path::new("/data/readings.csv"));
        assert_eq!(tmp, Path::new("/data/readings.csv.tmp"));
    }
}
