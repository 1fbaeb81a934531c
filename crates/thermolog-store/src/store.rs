//! Main log implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use thermolog_types::{Reading, Timestamp};

use crate::codec;
use crate::error::{Error, Result};
use crate::queries::{Records, Since};

/// File-backed, append-only log of readings.
///
/// The log holds no state beyond its path: every operation opens the file,
/// does its work, and closes it again. Callers are expected to serialize
/// writers (append and compaction) against each other, and a writing process
/// should hold [`lock_writer`](Self::lock_writer) while it runs. Readers only
/// need the file to exist.
#[derive(Debug, Clone)]
pub struct ReadingLog {
    path: PathBuf,
}

impl ReadingLog {
    /// Refer to a log at `path` without touching the filesystem.
    ///
    /// Useful when the storage is unavailable at startup: appends will fail
    /// and queries will report no data until the path becomes writable.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open or create a log at the given path.
    ///
    /// Creates missing parent directories and an empty log file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let log = Self::new(path);

        if let Some(parent) = log.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        if !log.path.exists() {
            info!("Creating empty reading log at {}", log.path.display());
            File::create(&log.path).map_err(|e| Error::Open {
                path: log.path.clone(),
                source: e,
            })?;
        }

        Ok(log)
    }

    /// Open the default log location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_log_path())
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for sequential reading.
    ///
    /// A missing log is not an error: it simply has no records yet.
    pub(crate) fn records(&self) -> Result<Option<Records<BufReader<File>>>> {
        match File::open(&self.path) {
            Ok(file) => Ok(Some(Records::new(BufReader::new(file)))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Open {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

// Append operations
impl ReadingLog {
    /// Append one reading.
    ///
    /// This is a pure append: the existing contents are never rewritten, so
    /// the cost does not grow with the size of the log. The record is synced
    /// to storage before returning.
    ///
    /// If a previous append was interrupted and left the file without a
    /// trailing newline, the partial record is cut off first. Readers already
    /// ignore it; cutting it keeps it from being mistaken for a complete
    /// record once a newline follows it.
    pub fn append(&self, reading: &Reading) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::Open {
                path: self.path.clone(),
                source: e,
            })?;

        let dropped = trim_torn_tail(&mut file)?;
        if dropped > 0 {
            debug!(
                "Log {} ended mid-record, dropped {} trailing bytes",
                self.path.display(),
                dropped
            );
        }

        let line = codec::encode(reading);

        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        debug!("Appended {}", reading);
        Ok(())
    }
}

// Query operations
impl ReadingLog {
    /// Return the last record in the log that decodes successfully.
    ///
    /// Scans the whole log. Corrupt lines, including a partially written
    /// final line, are skipped.
    pub fn latest(&self) -> Result<Option<Reading>> {
        let Some(records) = self.records()? else {
            return Ok(None);
        };
        Ok(records.filter_map(|r| r.ok()).last())
    }

    /// Lazily yield every record with `timestamp >= cutoff`, in stored order.
    ///
    /// The returned iterator reads the file as it is consumed. It is finite
    /// and single-pass; run the query again to start over.
    pub fn since(&self, cutoff: Timestamp) -> Result<Since> {
        Ok(Since::new(self.records()?, cutoff))
    }
}

/// Bytes read per step while looking for the end of the last full record.
const TAIL_WINDOW: u64 = 4096;

/// Cut an unterminated final line off the file, returning how many bytes
/// were dropped.
///
/// A healthy log ends in `\n` and costs a one-byte read. Otherwise the file is
/// searched backwards one window at a time.
fn trim_torn_tail(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let mut end = len;
    let mut window = Vec::new();

    while end > 0 {
        let start = end.saturating_sub(TAIL_WINDOW);
        window.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut window)?;

        if let Some(pos) = window.iter().rposition(|&b| b == b'\n') {
            end = start + pos as u64 + 1;
            break;
        }
        end = start;
    }

    if end < len {
        file.set_len(end)?;
    }
    Ok(len - end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_log() -> (tempfile::TempDir, ReadingLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = ReadingLog::open(dir.path().join("readings.csv")).unwrap();
        (dir, log)
    }

    #[test]
    fn test_open_creates_empty_file() {
        let (_dir, log) = temp_log();
        assert!(log.path().exists());
        assert_eq!(std::fs::metadata(log.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("log.csv");
        let log = ReadingLog::open(&path).unwrap();
        assert!(log.path().exists());
    }

    #[test]
    fn test_open_keeps_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.csv");
        std::fs::write(&path, "1000,20.00,50.00\n").unwrap();

        let log = ReadingLog::open(&path).unwrap();
        assert_eq!(log.latest().unwrap(), Some(Reading::new(1000, 20.0, 50.0)));
    }

    #[test]
    fn test_append_writes_encoded_lines() {
        let (_dir, log) = temp_log();
        log.append(&Reading::new(1000, 20.0, 50.0)).unwrap();
        log.append(&Reading::new(1060, 20.5, 51.0)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "1000,20.00,50.00\n1060,20.50,51.00\n");
    }

    #[test]
    fn test_append_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReadingLog::new(dir.path().join("late.csv"));
        log.append(&Reading::new(1000, 20.0, 50.0)).unwrap();
        assert_eq!(log.latest().unwrap().unwrap().timestamp, 1000);
    }

    #[test]
    fn test_append_fails_when_storage_missing() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReadingLog::new(dir.path().join("no-such-dir").join("log.csv"));
        let err = log.append(&Reading::new(1000, 20.0, 50.0)).unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_append_drops_torn_line() {
        let (_dir, log) = temp_log();
        std::fs::write(log.path(), "1000,20.00,50.00\n1060,20.5").unwrap();

        log.append(&Reading::new(1120, 21.0, 49.5)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "1000,20.00,50.00\n1120,21.00,49.50\n");
        assert_eq!(log.latest().unwrap(), Some(Reading::new(1120, 21.0, 49.5)));
    }

    #[test]
    fn test_torn_tail_never_becomes_a_record() {
        // Cut after the second comma and one byte into the humidity field
        for torn in ["1120,21.00,", "1120,21.00,4"] {
            let (_dir, log) = temp_log();
            std::fs::write(log.path(), format!("1060,20.50,51.00\n{torn}")).unwrap();

            assert_eq!(log.latest().unwrap(), Some(Reading::new(1060, 20.5, 51.0)));
            assert_eq!(log.since(0).unwrap().count(), 1);

            log.append(&Reading::new(1180, 21.0, 49.5)).unwrap();

            let contents = std::fs::read_to_string(log.path()).unwrap();
            assert_eq!(contents, "1060,20.50,51.00\n1180,21.00,49.50\n");
            let stamps: Vec<_> = log.since(0).unwrap().map(|r| r.timestamp).collect();
            assert_eq!(stamps, vec![1060, 1180]);
        }
    }

    #[test]
    fn test_append_drops_torn_only_line() {
        let (_dir, log) = temp_log();
        std::fs::write(log.path(), "1000,20.0").unwrap();

        log.append(&Reading::new(1060, 20.5, 51.0)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "1060,20.50,51.00\n");
    }

    #[test]
    fn test_append_drops_torn_line_longer_than_window() {
        let (_dir, log) = temp_log();
        let torn = format!("1180,21.00,{}", "4".repeat(TAIL_WINDOW as usize * 2));
        std::fs::write(log.path(), format!("1000,20.00,50.00\n{torn}")).unwrap();

        log.append(&Reading::new(1060, 20.5, 51.0)).unwrap();

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "1000,20.00,50.00\n1060,20.50,51.00\n");
    }

    #[test]
    fn test_trim_leaves_clean_log_alone() {
        let (_dir, log) = temp_log();
        std::fs::write(log.path(), "1000,20.00,50.00\n").unwrap();

        let mut file = OpenOptions::new().read(true).append(true).open(log.path()).unwrap();
        assert_eq!(trim_torn_tail(&mut file).unwrap(), 0);
        assert_eq!(std::fs::metadata(log.path()).unwrap().len(), 17);
    }

    #[test]
    fn test_latest_after_appends() {
        let (_dir, log) = temp_log();
        for n in 1..=25 {
            log.append(&Reading::new(1000 + n * 60, 20.0, 50.0)).unwrap();
            assert_eq!(log.latest().unwrap().unwrap().timestamp, 1000 + n * 60);
        }
    }

    #[test]
    fn test_latest_empty_and_missing() {
        let (_dir, log) = temp_log();
        assert_eq!(log.latest().unwrap(), None);

        let missing = ReadingLog::new(log.path().with_file_name("missing.csv"));
        assert_eq!(missing.latest().unwrap(), None);
    }

    #[test]
    fn test_latest_skips_corrupt_tail() {
        let (_dir, log) = temp_log();
        std::fs::write(log.path(), "1000,20.00,50.00\n1060,20.50,51.00\n1120,2").unwrap();
        assert_eq!(log.latest().unwrap(), Some(Reading::new(1060, 20.5, 51.0)));
    }

    #[test]
    fn test_since_filters_and_preserves_order() {
        let (_dir, log) = temp_log();
        for ts in [1000, 1120, 1060, 1180] {
            log.append(&Reading::new(ts, 20.0, 50.0)).unwrap();
        }

        let stamps: Vec<_> = log.since(1060).unwrap().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![1120, 1060, 1180]);
    }

    #[test]
    fn test_since_on_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReadingLog::new(dir.path().join("missing.csv"));
        assert_eq!(log.since(0).unwrap().count(), 0);
    }
}
