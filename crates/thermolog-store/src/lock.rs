//! Cross-process writer lock.
//!
//! Appends and compactions inside one process are serialized by the caller.
//! Across processes (the service and a one-off `compact` run) they are not,
//! and a compaction racing an append can rename an old snapshot over a record
//! that was just written. A [`WriterLock`] is an advisory exclusive lock on a
//! `<log>.lock` sibling that every writing process takes before touching the
//! log.
//!
//! The lock lives on a separate file because compaction replaces the log's
//! inode; a lock on the log itself would not survive the first rename.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::store::ReadingLog;

/// Exclusive right to write a log, held until dropped.
#[derive(Debug)]
pub struct WriterLock {
    _file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        debug!("Released writer lock {}", self.path.display());
    }
}

impl ReadingLog {
    /// Take the writer lock for this log without waiting.
    ///
    /// Fails with [`Error::Locked`] if another process (or another handle in
    /// this one) already holds it. The lock is released when the returned
    /// guard is dropped or the process exits.
    pub fn lock_writer(&self) -> Result<WriterLock> {
        let path = lock_path(self.path());
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::Open {
                path: path.clone(),
                source: e,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired writer lock {}", path.display());
                Ok(WriterLock { _file: file, path })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(Error::Locked {
                path: self.path().to_path_buf(),
            }),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}
