//! Maildir-format on-disk queue.
//!
//! Grounded directly on `original_source/salmon/queue.py`'s `Queue` and
//! `SafeMaildir`: the same `tmp/` → `new/` write-then-rename sequence, the
//! same oversize-before-decode admission check in `pop`, and the same
//! uniqueness-name scheme (`SafeMaildir._create_tmp`) for the hostname-
//! hashing variant.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};

use crate::error::QueueError;

/// A Maildir-backed queue: `push` writes to `tmp/` then renames into
/// `new/`; `pop` takes the first entry it finds in `new/` (no FIFO
/// guarantee -- filesystem directory iteration order, exactly as
/// `salmon/queue.py`'s docstring warns).
pub struct Queue {
    dir: PathBuf,
    safe: bool,
    pop_limit: u64,
    oversize_dir: Option<PathBuf>,
    counter: AtomicU64,
}

impl Queue {
    pub fn new(dir: impl Into<PathBuf>, safe: bool, pop_limit: u64, oversize_dir: Option<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        for sub in ["tmp", "new", "cur"] {
            create_dir_all(&dir.join(sub))?;
        }
        if let Some(ref over) = oversize_dir {
            create_dir_all(&over.join("new"))?;
        }
        Ok(Queue {
            dir,
            safe,
            pop_limit,
            oversize_dir,
            counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` to `tmp/` and atomically rename it into `new/`,
    /// returning the generated key.
    pub fn push(&self, data: &[u8]) -> Result<String, QueueError> {
        let key = self.unique_name();
        let tmp_path = self.dir.join("tmp").join(&key);

        if tmp_path.exists() {
            return Err(QueueError::ExternalClash(tmp_path.display().to_string()));
        }
        fs::write(&tmp_path, data).map_err(|e| io_err(&tmp_path, e))?;

        let new_path = self.dir.join("new").join(&key);
        fs::rename(&tmp_path, &new_path).map_err(|e| io_err(&new_path, e))?;
        Ok(key)
    }

    /// Pop the first non-oversize message found in `new/`. Oversize
    /// messages are shunted to `oversize_dir` (or deleted if none is
    /// configured) and iteration continues. Returns `None` if the queue is
    /// empty once oversize entries are skipped.
    pub fn pop(&self) -> Result<Option<(String, Vec<u8>)>, QueueError> {
        for key in self.keys()? {
            if self.is_oversize(&key)? {
                self.move_oversize(&key)?;
                continue;
            }
            let data = self.get(&key)?;
            let Some(data) = data else { continue };
            self.remove(&key)?;
            return Ok(Some((key, data)));
        }
        Ok(None)
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let path = self.dir.join("new").join(key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub fn remove(&self, key: &str) -> Result<(), QueueError> {
        let path = self.dir.join("new").join(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    pub fn keys(&self) -> Result<Vec<String>, QueueError> {
        let new_dir = self.dir.join("new");
        let mut keys = Vec::new();
        for entry in fs::read_dir(&new_dir).map_err(|e| io_err(&new_dir, e))? {
            let entry = entry.map_err(|e| io_err(&new_dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_owned());
            }
        }
        Ok(keys)
    }

    pub fn clear(&self) -> Result<(), QueueError> {
        for sub in ["new", "cur"] {
            let sub_dir = self.dir.join(sub);
            for entry in fs::read_dir(&sub_dir).map_err(|e| io_err(&sub_dir, e))? {
                let entry = entry.map_err(|e| io_err(&sub_dir, e))?;
                fs::remove_file(entry.path()).map_err(|e| io_err(&sub_dir, e))?;
            }
        }
        Ok(())
    }

    pub fn is_oversize(&self, key: &str) -> Result<bool, QueueError> {
        if self.pop_limit == 0 {
            return Ok(false);
        }
        let path = self.dir.join("new").join(key);
        let size = fs::metadata(&path).map_err(|e| io_err(&path, e))?.len();
        Ok(size > self.pop_limit)
    }

    fn move_oversize(&self, key: &str) -> Result<(), QueueError> {
        let from = self.dir.join("new").join(key);
        match &self.oversize_dir {
            Some(over) => {
                tracing::info!(key, limit = self.pop_limit, dest = %over.display(), "message over size limit, moving to oversize queue");
                let to = over.join("new").join(key);
                fs::rename(&from, &to).map_err(|e| io_err(&from, e))
            }
            None => {
                tracing::info!(key, limit = self.pop_limit, "message over size limit, deleting (no oversize_dir configured)");
                fs::remove_file(&from).map_err(|e| io_err(&from, e))
            }
        }
    }

    /// `SafeMaildir._create_tmp`'s naming scheme: a monotonic process-local
    /// counter plus the current time plus pid, suffixed with either the
    /// real hostname or an MD5 hash of it (the "safe" variant).
    fn unique_name(&self) -> String {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        let host = self.host_component();
        format!("{}.M{}P{}Q{}.{}", now.as_secs(), now.subsec_micros(), pid, count, host)
    }

    fn host_component(&self) -> String {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned());
        if self.safe {
            let mut hasher = Md5::new();
            hasher.update(hostname.as_bytes());
            format!("{:x}", hasher.finalize())
        } else {
            hostname
        }
    }
}

fn create_dir_all(path: &Path) -> Result<(), QueueError> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}

fn io_err(path: &Path, source: std::io::Error) -> QueueError {
    QueueError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_queue() -> (tempfile::TempDir, Queue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::new(dir.path(), false, 0, None).unwrap();
        (dir, queue)
    }

    #[test]
    fn push_then_pop_round_trips_the_message() {
        let (_dir, queue) = temp_queue();
        let key = queue.push(b"hello").unwrap();
        let (popped_key, data) = queue.pop().unwrap().unwrap();
        assert_eq!(popped_key, key);
        assert_eq!(data, b"hello");
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn get_does_not_remove_the_message() {
        let (_dir, queue) = temp_queue();
        let key = queue.push(b"hello").unwrap();
        assert_eq!(queue.get(&key).unwrap().unwrap(), b"hello");
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn oversize_message_is_deleted_when_no_oversize_dir_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::new(dir.path(), false, 3, None).unwrap();
        queue.push(b"way too long").unwrap();
        assert_eq!(queue.pop().unwrap(), None);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn oversize_message_is_moved_when_oversize_dir_is_configured() {
        let dir = tempfile::tempdir().unwrap();
        let oversize_dir = tempfile::tempdir().unwrap();
        let queue = Queue::new(dir.path(), false, 3, Some(oversize_dir.path().to_path_buf())).unwrap();
        let key = queue.push(b"way too long").unwrap();
        assert_eq!(queue.pop().unwrap(), None);
        assert!(oversize_dir.path().join("new").join(&key).exists());
    }

    #[test]
    fn safe_variant_hashes_the_hostname_component() {
        let (_dir, queue) = temp_queue();
        let (_safe_dir, safe_queue) = {
            let dir = tempfile::tempdir().unwrap();
            let q = Queue::new(dir.path(), true, 0, None).unwrap();
            (dir, q)
        };
        let plain_host = queue.host_component();
        let safe_host = safe_queue.host_component();
        assert_ne!(plain_host, safe_host);
        assert_eq!(safe_host.len(), 32); // md5 hex digest length
    }

    #[test]
    fn clear_empties_the_queue() {
        let (_dir, queue) = temp_queue();
        queue.push(b"one").unwrap();
        queue.push(b"two").unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty().unwrap());
    }
}
