//! Per-message envelope metadata sidecars with advisory locking, and
//! `QueueWithMetadata`, the fan-out-aware queue variant LMTP delivery uses.
//!
//! Grounded directly on `original_source/salmon/queue.py`'s `Metadata` and
//! `QueueWithMetadata`: one JSON file per key under a `metadata/`
//! subdirectory, an exclusive advisory lock acquired with exponential
//! backoff, and `remove` that only unlinks the message once every
//! recipient in `To` has been consumed.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::maildir::Queue;

/// Lock retries use exponential backoff: `2^0, 2^1, ..., 2^(MAX_ATTEMPTS-1)`
/// seconds, matching `Metadata.lock`'s `time.sleep(2**i)` with `i` capped
/// at 5 (`2**5 == 32s`, total wait ≈ 62s across all attempts).
const MAX_LOCK_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Peer")]
    pub peer: Option<String>,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: Vec<String>,
}

struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    fn new(queue_dir: &Path) -> Result<Self, QueueError> {
        let dir = queue_dir.join("metadata");
        fs::create_dir_all(&dir).map_err(|e| QueueError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        Ok(MetadataStore { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn write(&self, key: &str, envelope: &Envelope) -> Result<(), QueueError> {
        let path = self.path(key);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| QueueError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        lock_exclusive_with_backoff(&file, key)?;
        serde_json::to_writer(&file, envelope).map_err(|e| QueueError::Metadata(key.to_owned(), e.to_string()))?;
        FileExt::unlock(&file).ok();
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Envelope, QueueError> {
        let path = self.path(key);
        let file = File::open(&path).map_err(|e| QueueError::Metadata(key.to_owned(), e.to_string()))?;
        lock_exclusive_with_backoff(&file, key)?;
        let envelope = serde_json::from_reader(&file).map_err(|e| QueueError::Metadata(key.to_owned(), e.to_string()));
        FileExt::unlock(&file).ok();
        envelope
    }

    fn remove(&self, key: &str) -> Result<(), QueueError> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    fn clear(&self) -> Result<(), QueueError> {
        for entry in fs::read_dir(&self.dir).map_err(|e| QueueError::Io {
            path: self.dir.display().to_string(),
            source: e,
        })? {
            let entry = entry.map_err(|e| QueueError::Io {
                path: self.dir.display().to_string(),
                source: e,
            })?;
            // best-effort: a sidecar another process is actively locking
            // is skipped rather than failing the whole clear.
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }
}

fn lock_exclusive_with_backoff(file: &File, key: &str) -> Result<(), QueueError> {
    for attempt in 0..MAX_LOCK_ATTEMPTS {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(_) => thread::sleep(Duration::from_secs(1u64 << attempt)),
        }
    }
    match file.try_lock_exclusive() {
        Ok(()) => Ok(()),
        Err(_) => Err(QueueError::LockTimeout(key.to_owned(), MAX_LOCK_ATTEMPTS)),
    }
}

/// A `Queue` that also records `{Peer, From, To}` alongside each message,
/// and that only fully removes a message once every recipient in `To` has
/// been consumed -- the fan-out-with-acknowledgement semantics LMTP needs
/// when one message is addressed to several local recipients.
pub struct QueueWithMetadata {
    queue: Queue,
    metadata: MetadataStore,
}

impl QueueWithMetadata {
    pub fn new(queue: Queue) -> Result<Self, QueueError> {
        let metadata = MetadataStore::new(queue.dir())?;
        Ok(QueueWithMetadata { queue, metadata })
    }

    pub fn push(&self, data: &[u8], peer: Option<String>, from: String, to: Vec<String>) -> Result<String, QueueError> {
        let key = self.queue.push(data)?;
        self.metadata.write(&key, &Envelope { peer, from, to })?;
        Ok(key)
    }

    /// Returns the message data and its envelope without consuming a
    /// recipient -- unlike `salmon`'s `QueueWithMetadata.get`, this does
    /// not mutate the sidecar; recipient consumption happens in `remove`,
    /// keeping "read" and "acknowledge one recipient" as separate,
    /// explicit operations.
    pub fn get(&self, key: &str) -> Result<Option<(Vec<u8>, Envelope)>, QueueError> {
        let Some(data) = self.queue.get(key)? else {
            return Ok(None);
        };
        let envelope = self.metadata.read(key)?;
        Ok(Some((data, envelope)))
    }

    pub fn pop(&self) -> Result<Option<(String, Vec<u8>, Envelope)>, QueueError> {
        for key in self.queue.keys()? {
            if self.queue.is_oversize(&key)? {
                continue;
            }
            if let Some((data, envelope)) = self.get(&key)? {
                return Ok(Some((key, data, envelope)));
            }
        }
        Ok(None)
    }

    /// Consume one recipient from the sidecar's `To` list; only unlinks
    /// the underlying message once the list is empty.
    pub fn remove(&self, key: &str, recipient: &str) -> Result<(), QueueError> {
        let mut envelope = self.metadata.read(key)?;
        envelope.to.retain(|r| r != recipient);
        if envelope.to.is_empty() {
            self.queue.remove(key)?;
            self.metadata.remove(key)?;
        } else {
            self.metadata.write(key, &envelope)?;
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        self.queue.len()
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        self.queue.is_empty()
    }

    /// Best-effort: deletes every metadata sidecar, then delegates to the
    /// base queue's `clear`. Not safe under concurrent writers -- see
    /// DESIGN.md's open-question resolution for this operation.
    pub fn clear(&self) -> Result<(), QueueError> {
        self.metadata.clear()?;
        self.queue.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_queue_with_metadata() -> (tempfile::TempDir, QueueWithMetadata) {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::new(dir.path(), false, 0, None).unwrap();
        let qwm = QueueWithMetadata::new(queue).unwrap();
        (dir, qwm)
    }

    #[test]
    fn push_records_envelope_alongside_message() {
        let (_dir, qwm) = temp_queue_with_metadata();
        let key = qwm
            .push(b"body", Some("1.2.3.4".to_owned()), "a@x".to_owned(), vec!["b@y".to_owned(), "c@z".to_owned()])
            .unwrap();
        let (data, envelope) = qwm.get(&key).unwrap().unwrap();
        assert_eq!(data, b"body");
        assert_eq!(envelope.from, "a@x");
        assert_eq!(envelope.to, vec!["b@y", "c@z"]);
    }

    #[test]
    fn remove_only_unlinks_once_every_recipient_is_consumed() {
        let (_dir, qwm) = temp_queue_with_metadata();
        let key = qwm
            .push(b"body", None, "a@x".to_owned(), vec!["b@y".to_owned(), "c@z".to_owned()])
            .unwrap();

        qwm.remove(&key, "b@y").unwrap();
        assert!(qwm.get(&key).unwrap().is_some(), "message should still be on disk");

        qwm.remove(&key, "c@z").unwrap();
        assert!(qwm.get(&key).unwrap().is_none(), "message should be gone after the last recipient");
    }

    #[test]
    fn clear_deletes_messages_and_sidecars() {
        let (_dir, qwm) = temp_queue_with_metadata();
        qwm.push(b"body", None, "a@x".to_owned(), vec!["b@y".to_owned()]).unwrap();
        qwm.clear().unwrap();
        assert!(qwm.is_empty().unwrap());
    }
}
