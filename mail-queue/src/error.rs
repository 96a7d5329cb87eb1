use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error on queue at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Mirrors `mailbox.ExternalClashError`: the generated tmp-file name
    /// already exists (another process raced us, or the clock went
    /// backwards).
    #[error("name clash prevented file creation: {0}")]
    ExternalClash(String),

    #[error("message at key {0} exceeds the pop size limit")]
    Oversize(String),

    #[error("metadata for key {0} is missing or corrupt: {1}")]
    Metadata(String, String),

    #[error("timed out acquiring the metadata lock for key {0} after {1} attempts")]
    LockTimeout(String, u32),
}
