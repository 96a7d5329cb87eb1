//! Maildir-format on-disk queue: oversize admission, a safe hostname-
//! hashing variant, and an envelope-metadata variant with fan-out-aware
//! removal for LMTP multi-recipient delivery.

pub mod error;
pub mod maildir;
pub mod metadata;

pub use error::QueueError;
pub use maildir::Queue;
pub use metadata::{Envelope, QueueWithMetadata};
