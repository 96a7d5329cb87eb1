//! Facade re-exporting the crates that make up this mail stack:
//!
//! - `mail-internals` -- base64/quoted-printable/RFC 2047 codecs and charset
//!   decoding. Used internally by the crates below; not re-exported on its
//!   own, only its error type is.
//! - `mail-headers` -- the ordered, case-insensitive `HeaderMap` and
//!   content-encoding / address parsing built on top of it.
//! - `mail-core` -- the `MailBase` MIME tree, inbound parsing and outbound
//!   encoding, `MailRequest`/`MailResponse`, and bounce classification.
//! - `mail-queue` -- the Maildir-format on-disk queue, with and without
//!   envelope metadata.
//! - `mail-router` -- pattern-and-state dispatch: `Router`, `Route`,
//!   per-sender FSM state, and the `BounceRoute` diversion combinator.
//! - `mail-transport` (feature `transport`) -- SMTP/LMTP receivers, the
//!   queue receiver, and the outbound relay.
//!
//! ## Examples
//!
//! - [`mail_by_hand`](../examples/mail_by_hand.rs) builds and encodes a
//!   message without a router or receiver in the loop.
//! - [`subscribe_router`](../examples/subscribe_router.rs) registers a
//!   small subscribe/confirm/unsubscribe state machine on a `Router`.
//! - [`send_mail`](../examples/send_mail.rs) (feature `transport`) relays
//!   a message to a configured host.
//!
//! ## Configuration
//!
//! [`Settings`] loads the layered config structs from `mail-transport` out
//! of a single TOML document, the shape a CLI front-end would read off
//! disk; nothing in this crate reads environment variables or file paths
//! on its own.

pub use mail_core::{encode, mime, parse};
pub use mail_core::{Body, BounceAnalysis, MailBase, MailError, MailRequest, MailResponse, TemplateRenderer};
pub use mail_headers::{HeaderError, HeaderMap};
pub use mail_queue::{Envelope, Queue, QueueError, QueueWithMetadata};
pub use mail_router::{BounceRoute, HandlerFn, HandlerId, MemoryStorage, PersistentStorage, ReloadHook, Route, Router, RouterError, SmtpError, StateKeyFn, StateStorage, Transition};
pub use mail_router::{ERROR_STATE, ROUTE_FIRST_STATE, START};

#[cfg(feature = "transport")]
pub use mail_transport::{
    BindAddress, BoundLmtpReceiver, BoundSmtpReceiver, Connection, LmtpReceiver, LmtpReceiverConfig, Listener, QueueConfig, QueueReceiver, ReceiverConfig, ReceiverError, Relay, RelayConfig, RelayError, RelaySecurity, RouterConfig, SmtpReceiver,
};

/// Every error type surfaced anywhere in this stack, gathered in one place
/// for a front-end that wants a single `use mail::error::*`.
pub mod error {
    pub use mail_core::MailError;
    pub use mail_headers::HeaderError;
    pub use mail_internals::EncodingError;
    pub use mail_queue::QueueError;
    pub use mail_router::{RouterError, SmtpError};

    #[cfg(feature = "transport")]
    pub use mail_transport::{ReceiverError, RelayError};
}

#[cfg(feature = "transport")]
pub mod settings;
#[cfg(feature = "transport")]
pub use settings::Settings;

/// Names exported together for `use mail::prelude::*`.
pub mod prelude {
    pub use crate::{Body, MailBase, MailRequest, MailResponse};
    pub use crate::{HandlerId, Route, Router, Transition};
    pub use crate::{Queue, QueueWithMetadata};

    #[cfg(feature = "transport")]
    pub use crate::{LmtpReceiver, QueueReceiver, Relay, SmtpReceiver};
}
