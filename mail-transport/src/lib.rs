//! Receivers (SMTP, LMTP, queue) and the outbound relay that sit on top of
//! `mail-router`'s dispatch engine.

pub mod config;
pub mod error;
pub mod lmtp_receiver;
pub mod queue_receiver;
pub mod receiver;
pub mod relay;
pub mod smtp_receiver;

pub use config::{BindAddress, LmtpReceiverConfig, QueueConfig, ReceiverConfig, RelayConfig, RelaySecurity, RouterConfig};
pub use error::{ReceiverError, RelayError};
pub use lmtp_receiver::{BoundLmtpReceiver, LmtpReceiver};
pub use queue_receiver::QueueReceiver;
pub use receiver::{Connection, Listener};
pub use relay::Relay;
pub use smtp_receiver::{BoundSmtpReceiver, SmtpReceiver};
