use thiserror::Error;

/// A handler-initiated protocol response -- the thing a synchronous
/// receiver turns directly into an SMTP wire reply.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code} {message}")]
pub struct SmtpError {
    pub code: u16,
    pub message: String,
}

impl SmtpError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        SmtpError {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Smtp(#[from] SmtpError),

    #[error("state storage error: {0}")]
    Storage(String),

    #[error("undeliverable queue error: {0}")]
    Queue(#[from] mail_queue::QueueError),

    #[error("internal router error: {0}")]
    Internal(String),
}
