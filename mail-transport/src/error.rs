use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("I/O error on receiver bound at {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection closed before the command was complete")]
    ConnectionClosed,

    #[error("malformed {command} command: {line:?}")]
    MalformedCommand { command: &'static str, line: String },

    #[error("queue error: {0}")]
    Queue(#[from] mail_queue::QueueError),

    #[error("mail parse error: {0}")]
    Mail(#[from] mail_core::MailError),
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay options ssl, starttls and lmtp are mutually exclusive")]
    ConflictingOptions,

    #[error("no destination host configured and MX/A/AAAA lookup for {domain:?} failed: {source}")]
    Resolution {
        domain: String,
        #[source]
        source: hickory_resolver::error::ResolveError,
    },

    #[error("I/O error talking to {host}: {source}")]
    Io {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error talking to {host}: {detail}")]
    Tls { host: String, detail: String },

    #[error("{host} rejected the transaction: {code} {message}")]
    Rejected { host: String, code: u16, message: String },

    #[error("message has no recipients")]
    NoRecipients,
}
