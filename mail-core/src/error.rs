use thiserror::Error;

pub use mail_internals::EncodingError;

/// The top-level error for anything that can go wrong turning bytes into a
/// `MailBase` or back, layering `mail-headers`/`mail-internals` errors
/// together with the handful of structural failures unique to the MIME
/// tree (unterminated parts, a multipart body with no boundary, etc).
#[derive(Debug, Error)]
pub enum MailError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Header(#[from] mail_headers::HeaderError),

    #[error("malformed message: {0}")]
    Malformed(String),
}
