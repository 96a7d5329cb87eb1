use thiserror::Error;

/// Errors raised while reading or writing header values, as opposed to
/// `mail_internals::EncodingError` which covers charset/encoded-word
/// failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("{0} is not a content-encoding header (must be one of Content-Type, Content-Transfer-Encoding, Content-Disposition, Mime-Version)")]
    NotAContentEncodingHeader(String),

    #[error("malformed content-encoding header value: {0}")]
    MalformedValue(String),
}
