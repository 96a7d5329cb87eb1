//! The error type produced by every decode/encode primitive in this crate.

use thiserror::Error;

/// The fixed set of ways a message can fail to become canonical text,
/// or fail to be re-encoded on the way back out.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EncodingErrorKind {
    /// A `charset=` parameter named something we don't have a decoder for.
    UnknownCharset,
    /// The declared (or detected) charset was applied but the bytes still
    /// didn't decode.
    DecodeFailed,
    /// A `Content-Type` header value didn't parse as `type/subtype; params`.
    MalformedContentType,
    /// A `=?charset?enc?data?=` token didn't follow RFC 2047.
    InvalidEncodedWord,
}

impl EncodingErrorKind {
    fn as_str(self) -> &'static str {
        use EncodingErrorKind::*;
        match self {
            UnknownCharset => "unknown charset",
            DecodeFailed => "decode failed",
            MalformedContentType => "malformed content-type",
            InvalidEncodedWord => "invalid encoded-word",
        }
    }
}

/// Raised whenever a message cannot be brought into (or out of) canonical
/// form. Fatal for the message carrying it: an `EncodingError` means the
/// message never enters the routing path (see `mail-core::parse`).
#[derive(Debug, Error)]
#[error("{kind}: {detail}", kind = .kind.as_str())]
pub struct EncodingError {
    kind: EncodingErrorKind,
    detail: String,
}

impl EncodingError {
    pub fn new(kind: EncodingErrorKind, detail: impl Into<String>) -> Self {
        EncodingError {
            kind,
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> EncodingErrorKind {
        self.kind
    }
}
