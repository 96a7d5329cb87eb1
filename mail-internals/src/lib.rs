//! Low level encoding primitives shared by the `mail-*` crates: base64 and
//! quoted-printable body codecs, RFC 2047 encoded-word handling, and charset
//! decoding with a statistical fallback chain.
//!
//! Nothing in this crate knows about headers, MIME trees, or SMTP -- those
//! live in `mail-headers` and `mail-core`. This crate only knows how to turn
//! bytes into text and back.

pub mod body_codec;
pub mod charset;
pub mod encoded_word;
pub mod error;

pub use error::{EncodingError, EncodingErrorKind};
