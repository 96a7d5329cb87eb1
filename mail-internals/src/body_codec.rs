//! Whole-body `Content-Transfer-Encoding` codecs, as opposed to the
//! header-value encoded-word codec in `encoded_word`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::{EncodingError, EncodingErrorKind};

const BASE64_LINE_LEN: usize = 76;

/// Encode a binary body as base64, wrapped at the conventional 76-column
/// line length mail clients expect.
pub fn encode_base64_body(data: &[u8]) -> String {
    let raw = BASE64.encode(data);
    let mut out = String::with_capacity(raw.len() + raw.len() / BASE64_LINE_LEN * 2);
    for chunk in raw.as_bytes().chunks(BASE64_LINE_LEN) {
        if !out.is_empty() {
            out.push_str("\r\n");
        }
        out.push_str(std::str::from_utf8(chunk).expect("base64 alphabet is ascii"));
    }
    out
}

pub fn decode_base64_body(data: &str) -> Result<Vec<u8>, EncodingError> {
    let stripped: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(stripped.as_bytes())
        .map_err(|e| EncodingError::new(EncodingErrorKind::DecodeFailed, e.to_string()))
}

/// Encode a body as quoted-printable. Used for text bodies/attachments that
/// fail plain ASCII but the caller wants byte-stable, soft-line-wrapped
/// encoding for rather than base64.
pub fn encode_quoted_printable_body(data: &[u8]) -> String {
    let encoded = quoted_printable::encode(data);
    String::from_utf8(encoded).expect("quoted-printable output is always ascii")
}

pub fn decode_quoted_printable_body(data: &[u8]) -> Result<Vec<u8>, EncodingError> {
    quoted_printable::decode(data, quoted_printable::ParseMode::Robust)
        .map_err(|e| EncodingError::new(EncodingErrorKind::DecodeFailed, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_body_round_trips() {
        let data = b"the quick brown fox jumps over the lazy dog, many times over to pad this out";
        let encoded = encode_base64_body(data);
        assert_eq!(decode_base64_body(&encoded).unwrap(), data);
    }

    #[test]
    fn quoted_printable_body_round_trips() {
        let data = "héllo wörld".as_bytes();
        let encoded = encode_quoted_printable_body(data);
        assert_eq!(decode_quoted_printable_body(encoded.as_bytes()).unwrap(), data);
    }
}
