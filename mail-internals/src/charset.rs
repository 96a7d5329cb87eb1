//! Decoding bytes under a named charset, with a statistical detection
//! fallback used when the declared charset turns out to be a lie.
//!
//! Salmon's rule (see `salmon/encoding.py`): try the declared codec, and if
//! it "lies" (the bytes don't actually decode under it), fall back to
//! detection; if detection also can't make sense of the bytes, the message
//! is bad (`encoding.py:27`'s incoming rule 7). Charset decoding itself goes
//! through `encoding_rs` (the WHATWG Encoding Standard implementation also
//! used by `stalwartlabs-mail-parser`, `deuxfleurs-org-eml-codec`, and
//! `epilys-crymap`), so every label it recognizes -- not just the half dozen
//! we'd want to hand-maintain -- decodes correctly. Detection is
//! `chardetng`, `encoding_rs`'s own statistical-detection sibling crate.

use encoding_rs::Encoding;

use crate::error::{EncodingError, EncodingErrorKind};

pub const UTF_8: &str = "utf-8";
pub const US_ASCII: &str = "us-ascii";

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Decode `bytes` under the named charset. Unknown charset names are not an
/// error here (the caller decides whether to fall back to detection); they
/// simply fail to decode.
///
/// `us-ascii` is handled ahead of `encoding_rs` rather than through it: the
/// WHATWG standard maps the `ascii`/`us-ascii` labels onto windows-1252 for
/// web-compatibility reasons that don't apply to mail, and doing so would
/// silently accept high-bit bytes a strict 7-bit decoder must reject.
pub fn decode(charset: &str, bytes: &[u8]) -> Result<String, EncodingErrorKind> {
    let normalized = normalize(charset);
    if matches!(normalized.as_str(), "us-ascii" | "ascii" | "7bit") {
        return if bytes.iter().all(u8::is_ascii) {
            Ok(bytes.iter().map(|&b| b as char).collect())
        } else {
            Err(EncodingErrorKind::DecodeFailed)
        };
    }

    let encoding = Encoding::for_label(normalized.as_bytes()).ok_or(EncodingErrorKind::UnknownCharset)?;
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or(EncodingErrorKind::DecodeFailed)
}

/// Decode bytes, falling back to statistical detection when the declared
/// charset either isn't known or doesn't actually fit the bytes.
pub fn decode_with_detection(charset: &str, bytes: &[u8]) -> Result<String, EncodingError> {
    match decode(charset, bytes) {
        Ok(text) => Ok(text),
        Err(_) => detect_and_decode(bytes).ok_or_else(|| {
            EncodingError::new(
                EncodingErrorKind::DecodeFailed,
                format!("declared charset {charset:?} did not decode and detection failed"),
            )
        }),
    }
}

/// Guesses the charset statistically and decodes strictly under that guess.
/// `chardetng` always returns *some* guess, but the guess can still be wrong
/// -- if the bytes don't actually fit the encoding it picked (most often
/// because they're truncated or outright binary, not text mislabeled as
/// text), this returns `None` and the caller treats the message as bad.
fn detect_and_decode(bytes: &[u8]) -> Option<String> {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let guess = detector.guess(None, true);
    guess.decode_without_bom_handling_and_without_replacement(bytes).map(|text| text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ascii() {
        assert_eq!(decode("us-ascii", b"hello").unwrap(), "hello");
    }

    #[test]
    fn ascii_rejects_high_bit_bytes() {
        assert_eq!(decode("us-ascii", &[b'h', b'i', 0x80]), Err(EncodingErrorKind::DecodeFailed));
    }

    #[test]
    fn decodes_utf8() {
        assert_eq!(decode("UTF-8", "Łukasz".as_bytes()).unwrap(), "Łukasz");
    }

    #[test]
    fn unknown_charset_is_unknown_not_decode_failure() {
        assert_eq!(decode("x-made-up", b"abc"), Err(EncodingErrorKind::UnknownCharset));
    }

    #[test]
    fn previously_unsupported_single_byte_charsets_now_decode() {
        // iso-8859-2 and koi8-r used to fall through to `UnknownCharset`
        // unconditionally; encoding_rs knows both.
        assert!(decode("iso-8859-2", &[b'h', b'i', 0xB1]).is_ok());
        assert!(decode("koi8-r", &[b'h', b'i', 0xC1]).is_ok());
    }

    #[test]
    fn previously_unsupported_multi_byte_charsets_now_decode_ascii_content() {
        for charset in ["shift_jis", "big5", "gb2312", "euc-kr"] {
            assert_eq!(decode(charset, b"hello").unwrap(), "hello", "{charset} should decode plain ASCII unchanged");
        }
    }

    #[test]
    fn multi_byte_charset_rejects_an_invalid_trail_byte() {
        // 0x81 is a Shift_JIS lead byte; 0x00 is not a valid trail byte for it.
        assert_eq!(decode("shift_jis", &[0x81, 0x00]), Err(EncodingErrorKind::DecodeFailed));
    }

    #[test]
    fn falls_back_to_detection_when_declared_charset_is_a_lie() {
        // Smart quotes from a western single-byte charset are not valid UTF-8
        // continuation bytes, so the declared "utf-8" lies and detection
        // kicks in. ASCII content survives identically under any western
        // single-byte guess, so assert on that rather than the exact
        // codepoints chardetng lands on.
        let bytes = [0x93u8, b'h', b'i', 0x94];
        let text = decode_with_detection("utf-8", &bytes).unwrap();
        assert!(text.contains("hi"));
    }
}
