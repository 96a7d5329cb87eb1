//! RFC 2047 encoded-word decoding and encoding.
//!
//! Grounded on `internals/src/bind/encoded_word/` (encoding side) and
//! `salmon/encoding.py`'s `ENCODING_REGEX`/`ENCODING_END_REGEX` (decoding
//! side), simplified to the string-in/string-out shape this spec needs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::charset;
use crate::error::{EncodingError, EncodingErrorKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Base64,
    QuotedPrintable,
}

impl Encoding {
    fn acronym(self) -> char {
        match self {
            Encoding::Base64 => 'B',
            Encoding::QuotedPrintable => 'Q',
        }
    }

    fn from_acronym(c: char) -> Option<Encoding> {
        match c.to_ascii_uppercase() {
            'B' => Some(Encoding::Base64),
            'Q' => Some(Encoding::QuotedPrintable),
            _ => None,
        }
    }
}

/// One `=?charset?enc?data?=` token found in a header value.
struct Token<'a> {
    charset: &'a str,
    encoding: Encoding,
    data: &'a str,
    /// Byte range in the original string, used to splice the decoded
    /// replacement back in and to detect "only folding whitespace between
    /// two encoded words" per RFC 2047 section 6.2.
    span: (usize, usize),
}

fn find_tokens(input: &str) -> Result<Vec<Token<'_>>, EncodingError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while let Some(start_rel) = input[i..].find("=?") {
        let start = i + start_rel;
        let rest = &input[start + 2..];
        let Some(q1) = rest.find('?') else { break };
        let charset = &rest[..q1];
        let rest2 = &rest[q1 + 1..];
        let mut chars = rest2.chars();
        let enc_char = chars.next().ok_or_else(|| {
            EncodingError::new(EncodingErrorKind::InvalidEncodedWord, "truncated encoded-word")
        })?;
        let encoding = Encoding::from_acronym(enc_char).ok_or_else(|| {
            EncodingError::new(
                EncodingErrorKind::InvalidEncodedWord,
                format!("unknown encoded-word encoding {enc_char:?}"),
            )
        })?;
        let after_enc = &rest2[enc_char.len_utf8()..];
        if !after_enc.starts_with('?') {
            // Not actually an encoded word (e.g. a literal "=?" in free text).
            i = start + 2;
            continue;
        }
        let data_region = &after_enc[1..];
        let Some(end_rel) = data_region.find("?=") else {
            i = start + 2;
            continue;
        };
        let data = &data_region[..end_rel];
        let end = start
            + 2
            + charset.len()
            + 1
            + enc_char.len_utf8()
            + 1
            + end_rel
            + 1
            + 2;
        if end > bytes.len() || !input.is_char_boundary(end) {
            i = start + 2;
            continue;
        }
        tokens.push(Token {
            charset,
            encoding,
            data,
            span: (start, end),
        });
        i = end;
    }
    Ok(tokens)
}

/// Decode every `=?charset?enc?data?=` token in `input`, collapsing folding
/// whitespace that appears *only* between two adjacent encoded words (RFC
/// 2047 section 6.2), and leaving all other text untouched.
pub fn decode_header_value(input: &str) -> Result<String, EncodingError> {
    let tokens = find_tokens(input)?;
    if tokens.is_empty() {
        return Ok(input.to_owned());
    }

    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    let mut prev_was_encoded_word = false;

    for token in &tokens {
        let (start, end) = token.span;
        let between = &input[cursor..start];
        if prev_was_encoded_word && between.chars().all(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n') {
            // swallow pure folding whitespace between two encoded words
        } else {
            out.push_str(between);
        }

        let decoded_bytes = match token.encoding {
            Encoding::Base64 => BASE64.decode(token.data.as_bytes()).map_err(|_| {
                EncodingError::new(EncodingErrorKind::InvalidEncodedWord, "bad base64 payload")
            })?,
            Encoding::QuotedPrintable => {
                let with_spaces = token.data.replace('_', " ");
                quoted_printable::decode(with_spaces.as_bytes(), quoted_printable::ParseMode::Robust)
                    .map_err(|_| {
                        EncodingError::new(
                            EncodingErrorKind::InvalidEncodedWord,
                            "bad quoted-printable payload",
                        )
                    })?
            }
        };
        let decoded_text = charset::decode_with_detection(token.charset, &decoded_bytes)?;
        out.push_str(&decoded_text);

        cursor = end;
        prev_was_encoded_word = true;
    }
    out.push_str(&input[cursor..]);
    Ok(out)
}

/// Maximum payload octets per encoded word before RFC 2047's 75-char line
/// limit is hit; conservative since it doesn't need to be exact for this
/// spec's purposes (recipients reassemble however many words we emit).
const MAX_ENCODED_WORD_PAYLOAD: usize = 45;

/// Encode `text` as one or more RFC 2047 encoded words, space-separated, in
/// the given charset/encoding.
pub fn encode_word(charset: &str, encoding: Encoding, text: &str) -> String {
    match encoding {
        Encoding::Base64 => encode_word_base64(charset, text),
        Encoding::QuotedPrintable => encode_word_quoted_printable(charset, text),
    }
}

fn encode_word_base64(charset: &str, text: &str) -> String {
    let mut out = String::new();
    let bytes = text.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let mut end = (start + MAX_ENCODED_WORD_PAYLOAD).min(bytes.len());
        while end < bytes.len() && !text.is_char_boundary(end) {
            end -= 1;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str("=?");
        out.push_str(charset);
        out.push('?');
        out.push(Encoding::Base64.acronym());
        out.push('?');
        out.push_str(&BASE64.encode(&bytes[start..end]));
        out.push_str("?=");
        start = end;
    }
    if out.is_empty() {
        out.push_str(&format!("=?{charset}?B??="));
    }
    out
}

fn encode_word_quoted_printable(charset: &str, text: &str) -> String {
    let mut out = String::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        let mut encoded_char = String::new();
        for byte in ch.to_string().as_bytes() {
            if byte.is_ascii_alphanumeric() {
                encoded_char.push(*byte as char);
            } else if *byte == b' ' {
                encoded_char.push('_');
            } else {
                encoded_char.push_str(&format!("={byte:02X}"));
            }
        }
        if chunk.len() + encoded_char.len() > MAX_ENCODED_WORD_PAYLOAD {
            push_qp_word(&mut out, charset, &chunk);
            chunk.clear();
        }
        chunk.push_str(&encoded_char);
    }
    if !chunk.is_empty() || out.is_empty() {
        push_qp_word(&mut out, charset, &chunk);
    }
    out
}

fn push_qp_word(out: &mut String, charset: &str, chunk: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str("=?");
    out.push_str(charset);
    out.push('?');
    out.push(Encoding::QuotedPrintable.acronym());
    out.push('?');
    out.push_str(chunk);
    out.push_str("?=");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_encoded_word() {
        // "Łukasz" in UTF-8, base64-encoded.
        let raw = "=?utf-8?b?xYF1a2Fzeg==?=";
        assert_eq!(decode_header_value(raw).unwrap(), "Łukasz");
    }

    #[test]
    fn decodes_quoted_printable_encoded_word() {
        let raw = "=?utf-8?q?Hello=2C_World!?=";
        assert_eq!(decode_header_value(raw).unwrap(), "Hello, World!");
    }

    #[test]
    fn collapses_whitespace_only_between_adjacent_encoded_words() {
        let raw = "=?utf-8?q?Hello?=  =?utf-8?q?World?=";
        assert_eq!(decode_header_value(raw).unwrap(), "HelloWorld");
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(decode_header_value("just ascii text").unwrap(), "just ascii text");
    }

    #[test]
    fn round_trips_through_base64_encoding() {
        let encoded = encode_word("utf-8", Encoding::Base64, "Łukasz");
        assert_eq!(decode_header_value(&encoded).unwrap(), "Łukasz");
    }

    #[test]
    fn round_trips_through_quoted_printable_encoding() {
        let encoded = encode_word("utf-8", Encoding::QuotedPrintable, "Hello, World!");
        assert_eq!(decode_header_value(&encoded).unwrap(), "Hello, World!");
    }
}
