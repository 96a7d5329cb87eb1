//! Inbound parsing: raw RFC 5322/MIME bytes to a `MailBase` tree.
//!
//! Grounded on `salmon/encoding.py`'s `from_message` / `MIMEPart.from_message`
//! and `internals/src/bind/` for the low-level tokenizing approach (unfold
//! first, then split headers from body, then recurse into multipart parts).

use mail_headers::HeaderMap;
use mail_internals::{charset, encoded_word};

use crate::error::MailError;
use crate::mail_base::{Body, MailBase};

/// Parse a complete message (or a single MIME part's headers+body) into a
/// `MailBase` tree. `bytes` is taken as the raw, not-yet-unfolded octets as
/// they arrived over the wire.
pub fn parse(bytes: &[u8]) -> Result<MailBase, MailError> {
    let raw = lossy_ascii_or_utf8(bytes);
    parse_str(&raw)
}

fn lossy_ascii_or_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => charset::decode_with_detection("utf-8", bytes)
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned()),
    }
}

fn parse_str(raw: &str) -> Result<MailBase, MailError> {
    let (header_block, body_raw) = split_head_body(raw);
    let headers = parse_header_block(header_block)?;

    let mut mail = MailBase::new();
    *mail.headers_mut() = headers;

    let content_type = mail.content_encoding("Content-Type")?;

    if let Some(ct) = &content_type {
        if ct.value.starts_with("multipart/") {
            // `content_encoding::get` strips `boundary` (it's a write-side
            // serialization artifact per invariant (d)), so the splitter
            // needs it straight from the not-yet-stripped raw header value.
            let raw_content_type = mail.headers().get_first("Content-Type").unwrap_or_default();
            let boundary = extract_boundary(raw_content_type).ok_or_else(|| {
                MailError::Malformed("multipart Content-Type is missing a boundary parameter".to_owned())
            })?;
            for part_raw in split_multipart_body(body_raw, &boundary) {
                mail.push_part(parse_str(part_raw)?);
            }
            return Ok(mail);
        }
    }

    if !body_raw.is_empty() {
        mail.set_body(decode_body(&mail, body_raw)?);
    } else {
        mail.set_body(Body::Text(String::new()));
    }
    Ok(mail)
}

/// Split `raw` into its header block and body at the first blank line,
/// accepting both CRLF and bare-LF line endings.
fn split_head_body(raw: &str) -> (&str, &str) {
    if let Some(pos) = raw.find("\r\n\r\n") {
        return (&raw[..pos], &raw[pos + 4..]);
    }
    if let Some(pos) = raw.find("\n\n") {
        return (&raw[..pos], &raw[pos + 2..]);
    }
    (raw, "")
}

/// Unfold continuation lines (RFC 5322 §2.2.3: a line starting with SP or
/// TAB is a continuation of the previous header), split `Name: value`
/// pairs, and RFC 2047-decode each value.
fn parse_header_block(block: &str) -> Result<HeaderMap, MailError> {
    let mut headers = HeaderMap::new();
    let mut current: Option<(String, String)> = None;

    for line in block.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            headers.append(name, encoded_word::decode_header_value(&value)?);
        }
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        current = Some((name.trim().to_owned(), value.trim().to_owned()));
    }
    if let Some((name, value)) = current {
        headers.append(name, encoded_word::decode_header_value(&value)?);
    }
    Ok(headers)
}

/// Split a multipart body on `--boundary` delimiter lines, dropping the
/// preamble before the first delimiter and the epilogue after the closing
/// `--boundary--`.
fn split_multipart_body<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut rest = body;

    let Some(first) = rest.find(&delimiter) else {
        return parts;
    };
    rest = &rest[first + delimiter.len()..];

    loop {
        let Some(next) = rest.find(&delimiter) else {
            break;
        };
        let segment = &rest[..next];
        let trimmed = trim_leading_newline(segment);
        if !trimmed.trim().is_empty() {
            parts.push(trimmed);
        }
        rest = &rest[next + delimiter.len()..];
        if rest.starts_with("--") {
            break;
        }
    }
    parts
}

/// Pull the `boundary=` parameter out of a raw `Content-Type` header value,
/// tolerating both quoted and bare forms.
fn extract_boundary(raw_content_type: &str) -> Option<String> {
    for segment in raw_content_type.split(';').skip(1) {
        let Some((key, value)) = segment.trim().split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("boundary") {
            return Some(value.trim().trim_matches('"').to_owned());
        }
    }
    None
}

fn trim_leading_newline(s: &str) -> &str {
    s.strip_prefix("\r\n").or_else(|| s.strip_prefix('\n')).unwrap_or(s)
}

fn decode_body(mail: &MailBase, raw: &str) -> Result<Body, MailError> {
    let cte = mail.content_encoding("Content-Transfer-Encoding")?;
    let encoding = cte.as_ref().map(|v| v.value.as_str()).unwrap_or("7bit");

    let decoded_bytes: Vec<u8> = match encoding {
        "base64" => mail_internals::body_codec::decode_base64_body(raw)?,
        "quoted-printable" => mail_internals::body_codec::decode_quoted_printable_body(raw.as_bytes())?,
        _ => raw.as_bytes().to_vec(),
    };

    let content_type = mail.content_encoding("Content-Type")?;
    let is_text = content_type
        .as_ref()
        .map(|ct| ct.value.starts_with("text/") || ct.value == "message/rfc822")
        .unwrap_or(true);

    if is_text {
        let charset_name = content_type
            .as_ref()
            .and_then(|ct| ct.param("charset"))
            .unwrap_or("us-ascii");
        let text = charset::decode_with_detection(charset_name, &decoded_bytes)?;
        Ok(Body::Text(text))
    } else {
        Ok(Body::Bytes(decoded_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_text_message() {
        let raw = b"From: a@x\r\nTo: b@y\r\nSubject: hi\r\n\r\nhello world";
        let mail = parse(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("hi"));
        assert_eq!(mail.body().unwrap().as_text(), Some("hello world"));
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = b"Subject: hello\r\n world\r\n\r\nbody";
        let mail = parse(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("hello world"));
    }

    #[test]
    fn decodes_rfc2047_subject() {
        let raw = "Subject: =?utf-8?q?Hello=2C_World!?=\r\n\r\nbody".as_bytes();
        let mail = parse(raw).unwrap();
        assert_eq!(mail.header("Subject"), Some("Hello, World!"));
    }

    #[test]
    fn parses_multipart_into_child_parts() {
        let raw = "Content-Type: multipart/mixed; boundary=XYZ\r\n\r\n\
            --XYZ\r\nContent-Type: text/plain\r\n\r\npart one\r\n\
            --XYZ\r\nContent-Type: text/plain\r\n\r\npart two\r\n\
            --XYZ--\r\n"
            .as_bytes();
        let mail = parse(raw).unwrap();
        assert_eq!(mail.parts().len(), 2);
        assert_eq!(mail.parts()[0].body().unwrap().as_text(), Some("part one"));
        assert_eq!(mail.parts()[1].body().unwrap().as_text(), Some("part two"));
    }

    #[test]
    fn decodes_base64_body() {
        let raw = "Content-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\naGVsbG8=\r\n"
            .as_bytes();
        let mail = parse(raw).unwrap();
        assert_eq!(mail.body().unwrap().as_text(), Some("hello"));
    }

    #[test]
    fn missing_boundary_on_multipart_is_malformed() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        assert!(matches!(parse(raw), Err(MailError::Malformed(_))));
    }
}
