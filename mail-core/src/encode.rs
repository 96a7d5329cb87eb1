//! Outbound canonicalization: a `MailBase` tree to wire-ready bytes.
//!
//! Grounded on `salmon/encoding.py`'s `MailBase.to_message` /
//! `MIMEPart.to_message`: ASCII-clean headers and bodies pass through
//! untouched, anything else gets RFC 2047 words (headers) or a
//! Content-Transfer-Encoding (bodies), and `Content-Type`/`boundary` are
//! always recomputed rather than trusted from the tree. Outgoing rule 3: a
//! node with parts defaults to `multipart/mixed`, a node without one
//! defaults to `text/plain` -- a tree is never serialized with a part
//! missing `Content-Type` entirely.

use mail_headers::address;
use mail_headers::content_encoding::{self, ParameterizedValue};

use crate::error::MailError;
use crate::mail_base::{Body, MailBase};
use crate::mime::create_structured_random_boundary;

const DEFAULT_CHARSET: &str = "utf-8";

/// Serialize a `MailBase` tree to wire bytes (CRLF line endings), enforcing
/// invariant (a): a node with children always serializes with a
/// `multipart/`-or-`message/`-prefixed `Content-Type`.
pub fn serialize(mail: &MailBase) -> Result<Vec<u8>, MailError> {
    let mut out = String::new();
    write_entity(mail, &mut out, 0)?;
    Ok(out.into_bytes())
}

fn write_entity(mail: &MailBase, out: &mut String, boundary_seed: usize) -> Result<usize, MailError> {
    let mut headers = mail.headers().clone();
    let mut next_seed = boundary_seed;

    let boundary = if mail.is_multipart() {
        let ct = content_encoding::get(&headers, "Content-Type")?.unwrap_or_else(|| ParameterizedValue::new("multipart/mixed"));
        let value = if ct.value.starts_with("multipart/") || ct.value.starts_with("message/") {
            ct.value.clone()
        } else {
            "multipart/mixed".to_owned()
        };
        next_seed += 1;
        let boundary = create_structured_random_boundary(next_seed);
        let new_ct = ParameterizedValue {
            value,
            params: ct.params.clone(),
        }
        .with_param("boundary", boundary.clone());
        content_encoding::set(&mut headers, "Content-Type", &new_ct)?;
        Some(boundary)
    } else {
        if content_encoding::get(&headers, "Content-Type")?.is_none() {
            content_encoding::set(&mut headers, "Content-Type", &ParameterizedValue::new("text/plain"))?;
        }
        None
    };

    let encoded_body = match (&boundary, mail.body()) {
        (None, Some(body)) => Some(encode_body(&mut headers, body)?),
        _ => None,
    };

    write_headers(&headers, out)?;
    out.push_str("\r\n");

    if let Some(boundary) = boundary {
        for part in mail.parts() {
            out.push_str("--");
            out.push_str(&boundary);
            out.push_str("\r\n");
            next_seed = write_entity(part, out, next_seed)?;
        }
        out.push_str("--");
        out.push_str(&boundary);
        out.push_str("--\r\n");
    } else if let Some(body_text) = encoded_body {
        out.push_str(&body_text);
        out.push_str("\r\n");
    }

    Ok(next_seed)
}

fn write_headers(headers: &mail_headers::HeaderMap, out: &mut String) -> Result<(), MailError> {
    for (name, value) in headers.iter() {
        let encoded = if address::is_address_header(name) {
            encode_address_header(value)
        } else if value.is_ascii() {
            value.to_owned()
        } else {
            mail_internals::encoded_word::encode_word(DEFAULT_CHARSET, mail_internals::encoded_word::Encoding::QuotedPrintable, value)
        };
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&encoded);
        out.push_str("\r\n");
    }
    Ok(())
}

/// Only the display name of an address header is a candidate for RFC 2047
/// encoding; the addr-spec itself must stay ASCII-literal.
fn encode_address_header(value: &str) -> String {
    let mailboxes = address::parse_mailbox_list(value);
    let encoded: Vec<address::Mailbox> = mailboxes
        .into_iter()
        .map(|m| address::Mailbox {
            display_name: m.display_name.map(|name| {
                if name.is_ascii() {
                    name
                } else {
                    mail_internals::encoded_word::encode_word(
                        DEFAULT_CHARSET,
                        mail_internals::encoded_word::Encoding::QuotedPrintable,
                        &name,
                    )
                }
            }),
            addr_spec: m.addr_spec,
        })
        .collect();
    address::serialize_mailbox_list(&encoded)
}

/// Pick a transfer encoding for `body`, stamp `Content-Transfer-Encoding`
/// onto `headers` to match, and return the encoded body text -- outgoing
/// rules 2 and 4 of the base spec.
fn encode_body(headers: &mut mail_headers::HeaderMap, body: &Body) -> Result<String, MailError> {
    match body {
        Body::Text(text) => {
            if text.is_ascii() {
                headers.remove_all("Content-Transfer-Encoding");
                Ok(text.clone())
            } else {
                content_encoding::set(headers, "Content-Transfer-Encoding", &ParameterizedValue::new("quoted-printable"))?;
                Ok(mail_internals::body_codec::encode_quoted_printable_body(text.as_bytes()))
            }
        }
        Body::Bytes(bytes) => {
            let existing = content_encoding::get(headers, "Content-Transfer-Encoding")?;
            let wants_qp = existing.as_ref().map(|v| v.value == "quoted-printable").unwrap_or(false);
            if wants_qp {
                Ok(mail_internals::body_codec::encode_quoted_printable_body(bytes))
            } else {
                content_encoding::set(headers, "Content-Transfer-Encoding", &ParameterizedValue::new("base64"))?;
                Ok(mail_internals::body_codec::encode_base64_body(bytes))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn ascii_message_round_trips_unchanged_in_substance() {
        let mut mail = MailBase::new();
        mail.append_header("Subject", "hello");
        mail.append_header("From", "a@x");
        mail.set_body(Body::Text("plain ascii body".to_owned()));

        let bytes = serialize(&mail).unwrap();
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed.header("Subject"), Some("hello"));
        assert_eq!(reparsed.body().unwrap().as_text(), Some("plain ascii body"));
    }

    #[test]
    fn non_ascii_header_gets_encoded_word() {
        let mut mail = MailBase::new();
        mail.append_header("Subject", "héllo");
        mail.set_body(Body::Text(String::new()));
        let bytes = serialize(&mail).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("=?utf-8?Q?"));
    }

    #[test]
    fn bodyless_single_part_without_content_type_defaults_to_text_plain() {
        let mut mail = MailBase::new();
        mail.append_header("Subject", "hello");
        mail.set_body(Body::Text("plain ascii body".to_owned()));

        let bytes = serialize(&mail).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Type: text/plain"));
    }

    #[test]
    fn multipart_tree_gets_boundary_and_terminator() {
        let mut root = MailBase::new();
        root.append_header("Content-Type", "multipart/mixed");
        let mut part = MailBase::new();
        part.append_header("Content-Type", "text/plain");
        part.set_body(Body::Text("a part".to_owned()));
        root.push_part(part);

        let bytes = serialize(&root).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("boundary="));
        assert!(text.trim_end().ends_with("--\r\n") || text.contains("--\r\n--"));

        let reparsed = parse(text.as_bytes()).unwrap();
        assert_eq!(reparsed.parts().len(), 1);
    }
}
