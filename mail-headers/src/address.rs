//! Minimal `display-name <addr-spec>` parsing for the address headers
//! (`From`, `To`, `Cc`, `Bcc`, `Delivered-To`), used on the outgoing side to
//! encode only the display name as an RFC 2047 word while leaving the
//! address literal untouched (§4.1 outgoing rule 1 of the base spec).

pub const ADDRESS_HEADERS: [&str; 5] = ["From", "To", "Cc", "Bcc", "Delivered-To"];

pub fn is_address_header(name: &str) -> bool {
    ADDRESS_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub display_name: Option<String>,
    pub addr_spec: String,
}

/// Parse a comma-separated mailbox list. This is intentionally forgiving --
/// it does not reject malformed input, it just does its best, since a
/// parse failure here would make a header impossible to canonicalize at
/// all and the base spec doesn't call for that.
pub fn parse_mailbox_list(raw: &str) -> Vec<Mailbox> {
    split_top_level_commas(raw)
        .into_iter()
        .map(|part| parse_mailbox(part.trim()))
        .filter(|m| !m.addr_spec.is_empty() || m.display_name.is_some())
        .collect()
}

fn parse_mailbox(raw: &str) -> Mailbox {
    if let Some(open) = raw.find('<') {
        if let Some(close) = raw[open..].find('>') {
            let display = raw[..open].trim().trim_matches('"').trim();
            let addr = raw[open + 1..open + close].trim();
            return Mailbox {
                display_name: if display.is_empty() { None } else { Some(display.to_owned()) },
                addr_spec: addr.to_owned(),
            };
        }
    }
    Mailbox {
        display_name: None,
        addr_spec: raw.to_owned(),
    }
}

fn split_top_level_commas(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth <= 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Re-serialize a mailbox list, joining with `", "`.
pub fn serialize_mailbox_list(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(|m| match &m.display_name {
            Some(name) => format!("{name} <{}>", m.addr_spec),
            None => m.addr_spec.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_display_name_and_addr_spec() {
        let mailboxes = parse_mailbox_list("\"Łukasz\" <lukasz@example.com>");
        assert_eq!(mailboxes.len(), 1);
        assert_eq!(mailboxes[0].display_name.as_deref(), Some("Łukasz"));
        assert_eq!(mailboxes[0].addr_spec, "lukasz@example.com");
    }

    #[test]
    fn parses_bare_address_without_display_name() {
        let mailboxes = parse_mailbox_list("zed@localhost");
        assert_eq!(mailboxes[0].display_name, None);
        assert_eq!(mailboxes[0].addr_spec, "zed@localhost");
    }

    #[test]
    fn splits_multiple_mailboxes_on_top_level_commas() {
        let mailboxes = parse_mailbox_list("a@x, \"B, C\" <b@y>");
        assert_eq!(mailboxes.len(), 2);
        assert_eq!(mailboxes[1].addr_spec, "b@y");
    }
}
