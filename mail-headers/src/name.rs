//! Header name normalization and case-insensitive comparison.
//!
//! Grounded on `salmon/encoding.py::normalize_header`, which is
//! `string.capwords(header.lower(), '-')` -- i.e. "content-type" becomes
//! "Content-Type". We keep headers in their original form when they arrive
//! off the wire (MailBase invariant (b) in the base spec) but always compare
//! and look them up case-insensitively.

/// Render `name` in Title-Hyphen-Case, e.g. `"x-mailer"` -> `"X-Mailer"`.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, segment) in name.split('-').enumerate() {
        if i > 0 {
            out.push('-');
        }
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.extend(chars.flat_map(char::to_lowercase));
        }
    }
    out
}

/// Case-insensitive header name equality.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_title_hyphen_case() {
        assert_eq!(normalize("content-type"), "Content-Type");
        assert_eq!(normalize("SUBJECT"), "Subject");
        assert_eq!(normalize("x-mailer-version"), "X-Mailer-Version");
    }

    #[test]
    fn comparison_is_case_insensitive() {
        assert!(eq_ignore_case("Content-Type", "content-type"));
        assert!(!eq_ignore_case("Content-Type", "Content-Length"));
    }
}
