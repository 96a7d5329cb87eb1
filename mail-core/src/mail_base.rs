//! `MailBase`: a node in the MIME entity tree (§3 of the base spec).
//!
//! Grounded directly on `salmon/encoding.py::MailBase`: an ordered,
//! case-insensitive header list, an optional body, and a list of owned
//! child parts. Per §9's "cyclic parent/child" design note, there is no
//! parent back-pointer on the node itself -- code that needs parent context
//! (the bounce analyzer locating sibling parts by `Content-Description`)
//! walks down from a root reference instead of up from a child.

use mail_headers::content_encoding::{self, ParameterizedValue};
use mail_headers::{HeaderError, HeaderMap};

/// A MailBase body. `None` (no body at all) is distinct from `Text("")`
/// (an explicitly empty body) -- MailBase invariant (c).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            Body::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(s) => s.as_bytes(),
            Body::Bytes(b) => b,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailBase {
    headers: HeaderMap,
    body: Option<Body>,
    parts: Vec<MailBase>,
}

impl MailBase {
    pub fn new() -> Self {
        MailBase::default()
    }

    // -- headers --------------------------------------------------------

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Like `salmon`'s `MailBase.__getitem__`: the first value of a header,
    /// already decoded to text.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_first(name)
    }

    /// Like `salmon`'s `MailBase.append_header`: adds a header without
    /// displacing an existing one of the same name.
    pub fn append_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.append(name, value);
    }

    /// Like `salmon`'s `__setitem__`: replaces any existing header of this
    /// name.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn content_encoding(&self, key: &str) -> Result<Option<ParameterizedValue>, HeaderError> {
        content_encoding::get(&self.headers, key)
    }

    pub fn set_content_encoding(&mut self, key: &str, value: &ParameterizedValue) -> Result<(), HeaderError> {
        content_encoding::set(&mut self.headers, key, value)
    }

    // -- body -------------------------------------------------------------

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    pub fn clear_body(&mut self) {
        self.body = None;
    }

    // -- parts ------------------------------------------------------------

    pub fn parts(&self) -> &[MailBase] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut Vec<MailBase> {
        &mut self.parts
    }

    pub fn push_part(&mut self, part: MailBase) {
        self.parts.push(part);
    }

    pub fn is_multipart(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Depth-first walk over this node and every descendant, self first --
    /// `salmon`'s `msg.base.walk()`, used by the bounce analyzer to scan
    /// every part for DSN headers.
    pub fn walk(&self) -> impl Iterator<Item = &MailBase> {
        WalkIter { stack: vec![self] }
    }
}

struct WalkIter<'a> {
    stack: Vec<&'a MailBase>,
}

impl<'a> Iterator for WalkIter<'a> {
    type Item = &'a MailBase;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for part in node.parts.iter().rev() {
            self.stack.push(part);
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_none_is_distinct_from_empty_text() {
        let mut mail = MailBase::new();
        assert!(mail.body().is_none());
        mail.set_body(Body::Text(String::new()));
        assert_eq!(mail.body(), Some(&Body::Text(String::new())));
    }

    #[test]
    fn walk_visits_self_then_all_descendants() {
        let mut root = MailBase::new();
        root.append_header("Subject", "root");
        let mut child = MailBase::new();
        child.append_header("Subject", "child");
        let mut grandchild = MailBase::new();
        grandchild.append_header("Subject", "grandchild");
        child.push_part(grandchild);
        root.push_part(child);

        let subjects: Vec<&str> = root.walk().map(|m| m.header("Subject").unwrap()).collect();
        assert_eq!(subjects, vec!["root", "child", "grandchild"]);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut mail = MailBase::new();
        mail.append_header("X-Custom", "value");
        assert_eq!(mail.header("x-custom"), Some("value"));
    }
}
