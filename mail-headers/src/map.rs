//! An ordered, case-insensitive, duplicate-permitting header list.
//!
//! Shaped after `core/src/headers/map/mod.rs`'s ordered multimap, simplified
//! from that crate's generically-typed `Header`/`HeaderKind` machinery down
//! to plain strings -- this spec's MailBase has no compile-time notion of
//! "the `Subject` header type," every header is just a name and a decoded
//! text value (§3 of the base spec).

use crate::name;

/// One header as stored on a `MailBase`: the name in the form it arrived
/// (or was set) in, and its value already decoded to text (RFC 2047
/// encoded-words resolved by the time it lands here -- see `mail-core`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// An ordered list of headers, preserving insertion order and duplicate
/// entries, with case-insensitive lookup by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<HeaderEntry>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Append a header, keeping any existing header of the same name (a
    /// `MailBase` is allowed duplicate headers, e.g. multiple `Received`).
    /// The name is normalized to Title-Hyphen-Case on the way in.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries.push(HeaderEntry {
            name: name::normalize(name.as_ref()),
            value: value.into(),
        });
    }

    /// Remove every header with this name, then append a single one with
    /// the given value -- the usual "set" semantics.
    pub fn set(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.remove_all(name.as_ref());
        self.append(name, value);
    }

    /// The first header value matching `name`, case-insensitively.
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| name::eq_ignore_case(&e.name, name))
            .map(|e| e.value.as_str())
    }

    /// All header values matching `name`, in registration order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |e| name::eq_ignore_case(&e.name, name))
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| name::eq_ignore_case(&e.name, name))
    }

    pub fn remove_all(&mut self, name: &str) {
        self.entries.retain(|e| !name::eq_ignore_case(&e.name, name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every header name in this map, normalized and de-duplicated, in
    /// first-occurrence order.
    pub fn keys(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.iter().any(|k: &String| name::eq_ignore_case(k, &entry.name)) {
                seen.push(entry.name.clone());
            }
        }
        seen
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| (e.name.as_str(), e.value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive_but_storage_preserves_original_case() {
        let mut map = HeaderMap::new();
        map.append("subject", "hi");
        assert_eq!(map.get_first("SUBJECT"), Some("hi"));
        assert_eq!(map.keys(), vec!["Subject".to_owned()]);
    }

    #[test]
    fn append_allows_duplicates_set_replaces() {
        let mut map = HeaderMap::new();
        map.append("Received", "a");
        map.append("Received", "b");
        assert_eq!(map.get_all("received").collect::<Vec<_>>(), vec!["a", "b"]);

        map.set("Received", "only");
        assert_eq!(map.get_all("received").collect::<Vec<_>>(), vec!["only"]);
    }

    #[test]
    fn remove_all_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.append("X-Foo", "1");
        map.remove_all("x-foo");
        assert!(!map.contains("X-Foo"));
    }
}
