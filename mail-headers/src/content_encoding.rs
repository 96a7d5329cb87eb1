//! Parsing and serializing the four "content-encoding" headers --
//! `Content-Type`, `Content-Transfer-Encoding`, `Content-Disposition`,
//! `Mime-Version` -- into a `(value, params)` pair, per §3/§4.1 of the base
//! spec and `salmon/encoding.py`'s `ContentEncoding`/`parse_parameter_header`.

use std::collections::BTreeMap;

use crate::error::HeaderError;
use crate::map::HeaderMap;

pub const CONTENT_ENCODING_KEYS: [&str; 4] = [
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-Disposition",
    "Mime-Version",
];

/// Parameter keys stripped on read because they're a serialization
/// artifact, recomputed fresh on write (MailBase invariant (d)).
const REMOVED_PARAMS: [&str; 1] = ["boundary"];

pub fn is_content_encoding_header(name: &str) -> bool {
    CONTENT_ENCODING_KEYS.iter().any(|k| k.eq_ignore_ascii_case(name))
}

/// A `value; k=v; k2=v2` header decomposed into its bare value and
/// parameters, e.g. `"multipart/mixed", {"boundary": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterizedValue {
    pub value: String,
    pub params: BTreeMap<String, String>,
}

impl ParameterizedValue {
    pub fn new(value: impl Into<String>) -> Self {
        ParameterizedValue {
            value: value.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn parse(raw: &str) -> Self {
        let mut parts = raw.split(';');
        let value = parts.next().unwrap_or_default().trim().to_owned();
        let mut params = BTreeMap::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((key, val)) = part.split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                let val = val.trim().trim_matches('"').to_owned();
                if REMOVED_PARAMS.contains(&key.as_str()) {
                    continue;
                }
                params.insert(key, val);
            }
        }
        ParameterizedValue { value, params }
    }

    fn serialize(&self) -> String {
        let mut out = self.value.clone();
        for (key, val) in &self.params {
            out.push_str("; ");
            out.push_str(key);
            out.push('=');
            if val.chars().any(|c| c.is_whitespace() || c == ';' || c == '"') {
                out.push('"');
                out.push_str(&val.replace('"', "\\\""));
                out.push('"');
            } else {
                out.push_str(val);
            }
        }
        out
    }
}

/// Read one of the four content-encoding headers off `headers`. The value
/// is lowercased per the base spec ("stored as `(lowercased-value,
/// params-map)`"); parameter *values* are left as-is (e.g. a `name=` file
/// name parameter is case-sensitive).
pub fn get(headers: &HeaderMap, key: &str) -> Result<Option<ParameterizedValue>, HeaderError> {
    if !is_content_encoding_header(key) {
        return Err(HeaderError::NotAContentEncodingHeader(key.to_owned()));
    }
    Ok(headers.get_first(key).map(|raw| {
        let mut parsed = ParameterizedValue::parse(raw);
        parsed.value = parsed.value.to_ascii_lowercase();
        parsed
    }))
}

/// Write one of the four content-encoding headers, replacing any existing
/// occurrence (a `MailBase` never has two `Content-Type` headers).
pub fn set(headers: &mut HeaderMap, key: &str, value: &ParameterizedValue) -> Result<(), HeaderError> {
    if !is_content_encoding_header(key) {
        return Err(HeaderError::NotAContentEncodingHeader(key.to_owned()));
    }
    headers.set(key, value.serialize());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_and_params() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "Multipart/Mixed; boundary=\"abc123\"; charset=utf-8");
        let parsed = get(&headers, "Content-Type").unwrap().unwrap();
        assert_eq!(parsed.value, "multipart/mixed");
        assert_eq!(parsed.param("charset"), Some("utf-8"));
    }

    #[test]
    fn boundary_param_is_stripped_on_read() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "multipart/mixed; boundary=xyz");
        let parsed = get(&headers, "Content-Type").unwrap().unwrap();
        assert_eq!(parsed.param("boundary"), None);
    }

    #[test]
    fn rejects_non_content_encoding_keys() {
        let headers = HeaderMap::new();
        assert_eq!(
            get(&headers, "Subject"),
            Err(HeaderError::NotAContentEncodingHeader("Subject".to_owned()))
        );
    }

    #[test]
    fn set_round_trips_through_get() {
        let mut headers = HeaderMap::new();
        let value = ParameterizedValue::new("text/plain").with_param("charset", "us-ascii");
        set(&mut headers, "Content-Type", &value).unwrap();
        let parsed = get(&headers, "Content-Type").unwrap().unwrap();
        assert_eq!(parsed.value, "text/plain");
        assert_eq!(parsed.param("charset"), Some("us-ascii"));
    }
}
