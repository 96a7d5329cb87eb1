//! `MailRequest`: the inbound message façade handed to router handlers.
//!
//! Grounded on `salmon/mail.py`'s `MailRequest` -- envelope fields plus a
//! wrapped `MailBase` plus a lazily computed `bounce` property -- rendered
//! here with a `OnceLock` instead of Python's `__getattr__` memoization
//! trick, since the router may invoke handlers from any worker thread.

use std::sync::OnceLock;

use mail_headers::HeaderMap;

use crate::bounce::{self, BounceAnalysis};
use crate::error::MailError;
use crate::mail_base::{Body, MailBase};
use crate::parse::parse;

/// The inbound envelope plus the parsed message body.
#[derive(Debug)]
pub struct MailRequest {
    /// The peer address the connection arrived from, if known (a queue
    /// receiver has no peer).
    pub peer: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    /// The raw, as-received bytes -- kept around for the undeliverable
    /// queue and for callers that want the untouched wire form.
    pub data: Vec<u8>,
    base: MailBase,
    bounce_cache: OnceLock<BounceAnalysis>,
}

impl MailRequest {
    pub fn new(peer: Option<String>, from: String, to: Vec<String>, data: Vec<u8>) -> Result<Self, MailError> {
        let base = parse(&data)?;
        Ok(MailRequest {
            peer,
            from,
            to,
            data,
            base,
            bounce_cache: OnceLock::new(),
        })
    }

    pub fn base(&self) -> &MailBase {
        &self.base
    }

    pub fn headers(&self) -> &HeaderMap {
        self.base.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.base.header(name)
    }

    pub fn body(&self) -> Option<&Body> {
        self.base.body()
    }

    /// The lazily computed bounce analysis for this message; computed once
    /// on first access and cached for the lifetime of the request.
    pub fn bounce(&self) -> &BounceAnalysis {
        self.bounce_cache.get_or_init(|| bounce::detect(&self.base))
    }

    pub fn is_bounce(&self) -> bool {
        self.bounce().probable()
    }
}

impl Clone for MailRequest {
    fn clone(&self) -> Self {
        let bounce_cache = OnceLock::new();
        if let Some(cached) = self.bounce_cache.get() {
            let _ = bounce_cache.set(cached.clone());
        }
        MailRequest {
            peer: self.peer.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            data: self.data.clone(),
            base: self.base.clone(),
            bounce_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounce_is_computed_lazily_and_cached() {
        let raw = b"Subject: hi\r\n\r\nnot a bounce";
        let req = MailRequest::new(None, "a@x".to_owned(), vec!["b@y".to_owned()], raw.to_vec()).unwrap();
        assert!(!req.is_bounce());
        // second call hits the cache; same answer either way.
        assert!(!req.is_bounce());
    }

    #[test]
    fn rejects_unparseable_data() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nno boundary param";
        let result = MailRequest::new(None, "a@x".to_owned(), vec![], raw.to_vec());
        assert!(result.is_err());
    }
}
