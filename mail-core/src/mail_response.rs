//! `MailResponse`: the outbound message façade handlers build and hand to
//! a Relay.
//!
//! Grounded on `salmon/mail.py`'s `MailResponse` -- attach/attach_part
//! helpers that promote the message to multipart on first use, plus a
//! template-rendering attach point (templating itself is out of scope, see
//! §1's Non-goals; this crate only defines where a template engine plugs
//! in).

use std::collections::HashMap;

use mail_headers::content_encoding::ParameterizedValue;

use crate::error::MailError;
use crate::mail_base::{Body, MailBase};

/// An outbound message under construction.
#[derive(Debug, Clone, Default)]
pub struct MailResponse {
    base: MailBase,
}

impl MailResponse {
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        let mut base = MailBase::new();
        base.append_header("From", from.into());
        base.append_header("To", to.into());
        base.append_header("Subject", subject.into());
        base.append_header("Date", chrono::Utc::now().to_rfc2822());
        MailResponse { base }
    }

    pub fn base(&self) -> &MailBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut MailBase {
        &mut self.base
    }

    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.base.set_header(name, value);
    }

    /// Set the plain-text body. If the message has already been promoted
    /// to multipart (via `attach`), this sets the body of the leading
    /// `text/plain` part instead of the root.
    pub fn set_body(&mut self, text: impl Into<String>) {
        self.base.set_body(Body::Text(text.into()));
    }

    /// Attach a file, promoting the response to `multipart/mixed` on first
    /// attachment -- the root's own text body (if any) is demoted into a
    /// `text/plain` child part so it survives alongside the attachment.
    pub fn attach(&mut self, filename: &str, content_type: &str, data: Vec<u8>) -> Result<(), MailError> {
        if !self.base.is_multipart() {
            self.promote_to_multipart()?;
        }

        let mut part = MailBase::new();
        part.set_content_encoding("Content-Type", &ParameterizedValue::new(content_type))?;
        part.set_content_encoding(
            "Content-Disposition",
            &ParameterizedValue::new("attachment").with_param("filename", filename),
        )?;
        part.set_content_encoding("Content-Transfer-Encoding", &ParameterizedValue::new("base64"))?;
        part.set_body(Body::Bytes(data));
        self.base.push_part(part);
        Ok(())
    }

    fn promote_to_multipart(&mut self) -> Result<(), MailError> {
        if let Some(body) = self.base.body().cloned() {
            let mut text_part = MailBase::new();
            text_part.set_content_encoding("Content-Type", &ParameterizedValue::new("text/plain").with_param("charset", "utf-8"))?;
            text_part.set_body(body);
            self.base.push_part(text_part);
            self.base.clear_body();
        }
        self.base
            .set_content_encoding("Content-Type", &ParameterizedValue::new("multipart/mixed"))?;
        Ok(())
    }

    /// Render `template` through `renderer` and set it as the plain-text
    /// body. Templating itself lives entirely behind this trait -- this
    /// crate supplies no implementation.
    pub fn render(
        &mut self,
        renderer: &dyn TemplateRenderer,
        template: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), MailError> {
        let rendered = renderer.render(template, context)?;
        self.set_body(rendered);
        Ok(())
    }
}

/// The attach point for a template engine. Left unimplemented here per
/// §1's Non-goals -- a CLI front-end or handler module supplies a concrete
/// implementation (e.g. wrapping `tera` or `handlebars`).
pub trait TemplateRenderer {
    fn render(&self, template: &str, context: &HashMap<String, String>) -> Result<String, MailError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_response_has_no_parts() {
        let mut response = MailResponse::new("a@x", "b@y", "hi");
        response.set_body("hello");
        assert!(!response.base().is_multipart());
    }

    #[test]
    fn new_response_is_stamped_with_a_date_header() {
        let response = MailResponse::new("a@x", "b@y", "hi");
        assert!(response.base().header("Date").is_some());
    }

    #[test]
    fn attaching_a_file_promotes_to_multipart_and_keeps_the_text_body() {
        let mut response = MailResponse::new("a@x", "b@y", "hi");
        response.set_body("hello");
        response.attach("report.csv", "text/csv", b"a,b,c".to_vec()).unwrap();

        assert!(response.base().is_multipart());
        assert_eq!(response.base().parts().len(), 2);
        assert_eq!(response.base().parts()[0].body().unwrap().as_text(), Some("hello"));
        assert_eq!(response.base().parts()[1].body().unwrap().as_bytes(), b"a,b,c");
    }

    struct UppercaseRenderer;
    impl TemplateRenderer for UppercaseRenderer {
        fn render(&self, template: &str, _context: &HashMap<String, String>) -> Result<String, MailError> {
            Ok(template.to_uppercase())
        }
    }

    #[test]
    fn render_hook_sets_the_body() {
        let mut response = MailResponse::new("a@x", "b@y", "hi");
        response.render(&UppercaseRenderer, "hello", &HashMap::new()).unwrap();
        assert_eq!(response.base().body().unwrap().as_text(), Some("HELLO"));
    }
}
