//! The MailBase MIME tree, canonical parse/serialize, the request/response
//! façade, and bounce analysis.

pub mod bounce;
pub mod encode;
pub mod error;
pub mod mail_base;
pub mod mail_request;
pub mod mail_response;
pub mod mime;
pub mod parse;

pub use bounce::BounceAnalysis;
pub use error::MailError;
pub use mail_base::{Body, MailBase};
pub use mail_request::MailRequest;
pub use mail_response::{MailResponse, TemplateRenderer};
