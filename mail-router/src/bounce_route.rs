//! `BounceRoute`: a small combinator wrapping a handler so that probable
//! bounces are diverted to a dedicated soft/hard handler instead.
//!
//! Supplemented from `original_source/salmon/bounce.py`'s `bounce_to`
//! decorator -- dropped by the distillation's non-goals around "arbitrary
//! MIME transformations," but this is routing behavior, not a
//! transformation, so it belongs in `mail-router` rather than `mail-core`.

use std::collections::HashMap;

use mail_core::MailRequest;

use crate::error::SmtpError;
use crate::route::Transition;

type Handler = dyn Fn(&MailRequest, &HashMap<String, String>) -> Result<Transition, SmtpError> + Send + Sync;

/// Wraps `handler` so that when `message.bounce()` is probable, dispatch
/// goes to `soft` or `hard` instead (chosen by
/// `BounceAnalysis::is_soft`/`is_hard`), and only falls through to
/// `handler` for non-bounce mail.
pub struct BounceRoute {
    soft: Box<Handler>,
    hard: Box<Handler>,
}

impl BounceRoute {
    pub fn new(soft: impl Fn(&MailRequest, &HashMap<String, String>) -> Result<Transition, SmtpError> + Send + Sync + 'static, hard: impl Fn(&MailRequest, &HashMap<String, String>) -> Result<Transition, SmtpError> + Send + Sync + 'static) -> Self {
        BounceRoute {
            soft: Box::new(soft),
            hard: Box::new(hard),
        }
    }

    /// Wraps a normal handler: bounces are diverted, everything else is
    /// passed straight through to `handler`.
    pub fn wrap(self, handler: impl Fn(&MailRequest, &HashMap<String, String>) -> Result<Transition, SmtpError> + Send + Sync + 'static) -> impl Fn(&MailRequest, &HashMap<String, String>) -> Result<Transition, SmtpError> + Send + Sync {
        move |message, captures| {
            let analysis = message.bounce();
            if analysis.is_hard() {
                (self.hard)(message, captures)
            } else if analysis.is_soft() {
                (self.soft)(message, captures)
            } else {
                handler(message, captures)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn hard_bounce_request() -> MailRequest {
        let data = concat!(
            "From: mailer-daemon@x\r\n",
            "To: a@x\r\n",
            "Content-Type: multipart/report; report-type=delivery-status; boundary=B\r\n",
            "\r\n",
            "--B\r\n",
            "Content-Type: message/delivery-status\r\n",
            "\r\n",
            "Action: failed\r\n",
            "Status: 5.1.1\r\n",
            "Final-Recipient: rfc822; bob@example.com\r\n",
            "Diagnostic-Code: smtp; 550 no such user\r\n",
            "\r\n",
            "--B--\r\n",
        );
        MailRequest::new(None, "mailer-daemon@x".to_owned(), vec!["a@x".to_owned()], data.as_bytes().to_vec()).unwrap()
    }

    #[test]
    fn hard_bounce_is_diverted_to_the_hard_handler() {
        let hard_calls = Arc::new(AtomicUsize::new(0));
        let normal_calls = Arc::new(AtomicUsize::new(0));
        let hard_calls_clone = hard_calls.clone();
        let normal_calls_clone = normal_calls.clone();

        let route = BounceRoute::new(
            |_msg, _caps| Ok(Transition::Stay),
            move |_msg, _caps| {
                hard_calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(Transition::Stay)
            },
        );
        let wrapped = route.wrap(move |_msg, _caps| {
            normal_calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(Transition::Stay)
        });

        let msg = hard_bounce_request();
        wrapped(&msg, &HashMap::new()).unwrap();
        assert_eq!(hard_calls.load(Ordering::SeqCst), 1);
        assert_eq!(normal_calls.load(Ordering::SeqCst), 0);
    }
}
