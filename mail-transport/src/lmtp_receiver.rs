//! LMTP receiver (RFC 2033): identical framing to SMTP except multiple
//! `RCPT TO` are accepted per transaction and `DATA` replies with one
//! status line per recipient, in RCPT order. Grounded on
//! `original_source/salmon/server.py`'s `LMTPReceiver`.

use std::sync::Arc;

use mail_core::MailRequest;
use mail_router::{RouterError, Router};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use crate::config::LmtpReceiverConfig;
use crate::error::ReceiverError;
use crate::receiver::{extract_angle_addr, read_data, read_line, Connection, Listener};

pub struct LmtpReceiver {
    config: LmtpReceiverConfig,
}

impl LmtpReceiver {
    pub fn new(config: LmtpReceiverConfig) -> Self {
        LmtpReceiver { config }
    }

    pub async fn bind(self) -> Result<BoundLmtpReceiver, ReceiverError> {
        let listener = Listener::bind(&self.config.bind).await?;
        tracing::info!(addr = %listener.local_description(), "lmtp receiver bound");
        Ok(BoundLmtpReceiver {
            listener,
            config: self.config,
        })
    }
}

pub struct BoundLmtpReceiver {
    listener: Listener,
    config: LmtpReceiverConfig,
}

impl BoundLmtpReceiver {
    pub fn serve(self, router: Arc<Router>) -> JoinHandle<()> {
        let hostname = self.config.hostname.clone();
        let max_size = self.config.max_message_size;
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((conn, peer)) => {
                        let router = router.clone();
                        let hostname = hostname.clone();
                        let peer_addr = peer.map(|a| a.to_string());
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, &hostname, max_size, peer_addr, router).await {
                                tracing::warn!(error = %e, "lmtp connection ended with an error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "lmtp receiver accept loop failed, stopping");
                        break;
                    }
                }
            }
        })
    }
}

async fn handle_connection(conn: Connection, hostname: &str, max_size: u64, peer: Option<String>, router: Arc<Router>) -> Result<(), ReceiverError> {
    let span = tracing::info_span!("lmtp_connection", peer = peer.as_deref().unwrap_or("unix"));
    let _enter = span.enter();

    let (read_half, mut write_half) = tokio::io::split(conn);
    let mut reader = BufReader::new(read_half);

    write_half.write_all(format!("220 {hostname} LMTP\r\n").as_bytes()).await.map_err(io_err)?;

    let mut from: Option<String> = None;
    let mut to: Vec<String> = Vec::new();

    loop {
        let Some(line) = read_line(&mut reader).await? else {
            return Ok(());
        };
        let upper = line.to_ascii_uppercase();

        if upper.starts_with("LHLO") || upper.starts_with("HELO") || upper.starts_with("EHLO") {
            write_half.write_all(format!("250 {hostname}\r\n").as_bytes()).await.map_err(io_err)?;
        } else if upper.starts_with("MAIL FROM:") {
            from = extract_angle_addr(&line);
            to.clear();
            write_half.write_all(b"250 Ok\r\n").await.map_err(io_err)?;
        } else if upper.starts_with("RCPT TO:") {
            if let Some(addr) = extract_angle_addr(&line) {
                to.push(addr);
            }
            write_half.write_all(b"250 Ok\r\n").await.map_err(io_err)?;
        } else if upper.starts_with("DATA") {
            let Some(from_addr) = from.clone() else {
                write_half.write_all(b"503 Bad sequence of commands\r\n").await.map_err(io_err)?;
                continue;
            };
            if to.is_empty() {
                write_half.write_all(b"503 Bad sequence of commands\r\n").await.map_err(io_err)?;
                continue;
            }
            write_half.write_all(b"354 End data with <CRLF>.<CRLF>\r\n").await.map_err(io_err)?;
            let body = read_data(&mut reader, max_size).await?;

            for reply in deliver_all(peer.clone(), from_addr, to.clone(), body, &router) {
                write_half.write_all(reply.as_bytes()).await.map_err(io_err)?;
            }

            from = None;
            to.clear();
        } else if upper.starts_with("RSET") {
            from = None;
            to.clear();
            write_half.write_all(b"250 Ok\r\n").await.map_err(io_err)?;
        } else if upper.starts_with("QUIT") {
            write_half.write_all(format!("221 {hostname} closing connection\r\n").as_bytes()).await.map_err(io_err)?;
            return Ok(());
        } else {
            write_half.write_all(b"500 Command not recognized\r\n").await.map_err(io_err)?;
        }
    }
}

/// One reply line per recipient, in the same order `to` was given -- the
/// LMTP framing `Router::deliver`'s per-recipient `Vec` result was built
/// to produce directly.
fn deliver_all(peer: Option<String>, from: String, to: Vec<String>, data: Vec<u8>, router: &Router) -> Vec<String> {
    let message = match MailRequest::new(peer, from, to.clone(), data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting undecodable message");
            return to.iter().map(|_| "554 Transaction failed: malformed message\r\n".to_owned()).collect();
        }
    };

    router
        .deliver(&message)
        .into_iter()
        .map(|result| match result {
            Ok(()) => "250 Ok\r\n".to_owned(),
            Err(RouterError::Smtp(e)) => format!("{} {}\r\n", e.code, e.message),
            Err(e) => {
                tracing::error!(error = %e, "handler error swallowed, message left on disk");
                "250 Ok\r\n".to_owned()
            }
        })
        .collect()
}

fn io_err(source: std::io::Error) -> ReceiverError {
    ReceiverError::Io {
        addr: "<peer>".to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_router::{Route, Transition};
    use std::sync::Arc as StdArc;

    #[test]
    fn one_reply_per_recipient_in_order() {
        let router = Router::new();
        router
            .register(
                Route::new("m", "START", "(user)@(host)").capture("user", ".+").capture("host", ".+").stateless(),
                StdArc::new(|_msg, _caps| Ok(Transition::Stay)),
            )
            .unwrap();

        let replies = deliver_all(None, "a@x".to_owned(), vec!["b@y".to_owned(), "c@z".to_owned()], b"Subject: hi\r\n\r\nbody\r\n".to_vec(), &router);
        assert_eq!(replies, vec!["250 Ok\r\n".to_owned(), "250 Ok\r\n".to_owned()]);
    }
}
