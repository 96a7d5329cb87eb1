//! Outbound relay: resolves a destination (explicit host, or MX with A/AAAA
//! fallback), speaks SMTP or LMTP, and optionally upgrades to TLS.
//! Grounded on `original_source/salmon/server.py`'s `Relay` class; MX/A
//! fallback and the exclusivity of `ssl`/`starttls`/`lmtp` are ported
//! directly from its constructor and `resolve_relay_host`.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use mail_core::MailResponse;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::{RelayConfig, RelaySecurity};
use crate::error::RelayError;

const SMTP_SUBMISSION_PORT: u16 = 25;

/// An outbound delivery path. Configuration is validated once at
/// construction time so `ssl && (starttls || lmtp)` fails fast rather than
/// misbehaving mid-delivery.
pub struct Relay {
    config: RelayConfig,
    resolver: TokioAsyncResolver,
    tls_connector: TlsConnector,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        if config.security == RelaySecurity::Ssl && config.lmtp {
            return Err(RelayError::ConflictingOptions);
        }
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());

        let root_store = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let tls_config = rustls::ClientConfig::builder().with_root_certificates(root_store).with_no_client_auth();
        let tls_connector = TlsConnector::from(Arc::new(tls_config));

        Ok(Relay {
            config,
            resolver,
            tls_connector,
        })
    }

    /// Delivers `message`, resolving recipient/sender/host with the
    /// precedence: explicit argument, then the response's own envelope,
    /// then its headers.
    pub async fn deliver(&self, message: &MailResponse, to: Option<&str>, from: Option<&str>) -> Result<(), RelayError> {
        let to = to
            .map(|s| s.to_owned())
            .or_else(|| message.base().header("To").map(|s| s.to_owned()))
            .ok_or(RelayError::NoRecipients)?;
        let from = from.map(|s| s.to_owned()).or_else(|| message.base().header("From").map(|s| s.to_owned())).unwrap_or_default();

        let domain = to.rsplit('@').next().unwrap_or(&to).to_owned();
        let addr = self.resolve_host(&domain).await?;

        let body = mail_core::encode::serialize(message.base()).map_err(|e| RelayError::Io {
            host: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
        })?;

        let span = tracing::info_span!("relay_attempt", host = %addr, domain = %domain);
        let _enter = span.enter();

        let stream = TcpStream::connect(addr).await.map_err(|e| RelayError::Io { host: addr.to_string(), source: e })?;

        match self.config.security {
            RelaySecurity::Ssl => {
                let tls = self.upgrade(stream, &domain).await?;
                self.run_transaction(tls, &from, &to, &body).await
            }
            RelaySecurity::Starttls => {
                let mut plain = stream;
                negotiate_starttls(&mut plain).await?;
                let tls = self.upgrade(plain, &domain).await?;
                self.run_transaction(tls, &from, &to, &body).await
            }
            RelaySecurity::None => self.run_transaction(stream, &from, &to, &body).await,
        }
    }

    async fn resolve_host(&self, domain: &str) -> Result<SocketAddr, RelayError> {
        if let Some(host) = self.config.host {
            return Ok(host);
        }

        let port = SMTP_SUBMISSION_PORT;
        match self.resolver.mx_lookup(format!("{domain}.")).await {
            Ok(lookup) => {
                let mut records: Vec<_> = lookup.iter().collect();
                records.sort_by_key(|mx| mx.preference());
                if let Some(best) = records.first() {
                    let exchange = best.exchange().to_utf8();
                    let ip = self.lookup_ip(&exchange).await.map_err(|source| RelayError::Resolution {
                        domain: domain.to_owned(),
                        source,
                    })?;
                    return Ok(SocketAddr::new(ip, port));
                }
                let ip = self.lookup_ip(domain).await.map_err(|source| RelayError::Resolution {
                    domain: domain.to_owned(),
                    source,
                })?;
                Ok(SocketAddr::new(ip, port))
            }
            Err(_) => {
                let ip = self.lookup_ip(domain).await.map_err(|source| RelayError::Resolution {
                    domain: domain.to_owned(),
                    source,
                })?;
                Ok(SocketAddr::new(ip, port))
            }
        }
    }

    async fn lookup_ip(&self, host: &str) -> Result<IpAddr, hickory_resolver::error::ResolveError> {
        let lookup = self.resolver.lookup_ip(host).await?;
        lookup.iter().next().ok_or_else(|| hickory_resolver::error::ResolveError::from("no A/AAAA records"))
    }

    async fn upgrade(&self, stream: TcpStream, domain: &str) -> Result<tokio_rustls::client::TlsStream<TcpStream>, RelayError> {
        let server_name = ServerName::try_from(domain.to_owned()).map_err(|e| RelayError::Tls {
            host: domain.to_owned(),
            detail: e.to_string(),
        })?;
        self.tls_connector.connect(server_name, stream).await.map_err(|e| RelayError::Tls {
            host: domain.to_owned(),
            detail: e.to_string(),
        })
    }

    async fn run_transaction<S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin>(&self, stream: S, from: &str, to: &str, body: &[u8]) -> Result<(), RelayError> {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);
        let host = "relay peer".to_owned();

        read_reply(&mut reader, &host).await?;

        let greeting = if self.config.lmtp { "LHLO localhost\r\n" } else { "EHLO localhost\r\n" };
        write_half.write_all(greeting.as_bytes()).await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        read_reply(&mut reader, &host).await?;

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            authenticate_plain(&mut reader, &mut write_half, &host, user, pass).await?;
        }

        write_half.write_all(format!("MAIL FROM:<{from}>\r\n").as_bytes()).await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        read_reply(&mut reader, &host).await?;

        write_half.write_all(format!("RCPT TO:<{to}>\r\n").as_bytes()).await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        read_reply(&mut reader, &host).await?;

        write_half.write_all(b"DATA\r\n").await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        read_reply(&mut reader, &host).await?;

        write_half.write_all(&dot_stuff(body)).await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        write_half.write_all(b"\r\n.\r\n").await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        read_reply(&mut reader, &host).await?;

        write_half.write_all(b"QUIT\r\n").await.map_err(|e| RelayError::Io { host: host.clone(), source: e })?;
        let _ = read_reply(&mut reader, &host).await;

        Ok(())
    }
}

async fn negotiate_starttls(stream: &mut TcpStream) -> Result<(), RelayError> {
    let (read_half, mut write_half) = tokio::io::split(&mut *stream);
    let mut reader = BufReader::new(read_half);
    read_reply(&mut reader, "starttls peer").await?;
    write_half.write_all(b"EHLO localhost\r\n").await.map_err(|e| RelayError::Io {
        host: "starttls peer".to_owned(),
        source: e,
    })?;
    read_reply(&mut reader, "starttls peer").await?;
    write_half.write_all(b"STARTTLS\r\n").await.map_err(|e| RelayError::Io {
        host: "starttls peer".to_owned(),
        source: e,
    })?;
    read_reply(&mut reader, "starttls peer").await?;
    Ok(())
}

async fn authenticate_plain<R, W>(reader: &mut BufReader<R>, writer: &mut W, host: &str, user: &str, pass: &str) -> Result<(), RelayError>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    let token = format!("\0{user}\0{pass}");
    let encoded = BASE64.encode(token);
    writer.write_all(format!("AUTH PLAIN {encoded}\r\n").as_bytes()).await.map_err(|e| RelayError::Io {
        host: host.to_owned(),
        source: e,
    })?;
    read_reply(reader, host).await.map(|_| ())
}

async fn read_reply<R: tokio::io::AsyncRead + Unpin>(reader: &mut BufReader<R>, host: &str) -> Result<(u16, String), RelayError> {
    let mut last = (0u16, String::new());
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.map_err(|e| RelayError::Io { host: host.to_owned(), source: e })?;
        if line.is_empty() {
            return Err(RelayError::Io {
                host: host.to_owned(),
                source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "connection closed"),
            });
        }
        let trimmed = line.trim_end();
        let code: u16 = trimmed.get(0..3).and_then(|s| s.parse().ok()).unwrap_or(0);
        let continues = trimmed.as_bytes().get(3) == Some(&b'-');
        last = (code, trimmed.to_owned());
        if !continues {
            break;
        }
    }
    if last.0 >= 400 {
        return Err(RelayError::Rejected {
            host: host.to_owned(),
            code: last.0,
            message: last.1,
        });
    }
    Ok(last)
}

fn dot_stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for line in body.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(b".") {
            out.push(b'.');
        }
        out.extend_from_slice(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssl_and_lmtp_together_is_rejected() {
        let config = RelayConfig {
            security: RelaySecurity::Ssl,
            lmtp: true,
            ..RelayConfig::default()
        };
        assert!(matches!(Relay::new(config), Err(RelayError::ConflictingOptions)));
    }

    #[test]
    fn dot_stuffing_escapes_leading_dots() {
        let body = b"hello\r\n.world\r\n..two\r\n";
        let stuffed = dot_stuff(body);
        assert_eq!(stuffed, b"hello\r\n..world\r\n...two\r\n");
    }
}
