//! Shared wire-protocol plumbing for the SMTP and LMTP receivers: command
//! line reading, `DATA` dot-unstuffing, and a listener abstraction that
//! unifies TCP and UNIX-domain sockets so the two receivers can bind
//! either without duplicating the accept loop.
//!
//! Grounded on `original_source/salmon/server.py`'s `SMTPReceiver` /
//! `LMTPReceiver`: the RFC 5321 `DATA` terminator (`CRLF.CRLF`) and leading-
//! dot unstuffing are ported directly; the accept loop itself follows
//! `tokio`'s own idiom for a multi-threaded per-connection task, one level
//! of abstraction above what the Python threading model needed.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use crate::config::BindAddress;
use crate::error::ReceiverError;

/// The two transports a receiver may be bound to. LMTP, per RFC 2033,
/// commonly runs over a UNIX socket for local delivery; SMTP in this
/// implementation only ever binds TCP, but the type is shared so both
/// receivers reuse one accept loop.
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Listener {
    pub async fn bind(addr: &BindAddress) -> Result<Self, ReceiverError> {
        match addr {
            BindAddress::Tcp(socket_addr) => {
                let listener = TcpListener::bind(socket_addr).await.map_err(|e| ReceiverError::Io {
                    addr: socket_addr.to_string(),
                    source: e,
                })?;
                Ok(Listener::Tcp(listener))
            }
            BindAddress::Unix(path) => {
                let _ = std::fs::remove_file(path);
                let listener = UnixListener::bind(path).map_err(|e| ReceiverError::Io {
                    addr: path.display().to_string(),
                    source: e,
                })?;
                Ok(Listener::Unix(listener))
            }
        }
    }

    pub fn local_description(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "<tcp>".to_owned()),
            Listener::Unix(_) => "<unix socket>".to_owned(),
        }
    }

    pub async fn accept(&self) -> io::Result<(Connection, Option<SocketAddr>)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                Ok((Connection::Tcp(stream), Some(addr)))
            }
            Listener::Unix(listener) => {
                let (stream, _addr) = listener.accept().await?;
                Ok((Connection::Unix(stream), None))
            }
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &mut tokio::io::ReadBuf<'_>) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            Connection::Unix(s) => std::pin::Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &[u8]) -> std::task::Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            Connection::Unix(s) => std::pin::Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => std::pin::Pin::new(s).poll_flush(cx),
            Connection::Unix(s) => std::pin::Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: std::pin::Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            Connection::Unix(s) => std::pin::Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Reads one CRLF- (or bare LF-) terminated command line, trimming the
/// terminator. `Ok(None)` means the peer closed the connection cleanly.
pub(crate) async fn read_line<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<Option<String>, ReceiverError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.map_err(|e| ReceiverError::Io {
        addr: "<peer>".to_owned(),
        source: e,
    })?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Reads an RFC 5321 `DATA` body up to the `CRLF.CRLF` terminator,
/// reversing leading-dot transparency stuffing on each line.
pub(crate) async fn read_data<R: AsyncBufReadExt + Unpin>(reader: &mut R, max_size: u64) -> Result<Vec<u8>, ReceiverError> {
    let mut body = Vec::new();
    loop {
        let Some(line) = read_line(reader).await? else {
            return Err(ReceiverError::ConnectionClosed);
        };
        if line == "." {
            break;
        }
        let unstuffed = line.strip_prefix('.').unwrap_or(&line);
        body.extend_from_slice(unstuffed.as_bytes());
        body.extend_from_slice(b"\r\n");
        if max_size > 0 && body.len() as u64 > max_size {
            // keep draining until the terminator so the connection stays
            // in a valid protocol state for the caller's error reply.
            while let Some(line) = read_line(reader).await? {
                if line == "." {
                    break;
                }
            }
            return Err(ReceiverError::MalformedCommand {
                command: "DATA",
                line: format!("payload exceeds {max_size} bytes"),
            });
        }
    }
    Ok(body)
}

/// Extracts the address between `<` and `>` in a `MAIL FROM:<addr>` or
/// `RCPT TO:<addr>` command, tolerating the trailing ESMTP parameters
/// real clients append (`SIZE=...`, etc).
pub(crate) fn extract_angle_addr(line: &str) -> Option<String> {
    let start = line.find('<')?;
    let end = line[start..].find('>')? + start;
    Some(line[start + 1..end].to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_address_between_angle_brackets() {
        assert_eq!(extract_angle_addr("MAIL FROM:<a@b.com> SIZE=1000"), Some("a@b.com".to_owned()));
        assert_eq!(extract_angle_addr("RCPT TO:<x@y.com>"), Some("x@y.com".to_owned()));
        assert_eq!(extract_angle_addr("HELO localhost"), None);
    }
}
