//! Layered configuration for every binary-facing component. Each struct
//! derives `serde::Deserialize` with a matching `Default`, so a CLI
//! front-end can `toml::from_str` a settings file and only override what it
//! needs. Nothing here reads a file path out of the environment itself --
//! that's the out-of-scope CLI's job.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use serde::Deserialize;

fn default_smtp_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8825)
}

fn default_lmtp_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8824)
}

/// Which socket a receiver binds. LMTP additionally supports a UNIX-domain
/// socket path, per RFC 2033's intended local-delivery use case.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindAddress {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl Default for BindAddress {
    fn default() -> Self {
        BindAddress::Tcp(default_smtp_addr())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub bind: BindAddress,
    /// The hostname this receiver announces in its banner/EHLO reply.
    pub hostname: String,
    /// Hard cap on a single DATA payload, in bytes; `0` disables the check
    /// at the receiver (the queue's own `pop_limit` still applies).
    pub max_message_size: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            bind: BindAddress::Tcp(default_smtp_addr()),
            hostname: "localhost".to_owned(),
            max_message_size: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LmtpReceiverConfig {
    pub bind: BindAddress,
    pub hostname: String,
    pub max_message_size: u64,
}

impl Default for LmtpReceiverConfig {
    fn default() -> Self {
        LmtpReceiverConfig {
            bind: BindAddress::Tcp(default_lmtp_addr()),
            hostname: "localhost".to_owned(),
            max_message_size: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub dir: PathBuf,
    pub safe: bool,
    /// `0` disables oversize protection.
    pub pop_limit: u64,
    pub oversize_dir: Option<PathBuf>,
    /// How often the queue receiver polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Bounded worker-pool size for the queue receiver.
    pub workers: usize,
    /// Exit once the queue drains instead of polling forever.
    pub one_shot: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            dir: PathBuf::from("run/queue"),
            safe: false,
            pop_limit: 0,
            oversize_dir: None,
            poll_interval_ms: 1_000,
            workers: 4,
            one_shot: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub reload: bool,
    pub log_exceptions: bool,
    /// Path to a `sled` database for durable FSM state; `None` keeps state
    /// in memory only.
    pub state_db: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            reload: false,
            log_exceptions: true,
            state_db: None,
        }
    }
}

/// Mutually exclusive transport-security modes for a `Relay`. See
/// `Relay::new` for the exclusivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelaySecurity {
    None,
    /// Implicit TLS from the first byte (SMTPS, typically port 465).
    Ssl,
    /// Plaintext then `STARTTLS` upgrade.
    Starttls,
}

impl Default for RelaySecurity {
    fn default() -> Self {
        RelaySecurity::None
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// An explicit destination host:port; if absent, the recipient
    /// domain's MX (falling back to A/AAAA) is resolved per delivery.
    pub host: Option<SocketAddr>,
    pub security: RelaySecurity,
    pub lmtp: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            host: None,
            security: RelaySecurity::None,
            lmtp: false,
            username: None,
            password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_receiver_defaults_to_127_0_0_1_8825() {
        let config = ReceiverConfig::default();
        match config.bind {
            BindAddress::Tcp(addr) => assert_eq!(addr, default_smtp_addr()),
            BindAddress::Unix(_) => panic!("expected a TCP default"),
        }
    }

    #[test]
    fn lmtp_receiver_defaults_to_127_0_0_1_8824() {
        let config = LmtpReceiverConfig::default();
        match config.bind {
            BindAddress::Tcp(addr) => assert_eq!(addr, default_lmtp_addr()),
            BindAddress::Unix(_) => panic!("expected a TCP default"),
        }
    }

    #[test]
    fn relay_config_defaults_to_no_security() {
        assert_eq!(RelayConfig::default().security, RelaySecurity::None);
    }
}
