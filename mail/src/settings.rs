//! A single TOML document layering every receiver/relay config struct, the
//! shape a CLI front-end reads off disk. Mirrors how `mail-transport`'s own
//! structs derive `Deserialize` + `Default` so each section is optional.

use serde::Deserialize;
use thiserror::Error;

use mail_transport::{LmtpReceiverConfig, QueueConfig, ReceiverConfig, RelayConfig, RouterConfig};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub smtp: ReceiverConfig,
    pub lmtp: LmtpReceiverConfig,
    pub queue: QueueConfig,
    pub router: RouterConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_every_sections_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.queue.workers, QueueConfig::default().workers);
    }

    #[test]
    fn overrides_a_single_field_of_a_single_section() {
        let settings = Settings::from_toml_str("[queue]\nworkers = 8\n").unwrap();
        assert_eq!(settings.queue.workers, 8);
        assert_eq!(settings.queue.poll_interval_ms, QueueConfig::default().poll_interval_ms);
    }
}
