//! # Session Configuration
//!
//! Values the session reads at runtime: identity, port, capacity and the
//! client-side timeouts. Loaded once from TOML; every field has a default so
//! a partial (or empty) file is valid.
//!
//! ```toml
//! name = "Tacotakedown"
//! admin_name = "ADMIN"
//! port = 7777
//! max_clients = 16
//! connect_timeout_secs = 5.0
//! disconnect_timeout_secs = 3.0
//! debug_network = false
//! debug_network_time = false
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};

/// Runtime configuration of a [`crate::Session`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Display name sent to servers in the handshake and used for chat.
    pub name: String,
    /// Chat name used when a server-only session talks.
    pub admin_name: String,
    /// Port to host on, and the default port when connecting.
    pub port: u16,
    /// Maximum number of simultaneous peers on a hosted server.
    pub max_clients: usize,
    /// Seconds a connect attempt may stay pending.
    pub connect_timeout_secs: f64,
    /// Seconds a graceful disconnect may stay pending.
    pub disconnect_timeout_secs: f64,
    /// Log every received packet.
    pub debug_network: bool,
    /// Log the session time twice per second.
    pub debug_network_time: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "Tacotakedown".to_owned(),
            admin_name: "ADMIN".to_owned(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            connect_timeout_secs: 5.0,
            disconnect_timeout_secs: 3.0,
            debug_network: false,
            debug_network_time: false,
        }
    }
}

impl SessionConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file can't be read, otherwise as
    /// [`SessionConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.admin_name.trim().is_empty() {
            return Err(ConfigError::Invalid("admin_name must not be empty".into()));
        }
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients must be at least 1".into()));
        }
        for (field, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("disconnect_timeout_secs", self.disconnect_timeout_secs),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be a positive number of seconds, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// How long a connect attempt may stay pending.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        seconds(self.connect_timeout_secs)
    }

    /// How long a graceful disconnect may stay pending.
    #[must_use]
    pub fn disconnect_timeout(&self) -> Duration {
        seconds(self.disconnect_timeout_secs)
    }
}

/// Unvalidated values (negative, NaN) collapse to zero instead of panicking.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
