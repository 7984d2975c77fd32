//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// t:connect account email.
    pub tconnect_email: String,
    /// t:connect account password.
    pub tconnect_password: String,
    /// Base URL of the Nightscout instance.
    pub ns_url: String,
    /// Nightscout API secret.
    pub ns_secret: String,
    /// UTC offset the pump's clock runs in, e.g. `-04:00`. The vendor
    /// reports naive local timestamps; this is what localizes them.
    pub timezone_offset: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tconnect_email", &self.tconnect_email)
            .field("tconnect_password", &"[REDACTED]")
            .field("ns_url", &self.ns_url)
            .field("ns_secret", &"[REDACTED]")
            .field("timezone_offset", &self.timezone_offset)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tconnect_email: String::new(),
            tconnect_password: String::new(),
            ns_url: String::new(),
            ns_secret: String::new(),
            timezone_offset: "-04:00".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PUMPSYNC_*)
        figment = figment.merge(Env::prefixed("PUMPSYNC_"));

        figment.extract()
    }

    /// The pump's UTC offset, or `None` when `timezone_offset` is not a
    /// valid `±HH:MM` string.
    pub fn pump_offset(&self) -> Option<FixedOffset> {
        self.timezone_offset.parse().ok()
    }
}

/// Returns the platform-specific config directory for pumpsync.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pumpsync"))
}
