//! Process-level configuration: where a [`Provider`](crate::provider::Provider)
//! gets its listen address, provider id, and admin token from, layered
//! the same way the teacher layers its server config — defaults,
//! overridden by an optional file, overridden by environment variables.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_address() -> String {
    "local".to_string()
}

fn default_provider_id() -> u16 {
    0
}

/// Top-level process configuration. `admin_token`, when set, is required
/// on every admin operation (`createDatabase`, `attachDatabase`,
/// `detachDatabase`, `destroyDatabase`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_provider_id")]
    pub provider_id: u16,
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            address: default_address(),
            provider_id: default_provider_id(),
            admin_token: None,
            log_filter: None,
        }
    }
}

impl ProviderConfig {
    /// Load from a JSON file at `path`; falls back to `Default` if the
    /// file is absent.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;
        serde_json::from_str(&text).map_err(Error::from)
    }

    /// Apply environment overrides: `SONATA_ADDRESS`, `SONATA_PROVIDER_ID`,
    /// `SONATA_ADMIN_TOKEN`, `SONATA_LOG`. Mirrors the teacher's
    /// environment-override layering for its own server config.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("SONATA_ADDRESS") {
            self.address = v;
        }
        if let Ok(v) = std::env::var("SONATA_PROVIDER_ID") {
            if let Ok(id) = v.parse() {
                self.provider_id = id;
            }
        }
        if let Ok(v) = std::env::var("SONATA_ADMIN_TOKEN") {
            self.admin_token = Some(v);
        }
        if let Ok(v) = std::env::var("SONATA_LOG") {
            self.log_filter = Some(v);
        }
        self
    }
}

/// Install a `tracing` subscriber honoring `RUST_LOG`/`log_filter`,
/// matching the teacher's `tracing_subscriber::fmt` setup.
pub fn init_logging(filter: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = filter
        .map(|f| EnvFilter::new(f.to_string()))
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let _ = fmt().with_env_filter(env_filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_admin_token() {
        let cfg = ProviderConfig::default();
        assert_eq!(cfg.address, "local");
        assert_eq!(cfg.provider_id, 0);
        assert!(cfg.admin_token.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let cfg = ProviderConfig::from_file(std::path::Path::new("/no/such/file.json")).unwrap();
        assert_eq!(cfg.address, "local");
    }
}
