//! Gateway configuration.
//!
//! Read from a TOML file; every field is optional. A missing file means
//! defaults, a broken one means defaults plus a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to.
    pub bind: String,
    pub port: u16,
    /// Origin the interceptor treats as same-origin.
    pub origin: String,
    /// Reserved path prefix for virtual resources.
    pub prefix: String,
    /// File request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Directory published under the prefix at startup.
    pub publish_dir: Option<PathBuf>,
    /// Fragment injected into the head of published HTML.
    pub inject: Option<String>,
    /// Run published sources through the indent formatter.
    pub format: bool,
    /// SQLite file persisting the resource store.
    pub database: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 4080,
            origin: "http://127.0.0.1:4080".to_string(),
            prefix: "/file/".to_string(),
            timeout_ms: 5000,
            publish_dir: None,
            inject: None,
            format: false,
            database: None,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from `path`.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<GatewayConfig>(&contents) {
                Ok(config) => {
                    info!("Loaded gateway config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let config = GatewayConfig::load_from(Path::new("/nonexistent/realmlink.toml"));
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 9000\nprefix = \"/assets/\"\nformat = true").unwrap();

        let config = GatewayConfig::load_from(file.path());
        assert_eq!(config.port, 9000);
        assert_eq!(config.prefix, "/assets/");
        assert!(config.format);
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn broken_file_gives_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let config = GatewayConfig::load_from(file.path());
        assert_eq!(config, GatewayConfig::default());
    }
}
