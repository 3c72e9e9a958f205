//! Server configuration: TOML file + `PORT` env + CLI overrides.

use crate::session::DEFAULT_GRACE_PERIOD;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use termrelay_core::{RelayError, RelayResult};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            grace_period_secs: default_grace_period(),
        }
    }
}

fn default_port() -> u16 {
    10000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD.as_secs()
}

/// Values supplied on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub grace_period_secs: Option<u64>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub grace_period: Duration,
}

impl ServerConfig {
    /// Load config from TOML file, then apply `PORT` and CLI overrides.
    ///
    /// Precedence: CLI, then `PORT`, then file, then defaults.
    pub fn load(
        config_path: Option<&Path>,
        env_port: Option<&str>,
        cli: CliOverrides,
    ) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        let env_port = match env_port {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u16>()
                    .map_err(|e| RelayError::Config(format!("invalid PORT {raw:?}: {e}")))?,
            ),
            None => None,
        };

        let port = cli.port.or(env_port).unwrap_or(file_config.server.port);
        let bind = cli.bind.unwrap_or(file_config.server.bind);
        let ip: IpAddr = bind
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid bind address {bind:?}: {e}")))?;
        let grace_secs = cli
            .grace_period_secs
            .unwrap_or(file_config.server.grace_period_secs);

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            grace_period: Duration::from_secs(grace_secs),
        })
    }
}

/// Parse the TOML config text.
pub fn parse(content: &str) -> RelayResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| RelayError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
