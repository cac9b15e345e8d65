//! Client configuration.
//!
//! Settings are merged from layers, later layers overriding earlier ones
//! key-by-key:
//! 1. Built-in defaults
//! 2. Site config (`/etc/forgepkg.conf`)
//! 3. User config (`~/.config/forgepkg/config.toml`)
//! 4. An explicit `--config` override path
//!
//! The site and user layers are optional; an explicit override path must
//! exist.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

/// Effective client configuration after all layers are merged.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Hub RPC endpoint.
    pub hub_url: String,
    /// Hub web frontend, used for task info links.
    pub web_url: String,
    /// Lookaside cache upload CGI endpoint.
    pub lookaside_cgi: String,
    /// Lookaside cache download base URL.
    pub lookaside_url: String,
    /// Anonymous VCS base URL; module names are appended.
    pub anongit_url: String,
    /// Client certificate (PEM, cert + key).
    pub cert: PathBuf,
    /// CA certificate used to validate the client certificate chain.
    pub ca_cert: PathBuf,
    /// CA certificate used to validate the servers.
    pub serverca_cert: PathBuf,
    /// Digest algorithm used for lookaside blobs.
    pub lookaside_hash: String,
    /// Connect timeout for all network calls, seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout for all network calls, seconds.
    pub read_timeout_secs: u64,
    /// Sleep between task polling passes, seconds.
    pub poll_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hub_url: "https://hub.example.org/forgehub".to_string(),
            web_url: "https://hub.example.org/forge".to_string(),
            lookaside_cgi: "https://pkgs.example.org/repo/pkgs/upload.cgi".to_string(),
            lookaside_url: "https://pkgs.example.org/repo/pkgs".to_string(),
            anongit_url: "git://pkgs.example.org".to_string(),
            cert: PathBuf::from("~/.forge/client.crt"),
            ca_cert: PathBuf::from("~/.forge/clientca.crt"),
            serverca_cert: PathBuf::from("~/.forge/serverca.crt"),
            lookaside_hash: "md5".to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 300,
            poll_interval_secs: 5,
        }
    }
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ClientConfig {
    /// Load and merge all config layers.
    pub fn load(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut layers: Vec<(PathBuf, bool)> =
            vec![(PathBuf::from("/etc/forgepkg.conf"), false)];
        if let Ok(home) = env::var("HOME") {
            layers.push((
                Path::new(&home).join(".config/forgepkg/config.toml"),
                false,
            ));
        }
        if let Some(path) = override_path {
            layers.push((path.to_path_buf(), true));
        }

        let mut merged = Value::Table(toml::map::Map::new());
        for (path, required) in layers {
            if !path.exists() {
                if required {
                    return Err(ConfigError::Io {
                        source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
                        path,
                    });
                }
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let value: Value =
                text.parse()
                    .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
            merged = deep_merge(merged, value);
        }

        let mut config: ClientConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.to_string()))?;
        config.cert = expand_home(&config.cert);
        config.ca_cert = expand_home(&config.ca_cert);
        config.serverca_cert = expand_home(&config.serverca_cert);
        Ok(config)
    }
}

/// Deep merge two TOML values: tables merge by key, everything else the
/// overlay wins.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_map), Value::Table(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Table(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Expand a leading `~/` to the current user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = env::var("HOME") {
            return Path::new(&home).join(stripped);
        }
    }
    path.to_path_buf()
}
