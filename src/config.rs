//! JSON file and URL codecs for the five-field config both CLIs share.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;
use crate::key::Key;

pub const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1";
pub const DEFAULT_LOCAL_PORT: u16 = 1080;
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8388;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "serverAddr")]
    pub server_addr: String,
    #[serde(rename = "serverPort")]
    pub server_port: u16,
    #[serde(rename = "localAddr")]
    pub local_addr: String,
    #[serde(rename = "localPort")]
    pub local_port: u16,
    /// base64url-encoded key.
    pub password: String,
}

impl Config {
    pub fn key(&self) -> Result<Key, AppError> {
        Key::decode(&self.password)
    }

    pub fn load_from_file(path: &Path) -> Result<Config, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::InvalidConfigFile(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&text).map_err(|e| AppError::InvalidConfigFile(e.to_string()))?;
        config.key()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), AppError> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::InvalidConfigFile(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Parses `http://host:port/#<base64url-key>`.
    pub fn from_url(url: &str) -> Result<Config, AppError> {
        let parsed = Url::parse(url).map_err(|e| AppError::InvalidConfigURL(e.to_string()))?;
        let server_addr = parsed
            .host_str()
            .ok_or_else(|| AppError::InvalidConfigURL("missing host".into()))?
            .to_string();
        let server_port = parsed
            .port()
            .unwrap_or(DEFAULT_SERVER_PORT);
        let password = parsed
            .fragment()
            .ok_or_else(|| AppError::InvalidConfigURL("missing key fragment".into()))?
            .to_string();
        // Validate the fragment decodes to a real key now, rather than deferring
        // the error to whoever later calls `key()`.
        Key::decode(&password).map_err(|_| AppError::InvalidConfigURL("invalid key".into()))?;

        Ok(Config {
            server_addr,
            server_port,
            local_addr: DEFAULT_LOCAL_ADDR.to_string(),
            local_port: DEFAULT_LOCAL_PORT,
            password,
        })
    }

    pub fn to_url(&self) -> String {
        format!(
            "http://{}:{}/#{}",
            self.server_addr, self.server_port, self.password
        )
    }

    /// Overlays `other`'s fields onto `self`, `other` winning field-by-field
    /// wherever it differs from `base`'s defaults for that field. Used to
    /// implement the file-then-URL-then-flags precedence chain: each call
    /// overlays a higher-precedence source onto the accumulated result.
    pub fn merge(mut self, other: &PartialConfig) -> Config {
        if let Some(v) = &other.server_addr {
            self.server_addr = v.clone();
        }
        if let Some(v) = other.server_port {
            self.server_port = v;
        }
        if let Some(v) = &other.local_addr {
            self.local_addr = v.clone();
        }
        if let Some(v) = other.local_port {
            self.local_port = v;
        }
        if let Some(v) = &other.password {
            self.password = v.clone();
        }
        self
    }
}

/// A sparse overlay used during CLI flag-precedence merging: `None` means
/// "this source didn't set the field", not "set it to empty".
#[derive(Debug, Clone, Default)]
pub struct PartialConfig {
    pub server_addr: Option<String>,
    pub server_port: Option<u16>,
    pub local_addr: Option<String>,
    pub local_port: Option<u16>,
    pub password: Option<String>,
}

impl From<&Config> for PartialConfig {
    fn from(c: &Config) -> Self {
        PartialConfig {
            server_addr: Some(c.server_addr.clone()),
            server_port: Some(c.server_port),
            local_addr: Some(c.local_addr.clone()),
            local_port: Some(c.local_port),
            password: Some(c.password.clone()),
        }
    }
}

/// Defaults for the local relay. Unlike the server side, there is no
/// sensible default for `server_addr` — it names the relay this local
/// relay tunnels to, and absence is a configuration error just like a
/// missing key.
pub fn local_defaults() -> Config {
    Config {
        server_addr: String::new(),
        server_port: DEFAULT_SERVER_PORT,
        local_addr: DEFAULT_LOCAL_ADDR.to_string(),
        local_port: DEFAULT_LOCAL_PORT,
        password: String::new(),
    }
}

pub fn server_defaults() -> Config {
    Config {
        server_addr: DEFAULT_SERVER_ADDR.to_string(),
        server_port: DEFAULT_SERVER_PORT,
        local_addr: DEFAULT_LOCAL_ADDR.to_string(),
        local_port: DEFAULT_LOCAL_PORT,
        password: String::new(),
    }
}
