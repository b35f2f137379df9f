//! Configuration for sessions and the relay.
//!
//! Values come from, in increasing precedence: `Default`, an optional JSON
//! file, then `NOTARY_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use notary_core::Role;
use notary_render::RenderConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::credentials::ApiCredentials;

pub const ENV_IDENTITY: &str = "NOTARY_IDENTITY";
pub const ENV_ROLE: &str = "NOTARY_ROLE";
pub const ENV_ROOM: &str = "NOTARY_ROOM";
pub const ENV_RELAY_URL: &str = "NOTARY_RELAY_URL";
pub const ENV_DOCUMENT: &str = "NOTARY_DOCUMENT";
pub const ENV_SCALE: &str = "NOTARY_SCALE";
pub const ENV_API_KEY: &str = "NOTARY_API_KEY";
pub const ENV_API_SECRET: &str = "NOTARY_API_SECRET";
pub const ENV_BIND_ADDR: &str = "NOTARY_BIND_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, value, e.to_string()))
}

// ---------------------------------------------------------------
// Session
// ---------------------------------------------------------------

/// One participant's session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub identity: String,
    pub role: Role,
    pub room: String,
    /// WebSocket URL of the relay.
    pub relay_url: String,
    /// PNG page or directory of PNG pages. `None` shows the placeholder.
    pub document: Option<PathBuf>,
    /// Render scale applied to document coordinates.
    pub scale: f32,
    pub channel_capacity: usize,
    pub join_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub credentials: Option<ApiCredentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: "notary".to_string(),
            role: Role::Notary,
            room: "notary-room".to_string(),
            relay_url: "ws://127.0.0.1:9090".to_string(),
            document: None,
            scale: 1.0,
            channel_capacity: 256,
            join_timeout_secs: 10,
            heartbeat_interval_secs: 30,
            credentials: None,
        }
    }
}

impl SessionConfig {
    pub fn new(identity: impl Into<String>, role: Role, room: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            role,
            room: room.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `NOTARY_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`.
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(ENV_IDENTITY) {
            self.identity = v;
        }
        if let Some(v) = lookup(ENV_ROLE) {
            self.role = parse_env(ENV_ROLE, &v)?;
        }
        if let Some(v) = lookup(ENV_ROOM) {
            self.room = v;
        }
        if let Some(v) = lookup(ENV_RELAY_URL) {
            self.relay_url = v;
        }
        if let Some(v) = lookup(ENV_DOCUMENT) {
            self.document = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_SCALE) {
            self.scale = parse_env(ENV_SCALE, &v)?;
        }
        if let Some(creds) = ApiCredentials::from_parts(lookup(ENV_API_KEY), lookup(ENV_API_SECRET))
        {
            self.credentials = Some(creds);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.trim().is_empty() {
            return Err(ConfigError::invalid("identity", &self.identity, "must not be empty"));
        }
        if self.room.trim().is_empty() {
            return Err(ConfigError::invalid("room", &self.room, "must not be empty"));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(ConfigError::invalid("scale", self.scale, "must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid("channel_capacity", 0, "must be at least 1"));
        }
        Ok(())
    }

    pub fn render_config(&self) -> RenderConfig {
        RenderConfig { scale: self.scale }
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

// ---------------------------------------------------------------
// Relay
// ---------------------------------------------------------------

/// WebSocket relay settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub max_peers_per_room: usize,
    /// Frames buffered per member before it starts lagging.
    pub broadcast_capacity: usize,
    pub heartbeat_interval_secs: u64,
    pub join_timeout_secs: u64,
    pub token_ttl_secs: u64,
    pub credentials: Option<ApiCredentials>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 2,
            broadcast_capacity: 256,
            heartbeat_interval_secs: 30,
            join_timeout_secs: 10,
            token_ttl_secs: 3600,
            credentials: None,
        }
    }
}

impl RelayConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = v;
        }
        if let Some(creds) = ApiCredentials::from_parts(lookup(ENV_API_KEY), lookup(ENV_API_SECRET))
        {
            self.credentials = Some(creds);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::invalid("bind_addr", &self.bind_addr, "must not be empty"));
        }
        if self.max_peers_per_room == 0 {
            return Err(ConfigError::invalid("max_peers_per_room", 0, "must be at least 1"));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::invalid("broadcast_capacity", 0, "must be at least 1"));
        }
        Ok(())
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs.max(1))
    }
}
