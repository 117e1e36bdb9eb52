use std::str::FromStr;
use std::time::Duration;

use url::Url;
use voicemesh_core::IceServerConfig;

use crate::error::{MeshError, MeshResult};
use crate::transport::TransportConfig;

pub const ENV_SIGNALING_URL: &str = "VOICEMESH_SIGNALING_URL";
pub const ENV_ICE_SERVER_URL: &str = "VOICEMESH_ICE_SERVER_URL";
pub const ENV_ICE_SERVER_USERNAME: &str = "VOICEMESH_ICE_SERVER_USERNAME";
pub const ENV_ICE_SERVER_CREDENTIAL: &str = "VOICEMESH_ICE_SERVER_CREDENTIAL";
pub const ENV_HANDSHAKE_TIMEOUT_MS: &str = "VOICEMESH_HANDSHAKE_TIMEOUT_MS";
pub const ENV_CONNECT_ATTEMPTS: &str = "VOICEMESH_CONNECT_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "VOICEMESH_RECONNECT_DELAY_MS";

/// Settings for one mesh coordinator.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Base URL of the signaling service (`ws://` or `wss://`).
    pub signaling_url: Option<String>,
    pub transport: TransportConfig,
    /// Upper bound for one handshake attempt (upgrade plus `welcome`).
    pub handshake_timeout: Duration,
    /// Connect attempts before giving up. Never retried past this budget.
    pub connect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: None,
            transport: TransportConfig::default(),
            handshake_timeout: Duration::from_secs(10),
            connect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

impl MeshConfig {
    pub fn from_env() -> MeshResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> MeshResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.signaling_url = get(ENV_SIGNALING_URL);

        if let Some(url) = get(ENV_ICE_SERVER_URL) {
            config.transport.ice_servers = vec![IceServerConfig {
                urls: vec![url],
                username: get(ENV_ICE_SERVER_USERNAME),
                credential: get(ENV_ICE_SERVER_CREDENTIAL),
            }];
        }

        if let Some(ms) = get(ENV_HANDSHAKE_TIMEOUT_MS) {
            config.handshake_timeout = Duration::from_millis(parse(ENV_HANDSHAKE_TIMEOUT_MS, &ms)?);
        }
        if let Some(n) = get(ENV_CONNECT_ATTEMPTS) {
            config.connect_attempts = parse(ENV_CONNECT_ATTEMPTS, &n)?;
        }
        if let Some(ms) = get(ENV_RECONNECT_DELAY_MS) {
            config.reconnect_delay = Duration::from_millis(parse(ENV_RECONNECT_DELAY_MS, &ms)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> MeshResult<()> {
        if self.connect_attempts == 0 {
            return Err(MeshError::Config(format!(
                "{ENV_CONNECT_ATTEMPTS} must be at least 1"
            )));
        }
        if let Some(url) = &self.signaling_url {
            parse_signaling_url(url)?;
        }
        Ok(())
    }

    pub fn signaling_url(&self) -> MeshResult<&str> {
        self.signaling_url
            .as_deref()
            .ok_or_else(|| MeshError::Config(format!("{ENV_SIGNALING_URL} is not configured")))
    }
}

/// Parses a signaling base URL. Only `ws` and `wss` are accepted.
pub(crate) fn parse_signaling_url(raw: &str) -> MeshResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| MeshError::Config(format!("invalid signaling url {raw:?}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(MeshError::Config(format!(
            "signaling url must use ws:// or wss://, got {other}://"
        ))),
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> MeshResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| MeshError::Config(format!("{key} has invalid value {raw:?}")))
}
