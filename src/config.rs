//! Client-level configuration loading, covering endpoints, credentials, and channel tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::channel::ChannelSettings;

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/client.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "POLLWAVE_CONFIG_PATH";
/// Environment variable that overrides the REST base URL.
const API_URL_ENV: &str = "POLLWAVE_API_URL";
/// Environment variable that overrides the push channel URL.
const WS_URL_ENV: &str = "POLLWAVE_WS_URL";
/// Environment variable carrying the bearer token for REST calls.
const AUTH_TOKEN_ENV: &str = "POLLWAVE_AUTH_TOKEN";

/// REST base URL used when neither the config file nor the environment sets one.
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
/// Seconds between channel heartbeats.
const DEFAULT_HEARTBEAT_SECS: u64 = 30;
/// Milliseconds between channel connect and the active-poll probe.
const DEFAULT_RECOVERY_DELAY_MS: u64 = 500;
/// Cap in seconds for the reconnect backoff schedule.
const DEFAULT_MAX_BACKOFF_SECS: u64 = 10;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the client.
pub struct ClientConfig {
    /// Base URL of the platform REST API, without a trailing slash.
    pub api_base_url: String,
    /// WebSocket URL of the push channel.
    pub channel_url: String,
    /// Bearer token attached to REST calls, when present.
    pub auth_token: Option<String>,
    /// Interval between heartbeat frames while the channel is connected.
    pub heartbeat_interval: Duration,
    /// Pause between channel connect and the recovery probe.
    pub recovery_delay: Duration,
    /// Upper bound for the reconnect backoff schedule.
    pub max_backoff: Duration,
}

impl ClientConfig {
    /// Load the client configuration from disk, then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let raw = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded client configuration");
                    raw
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    RawConfig::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                RawConfig::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                RawConfig::default()
            }
        };
        Self::from_raw(raw)
    }

    /// Channel tuning derived from this configuration.
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            url: self.channel_url.clone(),
            heartbeat_interval: self.heartbeat_interval,
            max_backoff: self.max_backoff,
        }
    }

    /// Merge file values with environment overrides and fill in defaults.
    fn from_raw(raw: RawConfig) -> Self {
        let api_base_url = env_value(API_URL_ENV)
            .or(raw.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = api_base_url.trim_end_matches('/').to_string();

        // An explicit channel URL wins; otherwise it follows the REST endpoint.
        let channel_url = env_value(WS_URL_ENV)
            .or(raw.channel_url)
            .unwrap_or_else(|| derive_channel_url(&api_base_url));

        let auth_token = env_value(AUTH_TOKEN_ENV).or(raw.auth_token);

        Self {
            api_base_url,
            channel_url,
            auth_token,
            heartbeat_interval: Duration::from_secs(
                raw.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS),
            ),
            recovery_delay: Duration::from_millis(
                raw.recovery_delay_ms.unwrap_or(DEFAULT_RECOVERY_DELAY_MS),
            ),
            max_backoff: Duration::from_secs(
                raw.max_backoff_secs.unwrap_or(DEFAULT_MAX_BACKOFF_SECS),
            ),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default())
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    api_base_url: Option<String>,
    channel_url: Option<String>,
    auth_token: Option<String>,
    heartbeat_secs: Option<u64>,
    recovery_delay_ms: Option<u64>,
    max_backoff_secs: Option<u64>,
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read an environment variable, treating empty values as unset.
fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Derive the push channel URL from the REST base URL: the scheme flips from
/// `http(s)` to `ws(s)` and any `/api` suffix is dropped.
fn derive_channel_url(api_base_url: &str) -> String {
    let trimmed = api_base_url.trim_end_matches('/');
    let root = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    if let Some(rest) = root.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = root.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        root.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_url_follows_api_url() {
        assert_eq!(
            derive_channel_url("http://localhost:8080/api"),
            "ws://localhost:8080"
        );
        assert_eq!(
            derive_channel_url("https://pollwave.example.com/api/"),
            "wss://pollwave.example.com"
        );
        assert_eq!(
            derive_channel_url("https://pollwave.example.com"),
            "wss://pollwave.example.com"
        );
    }

    #[test]
    fn raw_config_fills_defaults() {
        let config = ClientConfig::from_raw(RawConfig::default());
        assert_eq!(config.channel_url, "ws://localhost:8080");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn file_values_override_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "api_base_url": "https://class.example.org/api",
                "heartbeat_secs": 10,
                "recovery_delay_ms": 50
            }"#,
        )
        .unwrap();
        let config = ClientConfig::from_raw(raw);
        assert_eq!(config.api_base_url, "https://class.example.org/api");
        assert_eq!(config.channel_url, "wss://class.example.org");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.recovery_delay, Duration::from_millis(50));
    }
}
