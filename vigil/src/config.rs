//! Configuration for the Vigil client.
//!
//! Supports layered configuration: explicit values, then a TOML config file
//! (`~/.config/vigil/config.toml`), then compiled defaults. A missing
//! default config file is not an error; an explicit path that does not
//! exist is.

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading client configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    connection: ConnectionFileConfig,
    idle: IdleFileConfig,
    typing: TypingFileConfig,
}

/// `[connection]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConnectionFileConfig {
    hub_url: Option<String>,
    reconnect_initial_delay_ms: Option<u64>,
    reconnect_max_delay_ms: Option<u64>,
    read_announce_interval_ms: Option<u64>,
}

/// `[idle]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdleFileConfig {
    threshold_secs: Option<u64>,
    check_interval_secs: Option<u64>,
}

/// `[typing]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TypingFileConfig {
    coalesce_window_secs: Option<u64>,
    quiet_period_secs: Option<u64>,
    expiry_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Reconnect backoff policy for the hub connection.
///
/// The supervisor starts at `initial_delay` and doubles after every failed
/// attempt, capped at `max_delay`, retrying indefinitely until shutdown.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Idle-detection tuning.
#[derive(Debug, Clone, Copy)]
pub struct IdleConfig {
    /// Inactivity duration after which the client self-demotes to
    /// Unavailable.
    pub threshold: Duration,
    /// Period of the recurring idle check.
    pub check_interval: Duration,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Typing indicator tuning.
#[derive(Debug, Clone, Copy)]
pub struct TypingConfig {
    /// Window within which repeated keystroke publishes are coalesced.
    pub coalesce_window: Duration,
    /// Quiet period after which "typing stopped" is published.
    pub quiet_period: Duration,
    /// How long a received typing signal stays valid without a refresh.
    pub expiry: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_secs(3),
            quiet_period: Duration::from_secs(4),
            expiry: Duration::from_secs(5),
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the presence hub (e.g., `ws://127.0.0.1:8080/ws`).
    pub hub_url: String,
    /// Stable identity used to bind the connection.
    pub user_id: String,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectConfig,
    /// Idle-detection tuning.
    pub idle: IdleConfig,
    /// Typing indicator tuning.
    pub typing: TypingConfig,
    /// Heartbeat interval for the "actively viewing this conversation"
    /// announcement while a conversation is open.
    pub read_announce_interval: Duration,
    /// Capacity of the subscriber event channel.
    pub event_buffer: usize,
}

impl ClientConfig {
    /// Creates a config with compiled defaults for the given hub and user.
    #[must_use]
    pub fn new(hub_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            user_id: user_id.into(),
            reconnect: ReconnectConfig::default(),
            idle: IdleConfig::default(),
            typing: TypingConfig::default(),
            read_announce_interval: Duration::from_secs(1),
            event_buffer: 256,
        }
    }

    /// Loads layered configuration: explicit file (or the default path),
    /// then compiled defaults. `user_id` always comes from the caller's
    /// identity provider, never from the file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit config file cannot be read
    /// or parsed.
    pub fn load(
        user_id: impl Into<String>,
        explicit_path: Option<&std::path::Path>,
    ) -> Result<Self, ConfigError> {
        let file = load_config_file(explicit_path)?;
        Ok(Self::resolve(user_id.into(), &file))
    }

    /// Resolve a `ClientConfig` from a parsed config file and defaults.
    fn resolve(user_id: String, file: &ConfigFile) -> Self {
        let mut config = Self::new(
            file.connection
                .hub_url
                .clone()
                .unwrap_or_else(|| "ws://127.0.0.1:8080/ws".to_string()),
            user_id,
        );
        if let Some(ms) = file.connection.reconnect_initial_delay_ms {
            config.reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.connection.reconnect_max_delay_ms {
            config.reconnect.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.connection.read_announce_interval_ms {
            config.read_announce_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = file.idle.threshold_secs {
            config.idle.threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = file.idle.check_interval_secs {
            config.idle.check_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.typing.coalesce_window_secs {
            config.typing.coalesce_window = Duration::from_secs(secs);
        }
        if let Some(secs) = file.typing.quiet_period_secs {
            config.typing.quiet_period = Duration::from_secs(secs);
        }
        if let Some(secs) = file.typing.expiry_secs {
            config.typing.expiry = Duration::from_secs(secs);
        }
        config
    }
}

/// Load and parse a TOML config file for the client.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("vigil").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
