use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, Result};

/// Default number of connection attempts before giving up.
pub const DEFAULT_CONNECTION_ATTEMPTS: u32 = 50;

/// Default delay between connection attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 50;

/// Default settling delay after a successful connection, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

/// Default polling interval for address and playback-status waits,
/// in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Settings for spawning and connecting to the player process.
///
/// The defaults reproduce the stock invocation: `omxplayer <source>` with
/// the well-known service name, 50 connection attempts 50ms apart, and a
/// 500ms settling delay before the first remote call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Player binary to spawn.
    pub binary: PathBuf,

    /// Extra flags passed to the binary before the source argument.
    pub args: Vec<String>,

    /// D-Bus service name override, passed as `--dbus_name <name>`.
    ///
    /// Needed to address multiple concurrently running player instances
    /// independently. `None` uses the player's well-known name.
    pub dbus_name: Option<String>,

    /// Explicit bus address file path.
    ///
    /// `None` scans the bus directory for the newest address file.
    pub address_file: Option<PathBuf>,

    /// Directory scanned for address files when no explicit path is set.
    pub bus_dir: PathBuf,

    /// Pause playback immediately after connecting.
    pub start_paused: bool,

    /// Bound on connection attempts per spawn.
    pub connection_attempts: u32,

    /// Delay between connection attempts, in milliseconds.
    pub retry_delay_ms: u64,

    /// Delay after a successful connection before the first remote call,
    /// in milliseconds. Absorbs the player's own startup race between
    /// registering its endpoint and servicing method calls.
    pub settle_delay_ms: u64,

    /// Polling interval for address-file and playback-status waits,
    /// in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("omxplayer"),
            args: Vec::new(),
            dbus_name: None,
            address_file: None,
            bus_dir: PathBuf::from("/tmp"),
            start_paused: false,
            connection_attempts: DEFAULT_CONNECTION_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PlayerConfig {
    /// Load a configuration from a TOML file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    /// Returns `PlayerError::Config` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PlayerError::Config(format!("failed to read {path:?}: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| PlayerError::Config(format!("failed to parse {path:?}: {e}")))
    }

    /// Delay between connection attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Settling delay applied after a successful connection.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Polling interval for address-file and playback-status waits.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
