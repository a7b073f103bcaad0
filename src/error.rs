use std::{path::PathBuf, time::Duration};

/// Errors that can occur while spawning, connecting to, or controlling
/// the player process.
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    /// Source has no URI scheme and does not exist as a local file.
    ///
    /// Raised before any process is spawned.
    #[error("source not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// The bus address file is missing or has not been written yet.
    ///
    /// Expected while the player process is still starting up; the
    /// connection loop retries on this.
    #[error("bus address file not ready: {0:?}")]
    EndpointNotReady(PathBuf),

    /// The bus address file never became readable within the deadline.
    #[error("bus address file did not appear within {waited:?}")]
    EndpointTimeout {
        /// How long the locator polled before giving up
        waited: Duration,
    },

    /// A single connection attempt against the bus address failed.
    ///
    /// Expected while the player is still registering its service name;
    /// the connection loop retries on this.
    #[error("connection attempt failed: {0}")]
    ConnectionFailed(String),

    /// The bounded connection-retry loop was exhausted.
    ///
    /// Unrecoverable: the player process failed to bring up its D-Bus
    /// endpoint at all. Inspect the player's own diagnostic output.
    #[error("could not connect to player after {attempts} attempts")]
    ConnectionExhausted {
        /// Number of attempts made before giving up
        attempts: u32,
    },

    /// The player process has exited; no remote call was issued.
    ///
    /// Recoverable only by loading a new source into the controller.
    #[error("player process is no longer running")]
    PlayerDead,

    /// D-Bus operation failed after a connection was established.
    #[error("D-Bus operation failed: {0}")]
    Dbus(#[from] zbus::Error),

    /// A remote property carried an unexpected wire type.
    #[error("property {property} has unexpected wire type: expected {expected}, got {got}")]
    UnexpectedType {
        /// Remote property name
        property: &'static str,
        /// Expected decoded type
        expected: &'static str,
        /// Wire type actually received
        got: &'static str,
    },

    /// IO error while locating the bus address or managing the process.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PlayerError {
    /// Whether the bounded connection loop should retry after this error.
    ///
    /// Covers the failures expected while the player process is still
    /// starting up: address file not written yet, service name not
    /// registered yet, transient IO.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PlayerError::EndpointNotReady(_)
                | PlayerError::ConnectionFailed(_)
                | PlayerError::Io(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PlayerError>;
