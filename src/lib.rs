//! omxctl - control a spawned omxplayer process over its private D-Bus
//! session.
//!
//! The player publishes the address of a private bus in a file under
//! `/tmp` when it starts. This crate spawns the player, waits for that
//! address to appear, connects with bounded retry, and exposes the
//! player's MPRIS object (plus the omxplayer-specific extensions) as
//! typed async operations. A watcher task tracks the process, so calls
//! made after the player has died fail fast with a distinguished error
//! instead of stalling on a dead bus.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use omxctl::{OmxPlayer, EventKind};
//!
//! # async fn run() -> omxctl::Result<()> {
//! let mut player = OmxPlayer::new("./video.mp4").await?;
//!
//! player.on(EventKind::Pause, |_| println!("paused"));
//! player.pause().await?;
//! player.set_position(30.0).await?;
//! player.play().await?;
//!
//! player.quit().await?;
//! # Ok(())
//! # }
//! ```

/// Bus address discovery for the player's private D-Bus session.
pub mod bus;

/// Spawn and connection settings.
pub mod config;

/// Connection and interface proxy binding.
pub mod connection;

/// Error types and result alias.
pub mod error;

/// Callback dispatch for state-changing operations.
pub mod events;

/// Optional tracing subscriber setup.
pub mod logging;

/// The controller facade.
pub mod player;

/// Process spawning and liveness supervision.
pub mod process;

/// D-Bus proxy trait definitions.
pub mod proxy;

/// Remote value decoding and unit conversions.
pub mod values;

pub use bus::BusFinder;
pub use config::PlayerConfig;
pub use connection::{PlayerConnection, PlayerRemote};
pub use error::{PlayerError, Result};
pub use events::{EventChannel, EventKind, HandlerId, PlayerEvent};
pub use player::OmxPlayer;
pub use process::PlayerProcess;
pub use values::{PlaybackState, StreamInfo, TrackMetadata};
