//! D-Bus proxy trait definitions for the player's MPRIS object.
//!
//! The player registers a single object at `/org/mpris/MediaPlayer2`
//! implementing the base MPRIS interface, the player interface with a set
//! of omxplayer-specific extension methods, and the standard properties
//! interface ([`zbus::fdo::PropertiesProxy`] is bound for the latter).

#![allow(missing_docs)]

use zbus::{Result, proxy, zvariant::ObjectPath};

/// Well-known service name the player registers by default.
pub const DEFAULT_SERVICE_NAME: &str = "org.mpris.MediaPlayer2.omxplayer";

/// Object path of the player's MPRIS object.
pub const MEDIA_PLAYER_PATH: &str = "/org/mpris/MediaPlayer2";

/// Interface name of the playback-control interface.
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// MPRIS MediaPlayer2 interface proxy
///
/// Capability and identity queries on the base MPRIS interface.
#[proxy(
    interface = "org.mpris.MediaPlayer2",
    default_service = "org.mpris.MediaPlayer2.omxplayer",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2 {
    /// Quit the media player application
    fn quit(&self) -> Result<()>;

    /// Whether the player can be quit
    #[zbus(property)]
    fn can_quit(&self) -> Result<bool>;

    /// Whether the player window can be raised
    #[zbus(property)]
    fn can_raise(&self) -> Result<bool>;

    /// Whether the player is in fullscreen mode
    #[zbus(property)]
    fn fullscreen(&self) -> Result<bool>;

    /// Whether the player can change fullscreen mode
    #[zbus(property)]
    fn can_set_fullscreen(&self) -> Result<bool>;

    /// Whether the player has a track list
    #[zbus(property)]
    fn has_track_list(&self) -> Result<bool>;

    /// Human-readable name of the player
    #[zbus(property)]
    fn identity(&self) -> Result<String>;

    /// URI schemes supported by the player
    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Result<Vec<String>>;
}

/// MPRIS MediaPlayer2.Player interface proxy
///
/// Transport commands plus the omxplayer extension methods (alpha, aspect
/// mode, video window/crop, stream listing and selection, key actions).
/// Track-addressed methods take a placeholder object path; the player
/// ignores it.
#[proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_service = "org.mpris.MediaPlayer2.omxplayer",
    default_path = "/org/mpris/MediaPlayer2"
)]
pub trait MediaPlayer2Player {
    /// Skip to next chapter
    fn next(&self) -> Result<()>;

    /// Skip to previous chapter
    fn previous(&self) -> Result<()>;

    /// Toggle play/pause state
    fn pause(&self) -> Result<()>;

    /// Toggle play/pause state
    fn play_pause(&self) -> Result<()>;

    /// Stop playback
    fn stop(&self) -> Result<()>;

    /// Seek by a relative offset in microseconds
    fn seek(&self, offset: i64) -> Result<()>;

    /// Set absolute playback position in microseconds
    fn set_position(&self, track_id: &ObjectPath<'_>, position: i64) -> Result<()>;

    /// Set video plane opacity, 0-255
    fn set_alpha(&self, track_id: &ObjectPath<'_>, alpha: i64) -> Result<()>;

    /// Set the aspect mode ("letterbox", "fill" or "stretch")
    fn set_aspect_mode(&self, track_id: &ObjectPath<'_>, mode: &str) -> Result<()>;

    /// Set the video window as an "x1 y1 x2 y2" string
    fn video_pos(&self, track_id: &ObjectPath<'_>, position: &str) -> Result<()>;

    /// Set the video crop rectangle as an "x1 y1 x2 y2" string
    fn set_video_crop_pos(&self, track_id: &ObjectPath<'_>, crop: &str) -> Result<()>;

    /// Hide the video plane, leaving audio running
    fn hide_video(&self) -> Result<()>;

    /// Show the video plane again
    fn un_hide_video(&self) -> Result<()>;

    /// Audio streams as "index:language:name:codec:active" strings
    fn list_audio(&self) -> Result<Vec<String>>;

    /// Video streams as "index:language:name:codec:active" strings
    fn list_video(&self) -> Result<Vec<String>>;

    /// Subtitle streams as "index:language:name:codec:active" strings
    fn list_subtitles(&self) -> Result<Vec<String>>;

    /// Select the audio stream at the given index
    fn select_audio(&self, index: i32) -> Result<bool>;

    /// Select the subtitle stream at the given index
    fn select_subtitle(&self, index: i32) -> Result<bool>;

    /// Turn subtitle rendering on
    fn show_subtitles(&self) -> Result<()>;

    /// Turn subtitle rendering off
    fn hide_subtitles(&self) -> Result<()>;

    /// Mute audio output
    fn mute(&self) -> Result<()>;

    /// Unmute audio output
    fn unmute(&self) -> Result<()>;

    /// Send a keyboard action code to the player
    fn action(&self, key: i32) -> Result<()>;
}
