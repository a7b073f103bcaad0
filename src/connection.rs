//! Connection to the player's private D-Bus session.

use tracing::debug;
use zbus::{
    connection,
    fdo::PropertiesProxy,
    names::InterfaceName,
    zvariant::{ObjectPath, OwnedValue, Value},
};

use crate::{
    error::{PlayerError, Result},
    proxy::{
        DEFAULT_SERVICE_NAME, MEDIA_PLAYER_PATH, MediaPlayer2PlayerProxy, MediaPlayer2Proxy,
        PLAYER_INTERFACE,
    },
};

/// Track reference sent with track-addressed methods; the player ignores it.
const TRACK_PLACEHOLDER: &str = "/not/used";

/// The remote surface the controller drives.
///
/// Mirrors the player's wrapped interfaces one to one; implemented for a
/// live [`PlayerConnection`]. Offsets and positions are in microseconds,
/// volume is the player's linear gain. The controller layers its unit
/// conversions, liveness guard, and event dispatch on top.
#[allow(async_fn_in_trait, missing_docs, clippy::missing_errors_doc)]
pub trait PlayerRemote {
    // org.mpris.MediaPlayer2.Player methods
    async fn play_pause(&self) -> Result<()>;
    async fn pause(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    async fn seek(&self, offset_micros: i64) -> Result<()>;
    async fn set_position(&self, position_micros: i64) -> Result<()>;
    async fn next(&self) -> Result<()>;
    async fn previous(&self) -> Result<()>;
    async fn action(&self, key: i32) -> Result<()>;
    async fn mute(&self) -> Result<()>;
    async fn unmute(&self) -> Result<()>;
    async fn set_alpha(&self, alpha: i64) -> Result<()>;
    async fn set_aspect_mode(&self, mode: &str) -> Result<()>;
    async fn video_pos(&self, coords: &str) -> Result<()>;
    async fn set_video_crop_pos(&self, coords: &str) -> Result<()>;
    async fn hide_video(&self) -> Result<()>;
    async fn un_hide_video(&self) -> Result<()>;
    async fn list_audio(&self) -> Result<Vec<String>>;
    async fn list_video(&self) -> Result<Vec<String>>;
    async fn list_subtitles(&self) -> Result<Vec<String>>;
    async fn select_audio(&self, index: i32) -> Result<bool>;
    async fn select_subtitle(&self, index: i32) -> Result<bool>;
    async fn show_subtitles(&self) -> Result<()>;
    async fn hide_subtitles(&self) -> Result<()>;

    // org.mpris.MediaPlayer2 properties
    async fn can_quit(&self) -> Result<bool>;
    async fn can_raise(&self) -> Result<bool>;
    async fn fullscreen(&self) -> Result<bool>;
    async fn can_set_fullscreen(&self) -> Result<bool>;
    async fn has_track_list(&self) -> Result<bool>;
    async fn identity(&self) -> Result<String>;
    async fn supported_uri_schemes(&self) -> Result<Vec<String>>;

    // org.freedesktop.DBus.Properties on the player interface
    async fn player_property(&self, name: &str) -> Result<OwnedValue>;
    async fn set_player_property(&self, name: &str, value: Value<'_>) -> Result<()>;
}

/// An established connection to one player instance: the three interface
/// proxies bound against the player's MPRIS object.
///
/// Opening performs no retry of its own; the controller bounds attempts.
#[derive(Debug)]
pub struct PlayerConnection {
    root: MediaPlayer2Proxy<'static>,
    player: MediaPlayer2PlayerProxy<'static>,
    properties: PropertiesProxy<'static>,
}

impl PlayerConnection {
    /// Connect to `address` and bind the root, player, and properties
    /// proxies under `service_name` (the well-known player name when not
    /// overridden).
    ///
    /// # Errors
    /// Returns `PlayerError::ConnectionFailed` for any failure here; the
    /// player registering its bus and service name is exactly the startup
    /// race the caller's retry loop exists for.
    pub async fn open(address: &str, service_name: Option<&str>) -> Result<Self> {
        let connection = connection::Builder::address(address)
            .map_err(retriable)?
            .build()
            .await
            .map_err(retriable)?;

        let destination = service_name.unwrap_or(DEFAULT_SERVICE_NAME).to_string();

        let root = MediaPlayer2Proxy::builder(&connection)
            .destination(destination.clone())
            .map_err(retriable)?
            .build()
            .await
            .map_err(retriable)?;

        let player = MediaPlayer2PlayerProxy::builder(&connection)
            .destination(destination.clone())
            .map_err(retriable)?
            .build()
            .await
            .map_err(retriable)?;

        let properties = PropertiesProxy::builder(&connection)
            .destination(destination.clone())
            .map_err(retriable)?
            .path(MEDIA_PLAYER_PATH)
            .map_err(retriable)?
            .build()
            .await
            .map_err(retriable)?;

        debug!(address, destination, "connected to player bus");

        Ok(Self {
            root,
            player,
            properties,
        })
    }

    fn player_interface() -> Result<InterfaceName<'static>> {
        InterfaceName::try_from(PLAYER_INTERFACE).map_err(|e| PlayerError::Dbus(e.into()))
    }

    fn track_placeholder() -> Result<ObjectPath<'static>> {
        ObjectPath::try_from(TRACK_PLACEHOLDER).map_err(|e| PlayerError::Dbus(e.into()))
    }
}

impl PlayerRemote for PlayerConnection {
    async fn play_pause(&self) -> Result<()> {
        Ok(self.player.play_pause().await?)
    }

    async fn pause(&self) -> Result<()> {
        Ok(self.player.pause().await?)
    }

    async fn stop(&self) -> Result<()> {
        Ok(self.player.stop().await?)
    }

    async fn seek(&self, offset_micros: i64) -> Result<()> {
        Ok(self.player.seek(offset_micros).await?)
    }

    async fn set_position(&self, position_micros: i64) -> Result<()> {
        Ok(self
            .player
            .set_position(&Self::track_placeholder()?, position_micros)
            .await?)
    }

    async fn next(&self) -> Result<()> {
        Ok(self.player.next().await?)
    }

    async fn previous(&self) -> Result<()> {
        Ok(self.player.previous().await?)
    }

    async fn action(&self, key: i32) -> Result<()> {
        Ok(self.player.action(key).await?)
    }

    async fn mute(&self) -> Result<()> {
        Ok(self.player.mute().await?)
    }

    async fn unmute(&self) -> Result<()> {
        Ok(self.player.unmute().await?)
    }

    async fn set_alpha(&self, alpha: i64) -> Result<()> {
        Ok(self
            .player
            .set_alpha(&Self::track_placeholder()?, alpha)
            .await?)
    }

    async fn set_aspect_mode(&self, mode: &str) -> Result<()> {
        Ok(self
            .player
            .set_aspect_mode(&Self::track_placeholder()?, mode)
            .await?)
    }

    async fn video_pos(&self, coords: &str) -> Result<()> {
        Ok(self
            .player
            .video_pos(&Self::track_placeholder()?, coords)
            .await?)
    }

    async fn set_video_crop_pos(&self, coords: &str) -> Result<()> {
        Ok(self
            .player
            .set_video_crop_pos(&Self::track_placeholder()?, coords)
            .await?)
    }

    async fn hide_video(&self) -> Result<()> {
        Ok(self.player.hide_video().await?)
    }

    async fn un_hide_video(&self) -> Result<()> {
        Ok(self.player.un_hide_video().await?)
    }

    async fn list_audio(&self) -> Result<Vec<String>> {
        Ok(self.player.list_audio().await?)
    }

    async fn list_video(&self) -> Result<Vec<String>> {
        Ok(self.player.list_video().await?)
    }

    async fn list_subtitles(&self) -> Result<Vec<String>> {
        Ok(self.player.list_subtitles().await?)
    }

    async fn select_audio(&self, index: i32) -> Result<bool> {
        Ok(self.player.select_audio(index).await?)
    }

    async fn select_subtitle(&self, index: i32) -> Result<bool> {
        Ok(self.player.select_subtitle(index).await?)
    }

    async fn show_subtitles(&self) -> Result<()> {
        Ok(self.player.show_subtitles().await?)
    }

    async fn hide_subtitles(&self) -> Result<()> {
        Ok(self.player.hide_subtitles().await?)
    }

    async fn can_quit(&self) -> Result<bool> {
        Ok(self.root.can_quit().await?)
    }

    async fn can_raise(&self) -> Result<bool> {
        Ok(self.root.can_raise().await?)
    }

    async fn fullscreen(&self) -> Result<bool> {
        Ok(self.root.fullscreen().await?)
    }

    async fn can_set_fullscreen(&self) -> Result<bool> {
        Ok(self.root.can_set_fullscreen().await?)
    }

    async fn has_track_list(&self) -> Result<bool> {
        Ok(self.root.has_track_list().await?)
    }

    async fn identity(&self) -> Result<String> {
        Ok(self.root.identity().await?)
    }

    async fn supported_uri_schemes(&self) -> Result<Vec<String>> {
        Ok(self.root.supported_uri_schemes().await?)
    }

    async fn player_property(&self, name: &str) -> Result<OwnedValue> {
        self.properties
            .get(Self::player_interface()?, name)
            .await
            .map_err(|e| PlayerError::Dbus(e.into()))
    }

    async fn set_player_property(&self, name: &str, value: Value<'_>) -> Result<()> {
        self.properties
            .set(Self::player_interface()?, name, value)
            .await
            .map_err(|e| PlayerError::Dbus(e.into()))
    }
}

fn retriable(err: zbus::Error) -> PlayerError {
    PlayerError::ConnectionFailed(err.to_string())
}
