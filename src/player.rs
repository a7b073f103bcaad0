//! The controller facade applications hold for one player session.

use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::time::sleep;
use tracing::{debug, info, instrument};
use zbus::zvariant::{OwnedValue, Value};

use crate::{
    bus::BusFinder,
    config::PlayerConfig,
    connection::{PlayerConnection, PlayerRemote},
    error::{PlayerError, Result},
    events::{EventChannel, EventKind, HandlerId, PlayerEvent},
    process::PlayerProcess,
    values::{
        self, PlaybackState, StreamInfo, TrackMetadata, gain_from_millibels, micros_from_secs,
        millibels_from_gain, secs_from_micros,
    },
};

/// Controller for one running player process.
///
/// Construction spawns the player, waits for its private bus address to
/// appear, connects with bounded retry, and binds the interface proxies.
/// Every remote operation first checks that the process is still running
/// and fails with [`PlayerError::PlayerDead`] once it is not, instead of
/// hanging on a bus that nobody serves anymore.
///
/// Remote calls go through the [`PlayerRemote`] surface, a live
/// [`PlayerConnection`] in production use.
///
/// The `is_playing` flag mirrored locally is best-effort: it tracks the
/// transitions issued through this controller and is re-derived from the
/// remote playback status by [`OmxPlayer::is_playing`]. A state change the
/// player performs on its own (end-of-file auto-stop, for instance) is
/// only picked up at the next such query. This eventual consistency is
/// inherited behavior, not a bug.
#[derive(Debug)]
pub struct OmxPlayer<R = PlayerConnection> {
    config: PlayerConfig,
    source: String,
    process: PlayerProcess,
    connection: R,
    playing: AtomicBool,
    events: EventChannel,
}

impl OmxPlayer {
    /// Spawn and connect to a player with the default configuration.
    ///
    /// # Errors
    /// Returns `PlayerError::SourceNotFound` for a local source that does
    /// not exist, or `PlayerError::ConnectionExhausted` if the player
    /// never brought up its bus endpoint.
    pub async fn new(source: impl Into<String>) -> Result<Self> {
        Self::with_config(source, PlayerConfig::default()).await
    }

    /// Spawn and connect to a player with an explicit configuration.
    ///
    /// # Errors
    /// Same as [`OmxPlayer::new`]; construction failures never return a
    /// partially usable controller, and a process that was spawned before
    /// the failure is torn down again.
    pub async fn with_config(source: impl Into<String>, config: PlayerConfig) -> Result<Self> {
        let source = source.into();
        let (process, connection) = start_session(&source, &config).await?;

        let mut player = Self {
            config,
            source,
            process,
            connection,
            // The player starts playing as soon as it is up.
            playing: AtomicBool::new(true),
            events: EventChannel::new(),
        };

        if player.config.start_paused {
            player.pause_on_start().await?;
        }
        Ok(player)
    }

    /// Replace the running session with a new source.
    ///
    /// Tears the current process and connection down completely, then
    /// runs the full spawn/connect sequence for `source`. The tracked
    /// source reflects the new value only once the new session is up.
    ///
    /// # Errors
    /// Same as construction. On failure the old session stays torn down
    /// and subsequent operations fail with `PlayerError::PlayerDead`.
    pub async fn load(&mut self, source: impl Into<String>, start_paused: bool) -> Result<()> {
        let source = source.into();
        self.process.terminate().await?;

        let (process, connection) = start_session(&source, &self.config).await?;
        self.process = process;
        self.connection = connection;
        self.source = source;
        self.playing.store(true, Ordering::Release);

        if start_paused {
            self.pause_on_start().await?;
        }
        Ok(())
    }
}

impl<R: PlayerRemote> OmxPlayer<R> {
    #[cfg(test)]
    fn from_parts(config: PlayerConfig, source: &str, process: PlayerProcess, connection: R) -> Self {
        Self {
            config,
            source: source.to_string(),
            process,
            connection,
            playing: AtomicBool::new(true),
            events: EventChannel::new(),
        }
    }

    /// Source the current session was started with.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the player process is still running.
    pub fn is_alive(&self) -> bool {
        self.process.is_alive()
    }

    /// OS process id of the player.
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Register a callback for one event kind.
    pub fn on(
        &self,
        kind: EventKind,
        callback: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.events.on(kind, callback)
    }

    /// Remove a previously registered callback.
    pub fn off(&self, id: HandlerId) -> bool {
        self.events.off(id)
    }

    /// Subscribe to events as an async stream.
    pub fn subscribe(&self) -> tokio_stream::wrappers::BroadcastStream<PlayerEvent> {
        self.events.subscribe()
    }

    /// Terminate the player process group and wait for it to exit.
    ///
    /// Safe to call repeatedly; a process that is already gone counts as
    /// successful teardown.
    ///
    /// # Errors
    /// Returns `PlayerError::Io` only for signal failures other than
    /// "no such process".
    pub async fn quit(&mut self) -> Result<()> {
        info!(source = %self.source, "quitting player");
        self.process.terminate().await
    }

    /* Transport commands */

    /// Start playback if not already playing.
    ///
    /// Idempotent: issues no remote call and fires no event when the
    /// player already reports `Playing`.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn play(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.is_playing().await? {
            return Ok(());
        }
        self.connection.play_pause().await?;
        self.playing.store(true, Ordering::Release);
        self.events.emit(PlayerEvent::Play);
        Ok(())
    }

    /// Pause playback.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn pause(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.pause().await?;
        self.playing.store(false, Ordering::Release);
        self.events.emit(PlayerEvent::Pause);
        Ok(())
    }

    /// Toggle between playing and paused, tracking the flip locally.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn play_pause(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.play_pause().await?;
        self.playing.fetch_xor(true, Ordering::AcqRel);
        Ok(())
    }

    /// Stop playback.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn stop(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.stop().await?;
        self.playing.store(false, Ordering::Release);
        self.events.emit(PlayerEvent::Stop);
        Ok(())
    }

    /// Seek by a relative offset in seconds.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn seek(&self, offset_secs: f64) -> Result<()> {
        self.ensure_alive()?;
        self.connection.seek(micros_from_secs(offset_secs)).await?;
        self.events.emit(PlayerEvent::Seek(offset_secs));
        Ok(())
    }

    /// Jump to an absolute position in seconds.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_position(&self, position_secs: f64) -> Result<()> {
        self.ensure_alive()?;
        self.connection
            .set_position(micros_from_secs(position_secs))
            .await?;
        self.events.emit(PlayerEvent::PositionChanged(position_secs));
        Ok(())
    }

    /// Skip to the next chapter.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn next(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.next().await
    }

    /// Skip to the previous chapter.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn previous(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.previous().await
    }

    /// Send a keyboard action code to the player.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn action(&self, key: i32) -> Result<()> {
        self.ensure_alive()?;
        self.connection.action(key).await
    }

    /* Playback state */

    /// Current playback status reported by the player.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn playback_status(&self) -> Result<PlaybackState> {
        let status = self.player_property_string("PlaybackStatus").await?;
        Ok(PlaybackState::from(status.as_str()))
    }

    /// Whether the player currently reports `Playing`.
    ///
    /// Queries the remote playback status and updates the locally tracked
    /// flag as a side effect; [`OmxPlayer::play`] relies on this refresh.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn is_playing(&self) -> Result<bool> {
        let playing = self.playback_status().await? == PlaybackState::Playing;
        self.playing.store(playing, Ordering::Release);
        Ok(playing)
    }

    /// Start playback and block until it ends.
    ///
    /// Polls the playback status at the configured interval. A transport
    /// failure or the process exiting while waiting is taken as "playback
    /// ended" rather than an error.
    ///
    /// # Errors
    /// Returns the errors of [`OmxPlayer::play`] for the initial call.
    pub async fn play_sync(&self) -> Result<()> {
        self.play().await?;
        debug!("waiting for playback to finish");
        loop {
            sleep(self.config.poll_interval()).await;
            match self.is_playing().await {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(PlayerError::PlayerDead) => return Ok(()),
                Err(err) => {
                    debug!(error = %err, "transport error while waiting; assuming playback ended");
                    return Ok(());
                }
            }
        }
    }

    /* Volume and rate */

    /// Current volume in millibels.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn volume(&self) -> Result<f64> {
        let gain = self.player_property_f64("Volume").await?;
        Ok(millibels_from_gain(gain))
    }

    /// Set the volume in millibels.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_volume(&self, millibels: f64) -> Result<()> {
        self.set_player_property("Volume", Value::F64(gain_from_millibels(millibels)))
            .await
    }

    /// Mute audio output.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn mute(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.mute().await
    }

    /// Unmute audio output.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn unmute(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.unmute().await
    }

    /// Current playback rate multiplier.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn rate(&self) -> Result<f64> {
        self.player_property_f64("Rate").await
    }

    /// Set the playback rate multiplier.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_rate(&self, rate: f64) -> Result<()> {
        self.set_player_property("Rate", Value::F64(rate)).await
    }

    /// Minimum supported playback rate.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn minimum_rate(&self) -> Result<f64> {
        self.player_property_f64("MinimumRate").await
    }

    /// Maximum supported playback rate.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn maximum_rate(&self) -> Result<f64> {
        self.player_property_f64("MaximumRate").await
    }

    /* Position and metadata */

    /// Current playback position in seconds.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn position(&self) -> Result<f64> {
        let micros = self.player_property_i64("Position").await?;
        Ok(secs_from_micros(micros))
    }

    /// Duration of the current source in seconds.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn duration(&self) -> Result<f64> {
        let micros = self.player_property_i64("Duration").await?;
        Ok(secs_from_micros(micros))
    }

    /// Metadata of the current source.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn metadata(&self) -> Result<TrackMetadata> {
        let value = self.player_property("Metadata").await?;
        let dict = values::decode_dict("Metadata", &value)?;
        Ok(TrackMetadata::from(dict))
    }

    /* Video geometry */

    /// Aspect ratio of the current video.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn aspect_ratio(&self) -> Result<f64> {
        self.player_property_f64("Aspect").await
    }

    /// Number of video streams in the current source.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn video_stream_count(&self) -> Result<i64> {
        self.player_property_i64("VideoStreamCount").await
    }

    /// Horizontal resolution of the current video.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn width(&self) -> Result<i64> {
        self.player_property_i64("ResWidth").await
    }

    /// Vertical resolution of the current video.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn height(&self) -> Result<i64> {
        self.player_property_i64("ResHeight").await
    }

    /// Set video plane opacity, 0 (transparent) to 255 (opaque).
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_alpha(&self, alpha: u8) -> Result<()> {
        self.ensure_alive()?;
        self.connection.set_alpha(i64::from(alpha)).await
    }

    /// Set the aspect mode: "letterbox", "fill" or "stretch".
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_aspect_mode(&self, mode: &str) -> Result<()> {
        self.ensure_alive()?;
        self.connection.set_aspect_mode(mode).await
    }

    /// Move and resize the video window to the given corner coordinates.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_video_pos(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        self.ensure_alive()?;
        self.connection
            .video_pos(&format!("{x1} {y1} {x2} {y2}"))
            .await
    }

    /// Crop the video to the given source rectangle.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn set_video_crop(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> Result<()> {
        self.ensure_alive()?;
        self.connection
            .set_video_crop_pos(&format!("{x1} {y1} {x2} {y2}"))
            .await
    }

    /// Hide the video plane, leaving audio running.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn hide_video(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.hide_video().await
    }

    /// Show the video plane again.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn show_video(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.un_hide_video().await
    }

    /* Stream selection */

    /// Audio streams as raw `index:language:name:codec:active` strings.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn list_audio(&self) -> Result<Vec<String>> {
        self.ensure_alive()?;
        self.connection.list_audio().await
    }

    /// Video streams as raw `index:language:name:codec:active` strings.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn list_video(&self) -> Result<Vec<String>> {
        self.ensure_alive()?;
        self.connection.list_video().await
    }

    /// Subtitle streams as raw `index:language:name:codec:active` strings.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn list_subtitles(&self) -> Result<Vec<String>> {
        self.ensure_alive()?;
        self.connection.list_subtitles().await
    }

    /// Audio streams, parsed.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn audio_streams(&self) -> Result<Vec<StreamInfo>> {
        Ok(values::parse_streams(&self.list_audio().await?))
    }

    /// Video streams, parsed.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn video_streams(&self) -> Result<Vec<StreamInfo>> {
        Ok(values::parse_streams(&self.list_video().await?))
    }

    /// Subtitle streams, parsed.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn subtitle_streams(&self) -> Result<Vec<StreamInfo>> {
        Ok(values::parse_streams(&self.list_subtitles().await?))
    }

    /// Select the audio stream at the given index.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn select_audio(&self, index: i32) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.select_audio(index).await
    }

    /// Select the subtitle stream at the given index.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn select_subtitle(&self, index: i32) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.select_subtitle(index).await
    }

    /// Turn subtitle rendering on.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn show_subtitles(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.show_subtitles().await
    }

    /// Turn subtitle rendering off.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn hide_subtitles(&self) -> Result<()> {
        self.ensure_alive()?;
        self.connection.hide_subtitles().await
    }

    /* Root interface capabilities */

    /// Whether the player can be quit.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_quit(&self) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.can_quit().await
    }

    /// Whether the player window can be raised.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_raise(&self) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.can_raise().await
    }

    /// Whether the player is in fullscreen mode.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn fullscreen(&self) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.fullscreen().await
    }

    /// Whether the player can change fullscreen mode.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_set_fullscreen(&self) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.can_set_fullscreen().await
    }

    /// Whether the player has a track list.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn has_track_list(&self) -> Result<bool> {
        self.ensure_alive()?;
        self.connection.has_track_list().await
    }

    /// Human-readable name of the player.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn identity(&self) -> Result<String> {
        self.ensure_alive()?;
        self.connection.identity().await
    }

    /// URI schemes the player accepts as sources.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn supported_uri_schemes(&self) -> Result<Vec<String>> {
        self.ensure_alive()?;
        self.connection.supported_uri_schemes().await
    }

    /* Player interface capabilities */

    /// Whether the player can skip forward.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_go_next(&self) -> Result<bool> {
        self.player_property_bool("CanGoNext").await
    }

    /// Whether the player can skip backward.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_go_previous(&self) -> Result<bool> {
        self.player_property_bool("CanGoPrevious").await
    }

    /// Whether the player supports seeking.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_seek(&self) -> Result<bool> {
        self.player_property_bool("CanSeek").await
    }

    /// Whether the player can be controlled at all.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_control(&self) -> Result<bool> {
        self.player_property_bool("CanControl").await
    }

    /// Whether the player can start playback.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_play(&self) -> Result<bool> {
        self.player_property_bool("CanPlay").await
    }

    /// Whether the player can pause playback.
    ///
    /// # Errors
    /// Returns `PlayerError::PlayerDead` once the process has exited.
    pub async fn can_pause(&self) -> Result<bool> {
        self.player_property_bool("CanPause").await
    }

    /* Internals */

    /// Liveness guard every remote operation passes through first.
    fn ensure_alive(&self) -> Result<()> {
        if self.process.is_alive() {
            Ok(())
        } else {
            Err(PlayerError::PlayerDead)
        }
    }

    /// Initial pause after a session came up paused; a session that
    /// cannot be paused is reaped rather than handed out running.
    async fn pause_on_start(&mut self) -> Result<()> {
        if let Err(err) = self.pause().await {
            let _ = self.process.terminate().await;
            return Err(err);
        }
        Ok(())
    }

    async fn player_property(&self, name: &'static str) -> Result<OwnedValue> {
        self.ensure_alive()?;
        self.connection.player_property(name).await
    }

    async fn set_player_property(&self, name: &'static str, value: Value<'_>) -> Result<()> {
        self.ensure_alive()?;
        self.connection.set_player_property(name, value).await
    }

    async fn player_property_bool(&self, name: &'static str) -> Result<bool> {
        let value = self.player_property(name).await?;
        values::decode_bool(name, &value)
    }

    async fn player_property_i64(&self, name: &'static str) -> Result<i64> {
        let value = self.player_property(name).await?;
        values::decode_i64(name, &value)
    }

    async fn player_property_f64(&self, name: &'static str) -> Result<f64> {
        let value = self.player_property(name).await?;
        values::decode_f64(name, &value)
    }

    async fn player_property_string(&self, name: &'static str) -> Result<String> {
        let value = self.player_property(name).await?;
        values::decode_string(name, &value)
    }
}

/// Spawn the player and establish the connection for one session.
#[instrument(skip(config))]
async fn start_session(
    source: &str,
    config: &PlayerConfig,
) -> Result<(PlayerProcess, PlayerConnection)> {
    let mut process = PlayerProcess::spawn(
        &config.binary,
        &config.args,
        source,
        config.dbus_name.as_deref(),
    )
    .await?;

    let finder = match &config.address_file {
        Some(path) => BusFinder::with_path(path),
        None => BusFinder::in_dir(&config.bus_dir),
    };

    let dbus_name = config.dbus_name.clone();
    let connected = connect_with_retry(config.connection_attempts, config.retry_delay(), || {
        let finder = finder.clone();
        let dbus_name = dbus_name.clone();
        async move {
            let address = finder.address()?;
            PlayerConnection::open(&address, dbus_name.as_deref()).await
        }
    })
    .await;

    let connection = match connected {
        Ok(connection) => connection,
        Err(err) => {
            // No session without a connection; reap the process again.
            let _ = process.terminate().await;
            return Err(err);
        }
    };

    // The player registers its endpoint slightly before it can service
    // player-interface calls; give it a moment.
    sleep(config.settle_delay()).await;

    Ok((process, connection))
}

/// Run `attempt` up to `attempts` times, sleeping `delay` between tries.
///
/// At least one attempt is always made; a bound of zero is treated as
/// one. Only retriable errors (endpoint not ready, connection refused,
/// transient IO) are retried; anything else propagates immediately.
async fn connect_with_retry<T, F, Fut>(attempts: u32, delay: Duration, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut tries: u32 = 0;
    loop {
        match attempt().await {
            Ok(value) => {
                debug!(attempt = tries + 1, "connected to player");
                return Ok(value);
            }
            Err(err) if err.is_retriable() => {
                tries += 1;
                if tries >= attempts {
                    return Err(PlayerError::ConnectionExhausted { attempts: tries });
                }
                debug!(attempt = tries, error = %err, "connection attempt failed; retrying");
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        path::Path,
        sync::{
            Arc, Mutex,
            atomic::{AtomicBool, AtomicU32, Ordering},
        },
    };

    use super::*;

    /// Remote stand-in recording every call it receives.
    #[derive(Debug, Clone, Default)]
    struct FakeRemote {
        status: Arc<Mutex<String>>,
        fail_pause: Arc<AtomicBool>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRemote {
        fn with_status(status: &str) -> Self {
            let fake = Self::default();
            *fake.status.lock().unwrap() = status.to_string();
            fake
        }

        fn record(&self, call: impl Into<String>) -> Result<()> {
            self.calls.lock().unwrap().push(call.into());
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PlayerRemote for FakeRemote {
        async fn play_pause(&self) -> Result<()> {
            self.record("play_pause")
        }

        async fn pause(&self) -> Result<()> {
            if self.fail_pause.load(Ordering::SeqCst) {
                return Err(PlayerError::ConnectionFailed("pause rejected".into()));
            }
            self.record("pause")
        }

        async fn stop(&self) -> Result<()> {
            self.record("stop")
        }

        async fn seek(&self, offset_micros: i64) -> Result<()> {
            self.record(format!("seek {offset_micros}"))
        }

        async fn set_position(&self, position_micros: i64) -> Result<()> {
            self.record(format!("set_position {position_micros}"))
        }

        async fn next(&self) -> Result<()> {
            self.record("next")
        }

        async fn previous(&self) -> Result<()> {
            self.record("previous")
        }

        async fn action(&self, key: i32) -> Result<()> {
            self.record(format!("action {key}"))
        }

        async fn mute(&self) -> Result<()> {
            self.record("mute")
        }

        async fn unmute(&self) -> Result<()> {
            self.record("unmute")
        }

        async fn set_alpha(&self, alpha: i64) -> Result<()> {
            self.record(format!("set_alpha {alpha}"))
        }

        async fn set_aspect_mode(&self, mode: &str) -> Result<()> {
            self.record(format!("set_aspect_mode {mode}"))
        }

        async fn video_pos(&self, coords: &str) -> Result<()> {
            self.record(format!("video_pos {coords}"))
        }

        async fn set_video_crop_pos(&self, coords: &str) -> Result<()> {
            self.record(format!("set_video_crop_pos {coords}"))
        }

        async fn hide_video(&self) -> Result<()> {
            self.record("hide_video")
        }

        async fn un_hide_video(&self) -> Result<()> {
            self.record("un_hide_video")
        }

        async fn list_audio(&self) -> Result<Vec<String>> {
            self.record("list_audio")?;
            Ok(Vec::new())
        }

        async fn list_video(&self) -> Result<Vec<String>> {
            self.record("list_video")?;
            Ok(Vec::new())
        }

        async fn list_subtitles(&self) -> Result<Vec<String>> {
            self.record("list_subtitles")?;
            Ok(Vec::new())
        }

        async fn select_audio(&self, index: i32) -> Result<bool> {
            self.record(format!("select_audio {index}"))?;
            Ok(true)
        }

        async fn select_subtitle(&self, index: i32) -> Result<bool> {
            self.record(format!("select_subtitle {index}"))?;
            Ok(true)
        }

        async fn show_subtitles(&self) -> Result<()> {
            self.record("show_subtitles")
        }

        async fn hide_subtitles(&self) -> Result<()> {
            self.record("hide_subtitles")
        }

        async fn can_quit(&self) -> Result<bool> {
            self.record("can_quit")?;
            Ok(true)
        }

        async fn can_raise(&self) -> Result<bool> {
            self.record("can_raise")?;
            Ok(false)
        }

        async fn fullscreen(&self) -> Result<bool> {
            self.record("fullscreen")?;
            Ok(true)
        }

        async fn can_set_fullscreen(&self) -> Result<bool> {
            self.record("can_set_fullscreen")?;
            Ok(false)
        }

        async fn has_track_list(&self) -> Result<bool> {
            self.record("has_track_list")?;
            Ok(false)
        }

        async fn identity(&self) -> Result<String> {
            self.record("identity")?;
            Ok("fake player".to_string())
        }

        async fn supported_uri_schemes(&self) -> Result<Vec<String>> {
            self.record("supported_uri_schemes")?;
            Ok(Vec::new())
        }

        async fn player_property(&self, name: &str) -> Result<OwnedValue> {
            self.record(format!("get {name}"))?;
            match name {
                "PlaybackStatus" => {
                    let status = self.status.lock().unwrap().clone();
                    OwnedValue::try_from(Value::from(status))
                        .map_err(|e| PlayerError::Dbus(e.into()))
                }
                _ => Err(PlayerError::ConnectionFailed(format!(
                    "no stand-in value for {name}"
                ))),
            }
        }

        async fn set_player_property(&self, name: &str, _value: Value<'_>) -> Result<()> {
            self.record(format!("set {name}"))
        }
    }

    /// A long-running child standing in for the player binary, fed a
    /// scratch file so the pre-spawn source check passes.
    async fn running_process(dir: &tempfile::TempDir) -> (PlayerProcess, String) {
        let media = dir.path().join("media.mp4");
        std::fs::write(&media, b"x").unwrap();
        let source = media.to_str().unwrap().to_string();
        let process = PlayerProcess::spawn(Path::new("tail"), &["-f".to_string()], &source, None)
            .await
            .unwrap();
        (process, source)
    }

    /// A child that exits immediately, reaped so the watcher has already
    /// recorded the exit.
    async fn exited_process() -> PlayerProcess {
        let mut process = PlayerProcess::spawn(Path::new("true"), &[], "fake://media", None)
            .await
            .unwrap();
        process.terminate().await.unwrap();
        process
    }

    #[tokio::test]
    async fn dead_process_fails_fast_without_remote_calls() {
        let process = exited_process().await;
        let fake = FakeRemote::with_status("Playing");
        let player =
            OmxPlayer::from_parts(PlayerConfig::default(), "fake://media", process, fake.clone());

        assert!(matches!(player.play().await, Err(PlayerError::PlayerDead)));
        assert!(matches!(player.pause().await, Err(PlayerError::PlayerDead)));
        assert!(matches!(player.stop().await, Err(PlayerError::PlayerDead)));
        assert!(matches!(
            player.set_position(1.0).await,
            Err(PlayerError::PlayerDead)
        ));
        assert!(matches!(player.volume().await, Err(PlayerError::PlayerDead)));
        assert!(matches!(
            player.list_audio().await,
            Err(PlayerError::PlayerDead)
        ));

        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn play_while_playing_issues_no_toggle_and_no_event() {
        let dir = tempfile::tempdir().unwrap();
        let (process, source) = running_process(&dir).await;
        let fake = FakeRemote::with_status("Playing");
        let mut player =
            OmxPlayer::from_parts(PlayerConfig::default(), &source, process, fake.clone());

        let plays = Arc::new(AtomicU32::new(0));
        let counted = plays.clone();
        player.on(EventKind::Play, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        player.play().await.unwrap();

        // The only remote traffic is the status refresh.
        assert_eq!(fake.calls(), vec!["get PlaybackStatus"]);
        assert_eq!(plays.load(Ordering::SeqCst), 0);

        player.quit().await.unwrap();
    }

    #[tokio::test]
    async fn play_while_paused_toggles_and_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let (process, source) = running_process(&dir).await;
        let fake = FakeRemote::with_status("Paused");
        let mut player =
            OmxPlayer::from_parts(PlayerConfig::default(), &source, process, fake.clone());

        let plays = Arc::new(AtomicU32::new(0));
        let counted = plays.clone();
        player.on(EventKind::Play, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        player.play().await.unwrap();

        assert_eq!(fake.calls(), vec!["get PlaybackStatus", "play_pause"]);
        assert_eq!(plays.load(Ordering::SeqCst), 1);

        player.quit().await.unwrap();
    }

    #[tokio::test]
    async fn set_position_reports_the_new_position_once() {
        let dir = tempfile::tempdir().unwrap();
        let (process, source) = running_process(&dir).await;
        let fake = FakeRemote::with_status("Playing");
        let mut player =
            OmxPlayer::from_parts(PlayerConfig::default(), &source, process, fake.clone());

        let seen: Arc<Mutex<Vec<PlayerEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        player.on(EventKind::PositionChanged, move |event| {
            sink.lock().unwrap().push(*event);
        });

        player.set_position(12.5).await.unwrap();

        assert_eq!(fake.calls(), vec!["set_position 12500000"]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PlayerEvent::PositionChanged(12.5)]
        );

        player.quit().await.unwrap();
    }

    #[tokio::test]
    async fn failed_initial_pause_reaps_the_process() {
        let dir = tempfile::tempdir().unwrap();
        let (process, source) = running_process(&dir).await;
        let fake = FakeRemote::with_status("Playing");
        fake.fail_pause.store(true, Ordering::SeqCst);
        let mut player = OmxPlayer::from_parts(PlayerConfig::default(), &source, process, fake);

        assert!(player.pause_on_start().await.is_err());
        assert!(!player.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_exhausts_after_configured_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();
        let started = tokio::time::Instant::now();

        let result: Result<()> = connect_with_retry(50, Duration::from_millis(50), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(PlayerError::ConnectionFailed("service not registered".into()))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(PlayerError::ConnectionExhausted { attempts: 50 })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 50);
        // 49 sleeps separate the 50 attempts; virtual time is exact.
        assert_eq!(started.elapsed(), Duration::from_millis(49 * 50));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_stops_on_non_retriable_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();
        let started = tokio::time::Instant::now();

        let result: Result<()> = connect_with_retry(50, Duration::from_millis(50), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(PlayerError::PlayerDead)
            }
        })
        .await;

        assert!(matches!(result, Err(PlayerError::PlayerDead)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_returns_first_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();

        let result = connect_with_retry(50, Duration::from_millis(50), move || {
            let counted = counted.clone();
            async move {
                if counted.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(PlayerError::ConnectionFailed("not yet".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_loop_makes_at_least_one_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();

        let result: Result<()> = connect_with_retry(0, Duration::from_millis(50), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(PlayerError::ConnectionFailed("down".into()))
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(PlayerError::ConnectionExhausted { attempts: 1 })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
