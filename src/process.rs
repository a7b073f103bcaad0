//! Spawning and supervision of the external player process.
//!
//! The player runs in its own process group so it can be signalled as a
//! unit together with any children it forks. A watcher task observes the
//! process exit and flips the liveness flag every remote operation checks
//! before touching the bus.

use std::{
    io,
    path::Path,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{process::Command, sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::error::{PlayerError, Result};

/// Flag used to hand the service name override to the player.
const DBUS_NAME_FLAG: &str = "--dbus_name";

/// A spawned player process and its exit watcher.
///
/// Owned exclusively by one controller session. Dropping the handle sends
/// a best-effort termination signal to the process group if the player is
/// still running.
#[derive(Debug)]
pub struct PlayerProcess {
    pid: u32,
    alive: Arc<AtomicBool>,
    exit_rx: watch::Receiver<bool>,
    watcher: Option<JoinHandle<()>>,
}

impl PlayerProcess {
    /// Spawn the player with `args`, an optional service name override,
    /// and the source as final argument.
    ///
    /// stdin and stdout are redirected to a null sink; stderr is left
    /// attached so the player's startup diagnostics stay visible. The
    /// child becomes its own process group leader.
    ///
    /// # Errors
    /// Returns `PlayerError::SourceNotFound` if `source` has no URI scheme
    /// and does not exist on disk (checked before spawning), or
    /// `PlayerError::Io` if the spawn itself fails.
    pub async fn spawn(
        binary: &Path,
        args: &[String],
        source: &str,
        dbus_name: Option<&str>,
    ) -> Result<Self> {
        if !has_uri_scheme(source) && !Path::new(source).exists() {
            return Err(PlayerError::SourceNotFound(source.into()));
        }

        let mut command = Command::new(binary);
        command
            .args(invocation_args(args, source, dbus_name))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .process_group(0);

        let mut child = command.spawn()?;
        let pid = child.id().ok_or_else(|| {
            PlayerError::Io(io::Error::other("player process exited before it was observed"))
        })?;
        debug!(pid, ?binary, source, "spawned player process");

        let alive = Arc::new(AtomicBool::new(true));
        let (exit_tx, exit_rx) = watch::channel(false);

        let alive_for_watcher = alive.clone();
        let watcher = tokio::spawn(async move {
            let status = child.wait().await;
            alive_for_watcher.store(false, Ordering::Release);
            match status {
                Ok(status) => {
                    info!(pid, %status, "player process exited; remote calls will now fail");
                }
                Err(err) => warn!(pid, error = %err, "failed to reap player process"),
            }
            let _ = exit_tx.send(true);
        });

        Ok(Self {
            pid,
            alive,
            exit_rx,
            watcher: Some(watcher),
        })
    }

    /// OS process id of the player.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the watcher has observed the process exit.
    ///
    /// The watcher task is the sole writer of this flag.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Terminate the process group and wait for the exit to be observed.
    ///
    /// Safe to call repeatedly; a process group that is already gone
    /// (ESRCH) is logged and treated as successful teardown.
    ///
    /// # Errors
    /// Returns `PlayerError::Io` only for signal failures other than
    /// "no such process".
    pub async fn terminate(&mut self) -> Result<()> {
        if self.is_alive() {
            match signal_group(self.pid, libc::SIGTERM) {
                Ok(()) => debug!(pid = self.pid, "sent SIGTERM to player process group"),
                Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
                    debug!(pid = self.pid, "player process group already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let mut exit_rx = self.exit_rx.clone();
        // The watcher sends true before finishing, so a closed channel
        // here still means the exit was observed.
        let _ = exit_rx.wait_for(|exited| *exited).await;

        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.await;
        }
        Ok(())
    }
}

impl Drop for PlayerProcess {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }

        if self.is_alive() {
            match signal_group(self.pid, libc::SIGTERM) {
                Ok(()) => debug!(pid = self.pid, "terminated player process group on drop"),
                Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {}
                Err(err) => warn!(pid = self.pid, error = %err, "failed to signal player process group on drop"),
            }
        }
    }
}

/// Full argument vector for the player invocation:
/// `args + [--dbus_name <name>] + [source]`.
pub(crate) fn invocation_args(
    args: &[String],
    source: &str,
    dbus_name: Option<&str>,
) -> Vec<String> {
    let mut invocation = args.to_vec();
    if let Some(name) = dbus_name {
        invocation.push(DBUS_NAME_FLAG.to_string());
        invocation.push(name.to_string());
    }
    invocation.push(source.to_string());
    invocation
}

/// Whether `source` is a URI rather than a local path.
pub(crate) fn has_uri_scheme(source: &str) -> bool {
    match source.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Signal the process group led by `pid`.
#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: i32) -> io::Result<()> {
    // SAFETY: killpg takes plain integers and touches no memory.
    let result = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invocation_appends_source_last() {
        let args = vec!["--no-osd".to_string(), "--loop".to_string()];
        assert_eq!(
            invocation_args(&args, "./test.mp4", None),
            vec!["--no-osd", "--loop", "./test.mp4"]
        );
    }

    #[test]
    fn invocation_includes_service_name_override() {
        assert_eq!(
            invocation_args(&[], "./test.mp4", Some("org.mpris.MediaPlayer2.omxplayer.two")),
            vec![
                "--dbus_name",
                "org.mpris.MediaPlayer2.omxplayer.two",
                "./test.mp4"
            ]
        );
    }

    #[test]
    fn recognises_uri_sources() {
        assert!(has_uri_scheme("rtsp://192.168.0.1/live/stream"));
        assert!(has_uri_scheme("http://example.com/video.mp4"));
        assert!(has_uri_scheme("rtmp://host/app"));
        assert!(!has_uri_scheme("./test.mp4"));
        assert!(!has_uri_scheme("/video/test.mp4"));
        assert!(!has_uri_scheme("://missing-scheme"));
        assert!(!has_uri_scheme("1://digit-scheme"));
    }
}
