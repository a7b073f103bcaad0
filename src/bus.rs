use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{PlayerError, Result};

/// File name prefix the player uses for its bus address files.
const ADDRESS_FILE_PREFIX: &str = "omxplayerdbus";

/// Suffix of the sidecar files holding the bus daemon pid, not an address.
const PID_SUFFIX: &str = ".pid";

/// Locates the D-Bus session address a player process publishes on startup.
///
/// The player writes its private bus address to a file under the bus
/// directory on launch. With an explicit path configured, only that file
/// is consulted; otherwise the directory is scanned for address files and
/// the most recently modified one wins, so concurrent player instances
/// resolve to the newest spawn.
#[derive(Debug, Clone)]
pub struct BusFinder {
    path: Option<PathBuf>,
    bus_dir: PathBuf,
    poll_interval: Duration,
}

impl Default for BusFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl BusFinder {
    /// Finder scanning the default bus directory (`/tmp`).
    pub fn new() -> Self {
        Self {
            path: None,
            bus_dir: PathBuf::from("/tmp"),
            poll_interval: Duration::from_millis(crate::config::DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Finder reading a single explicit address file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::new()
        }
    }

    /// Finder scanning a non-default bus directory.
    pub fn in_dir(bus_dir: impl Into<PathBuf>) -> Self {
        Self {
            bus_dir: bus_dir.into(),
            ..Self::new()
        }
    }

    /// Set the polling interval used by [`BusFinder::wait_for_address`].
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Read the bus address now, without waiting.
    ///
    /// # Errors
    /// Returns `PlayerError::EndpointNotReady` if no address file exists
    /// yet or the chosen file is still empty; both are retriable while the
    /// player process is starting up.
    pub fn address(&self) -> Result<String> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => self.newest_address_file()?,
        };
        read_address(&path)
    }

    /// Poll until the address file appears and is non-empty.
    ///
    /// Polls at the configured interval until `timeout` elapses. The
    /// connection loop in the controller bounds its own attempts and uses
    /// [`BusFinder::address`] directly; this form is for callers attaching
    /// to an externally started player.
    ///
    /// # Errors
    /// Returns `PlayerError::EndpointTimeout` if no readable address
    /// appears within `timeout`; non-retriable errors propagate as-is.
    pub async fn wait_for_address(&self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.address() {
                Ok(address) => return Ok(address),
                Err(err) if err.is_retriable() => {
                    trace!(error = %err, "bus address not readable yet");
                }
                Err(err) => return Err(err),
            }

            if Instant::now() >= deadline {
                return Err(PlayerError::EndpointTimeout { waited: timeout });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Most recently modified address file in the bus directory.
    fn newest_address_file(&self) -> Result<PathBuf> {
        let entries = match fs::read_dir(&self.bus_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlayerError::EndpointNotReady(self.bus_dir.clone()));
            }
            Err(err) => return Err(err.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(ADDRESS_FILE_PREFIX) || name.ends_with(PID_SUFFIX) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let newer = newest
                .as_ref()
                .is_none_or(|(current, _)| modified > *current);
            if newer {
                newest = Some((modified, entry.path()));
            }
        }

        match newest {
            Some((_, path)) => {
                debug!(?path, "selected bus address file");
                Ok(path)
            }
            None => Err(PlayerError::EndpointNotReady(
                self.bus_dir.join(ADDRESS_FILE_PREFIX),
            )),
        }
    }
}

/// Read and trim an address file, treating an empty file as not ready.
///
/// The player creates the file before writing the address into it, so a
/// zero-length file means the write has not landed yet.
fn read_address(path: &Path) -> Result<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(PlayerError::EndpointNotReady(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    let address = contents.trim();
    if address.is_empty() {
        return Err(PlayerError::EndpointNotReady(path.to_path_buf()));
    }
    Ok(address.to_string())
}
