use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Failure to obtain a record from the status file.
#[derive(Debug)]
pub enum ReadError {
    /// The file could not be opened (missing, permission denied, device unplugged).
    Unavailable { path: PathBuf, source: io::Error },
    /// The file opened but reading it failed part way through.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Unavailable { path, source } => {
                write!(f, "Status file {} unavailable: {}", path.display(), source)
            }
            ReadError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReadError::Unavailable { source, .. } | ReadError::Io { source, .. } => Some(source),
        }
    }
}

/// Failures of the change watcher lifecycle.
#[derive(Debug)]
pub enum WatchError {
    /// The filesystem watch could not be registered. Fatal at startup.
    Registration { path: PathBuf, source: notify::Error },
    /// The background thread could not be spawned.
    Spawn(io::Error),
    /// The background thread did not confirm it stopped in time.
    ShutdownTimeout(Duration),
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Registration { path, source } => {
                write!(f, "Failed to watch {}: {}", path.display(), source)
            }
            WatchError::Spawn(err) => write!(f, "Failed to spawn watcher thread: {}", err),
            WatchError::ShutdownTimeout(waited) => {
                write!(f, "Watcher did not stop within {} ms", waited.as_millis())
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Registration { source, .. } => Some(source),
            WatchError::Spawn(err) => Some(err),
            WatchError::ShutdownTimeout(_) => None,
        }
    }
}
