//! Error types for automedia

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while walking and processing media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaErrorKind {
    /// Read or write on a stream that was already closed
    StreamClosed,
    /// The other end of a pipe went away
    BrokenPipe,
    /// The user cancelled the run (Ctrl-C)
    Interrupted,
    /// A directory or entry could not be read
    FilesystemError,
    /// A recovery list on disk is malformed
    RecoveryListInvalid,
    /// A job was submitted in a way that breaks the queue invariants
    InvalidJob,
    /// An extension or ignore pattern failed to compile
    InvalidPattern,
    /// The root is missing or not a directory
    InvalidRoot,
    /// Any other I/O error
    Io,
}

/// Represents an error raised by automedia
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct MediaError {
    /// The kind of error
    pub kind: MediaErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl MediaError {
    /// Create a new error
    pub fn new(kind: MediaErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// Create a closed-stream error
    pub fn stream_closed(operation: &str) -> Self {
        Self::new(
            MediaErrorKind::StreamClosed,
            None,
            format!("{} on closed stream", operation),
        )
    }

    /// Create the error that aborts the whole run after a user interrupt
    pub fn interrupted() -> Self {
        Self::new(MediaErrorKind::Interrupted, None, "Interrupted by user")
    }

    /// Create a filesystem error for an entry that could not be read
    pub fn filesystem(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::FilesystemError, Some(path), message)
    }

    /// Create a malformed recovery list error
    pub fn recovery_list_invalid(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::RecoveryListInvalid, Some(path), message)
    }

    /// Create an error for a job queue misuse
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::InvalidJob, None, message)
    }

    /// Create an error for a root that cannot be walked
    pub fn invalid_root(path: PathBuf) -> Self {
        Self::new(
            MediaErrorKind::InvalidRoot,
            Some(path.clone()),
            format!("Root must be a directory: {}", path.display()),
        )
    }

    /// Create an I/O error bound to a path
    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(MediaErrorKind::Io, path, message)
    }

    /// Attach a path to an error that was created without one
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        if self.path.is_none() {
            self.path = Some(path.into());
        }
        self
    }

    /// Whether this error is a user interrupt that must end the run
    pub fn is_interrupted(&self) -> bool {
        self.kind == MediaErrorKind::Interrupted
    }
}

impl From<std::io::Error> for MediaError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::BrokenPipe => MediaErrorKind::BrokenPipe,
            _ => MediaErrorKind::Io,
        };
        Self::new(kind, None, err.to_string())
    }
}

impl From<regex::Error> for MediaError {
    fn from(err: regex::Error) -> Self {
        Self::new(MediaErrorKind::InvalidPattern, None, err.to_string())
    }
}
