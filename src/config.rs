//! Configuration for scanning and process supervision

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::MediaError;
use crate::models::{AUDIO_EXTENSIONS, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::scanner::PathScanner;

/// Default stall timeout: a process that consumes no input for this long is killed
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval of the supervisory loop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default time the stderr reader gets to drain after the process is gone
pub const DEFAULT_STDERR_GRACE: Duration = Duration::from_secs(1);

/// Default chunk size for feeding files into a process (128 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// Extensions preserved besides the ones ffmpeg understands
const EXTRA_EXTENSIONS: &[&str] = &[
    // Docs
    "pdf",
    // Subtitles
    "srt", "idx", "sub",
    // Chiptunes
    "d64", "mod", "s3m",
];

/// How the scanner treats symbolic links
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkMode {
    /// Skip symlinks silently
    Ignore,
    /// Log an error for every symlink
    Error,
    /// Skip symlinks and warn once
    #[default]
    Warn,
    /// Follow all symlinks
    Allow,
    /// Follow symlinks to files only
    #[value(name = "allowfile")]
    AllowFile,
    /// Follow symlinks to directories only
    #[value(name = "allowdir")]
    AllowDir,
}

/// Configuration for the directory scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// File extensions to process, without the leading dot
    pub extensions: Vec<String>,

    /// Regular expressions matched against the full entry name;
    /// matching entries are excluded from processing entirely
    pub ignore_patterns: Vec<String>,

    /// Symlink policy
    pub symlinks: SymlinkMode,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: Self::default_extensions(),
            ignore_patterns: Self::default_ignore_patterns(),
            symlinks: SymlinkMode::default(),
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Get all default extensions: everything ffmpeg handles plus docs,
    /// subtitles and chiptunes
    pub fn default_extensions() -> Vec<String> {
        VIDEO_EXTENSIONS
            .iter()
            .chain(AUDIO_EXTENSIONS)
            .chain(IMAGE_EXTENSIONS)
            .chain(EXTRA_EXTENSIONS)
            .map(|s| s.to_string())
            .collect()
    }

    /// Get the default ignore patterns
    pub fn default_ignore_patterns() -> Vec<String> {
        [r"\.DS_Store", r"Thumbs\.db", r"\._.*", r".*\.par2", r".*\.filelist"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Compile the extension and ignore matchers into a scanner
    pub fn compile(&self) -> Result<PathScanner, MediaError> {
        PathScanner::new(self)
    }

    /// Split a comma separated CLI list
    pub fn split_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the extensions to process
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.config.extensions = extensions;
        self
    }

    /// Set the ignore patterns
    pub fn ignore_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.ignore_patterns = patterns;
        self
    }

    /// Add an ignore pattern
    pub fn add_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.ignore_patterns.push(pattern.into());
        self
    }

    /// Set the symlink policy
    pub fn symlinks(mut self, mode: SymlinkMode) -> Self {
        self.config.symlinks = mode;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}

/// Tuning for the forward-progress supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Longest allowed gap between two successful writes to the child
    pub stall_timeout: Duration,
    /// Sleep between two iterations of the supervisory loop
    pub poll_interval: Duration,
    /// How long the stderr reader may keep draining after the process is gone
    pub stderr_grace: Duration,
    /// Bytes written to the child per chunk
    pub chunk_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stderr_grace: DEFAULT_STDERR_GRACE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SupervisorConfig {
    /// Set the stall timeout
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stderr grace period
    pub fn with_stderr_grace(mut self, grace: Duration) -> Self {
        self.stderr_grace = grace;
        self
    }

    /// Set the chunk size; zero is bumped to one byte
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}
