//! Core data models for automedia

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video extensions ffmpeg handles
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov", "avi", "mkv", "mpeg", "mpg"];

/// Audio extensions ffmpeg handles
pub const AUDIO_EXTENSIONS: &[&str] = &["aac", "mp3", "flac", "ogg", "m4a", "wav", "wma"];

/// Image extensions ffmpeg handles
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video files (mp4, mkv, avi, etc.)
    Video,
    /// Audio files (mp3, flac, wav, etc.)
    Audio,
    /// Image files (jpg, png, gif)
    Image,
}

impl MediaType {
    /// Infer media type from file extension; `None` when ffmpeg cannot read it
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext_lower = ext.to_lowercase();
        let ext = ext_lower.as_str();
        if VIDEO_EXTENSIONS.contains(&ext) {
            Some(MediaType::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(MediaType::Audio)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(MediaType::Image)
        } else {
            None
        }
    }

    /// Infer media type from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classified listing of one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResults {
    /// Subdirectories, sorted
    pub directories: Vec<PathBuf>,
    /// Non-empty files with a configured extension, sorted
    pub files: Vec<PathBuf>,
    /// Extensions (with the dot) of files that matched nothing, sorted
    pub unknown_extensions: Vec<String>,
}

/// Per-directory outcome counters of a file operation
///
/// Owned by a single `operate` call and only read after the
/// queue has waited on every job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileStats {
    /// Files processed without failures
    pub good: u64,
    /// Files with at least one failure
    pub bad: u64,
    /// Files the operation does not handle
    pub ignored: u64,
}

impl FileStats {
    /// One-line summary as printed after each directory
    pub fn summary(&self) -> String {
        if self.ignored > 0 {
            format!(
                "{} good file(s), {} bad file(s), {} ignored file(s)",
                self.good, self.bad, self.ignored
            )
        } else if self.bad > 0 {
            format!("{} good file(s), {} bad file(s)", self.good, self.bad)
        } else {
            format!("{} good file(s)", self.good)
        }
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of directories visited
    pub directories: u64,
    /// Error lines logged anywhere in the tree
    pub errors: u64,
    /// Warning lines logged anywhere in the tree
    pub warnings: u64,
    /// Job queue misuse detected during the run
    pub defects: u64,
    /// Total run duration in milliseconds
    pub duration_ms: u64,
}

impl RunSummary {
    /// Check if the run completed without errors
    pub fn is_success(&self) -> bool {
        self.errors == 0 && self.defects == 0
    }
}
