//! Scanner module - classifies the entries of a single directory

use regex::Regex;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::{ScanConfig, SymlinkMode};
use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::models::ScanResults;

/// One-level directory scanner with compiled extension and ignore matchers
#[derive(Debug)]
pub struct PathScanner {
    extensions: Option<Regex>,
    ignored: Option<Regex>,
    symlinks: SymlinkMode,
    symlink_warned: bool,
}

impl PathScanner {
    /// Compile the matchers of `config`
    pub fn new(config: &ScanConfig) -> Result<Self, MediaError> {
        let extensions = if config.extensions.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = config
                .extensions
                .iter()
                .map(|e| format!(r"\.{}", regex::escape(e.trim_start_matches('.'))))
                .collect();
            Some(Regex::new(&format!("(?i)^(?:{})$", alternatives.join("|")))?)
        };

        let ignored = if config.ignore_patterns.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = config
                .ignore_patterns
                .iter()
                .map(|p| format!("({})", p))
                .collect();
            Some(Regex::new(&format!("^(?:{})$", alternatives.join("|")))?)
        };

        Ok(Self {
            extensions,
            ignored,
            symlinks: config.symlinks,
            symlink_warned: false,
        })
    }

    /// Whether the file's extension is one of the configured ones
    pub fn is_supported(&self, path: &Path) -> bool {
        match (&self.extensions, path.extension()) {
            (Some(regex), Some(ext)) => regex.is_match(&format!(".{}", ext.to_string_lossy())),
            _ => false,
        }
    }

    /// Whether an entry name is excluded from processing entirely
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        match &self.ignored {
            Some(regex) => regex.is_match(&name.to_string_lossy()),
            None => false,
        }
    }

    /// List `dir` and classify its entries
    ///
    /// Problems with single entries are logged on `queue` and the entry is
    /// skipped; only a directory that cannot be listed at all is an `Err`.
    pub fn scan(&mut self, queue: &mut JobQueue, dir: &Path) -> Result<ScanResults, MediaError> {
        let mut results = ScanResults::default();
        let mut unknown_extensions = BTreeSet::new();

        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(MediaError::filesystem(dir.to_path_buf(), e.to_string()));
                }
                Err(e) => {
                    let name = e
                        .path()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    queue.error(format!(
                        "Unrecoverable filesystem error while trying to read {} ({})",
                        name, e
                    ));
                    continue;
                }
            };

            if self.is_ignored(entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let mut metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    queue.error(format!(
                        "Unrecoverable filesystem error while trying to read {} ({})",
                        entry.file_name().to_string_lossy(),
                        e
                    ));
                    continue;
                }
            };

            if entry.path_is_symlink() {
                match self.symlinks {
                    SymlinkMode::Ignore => continue,
                    SymlinkMode::Error => {
                        queue.error(format!("Found unexpected symlink: {}", path.display()));
                        continue;
                    }
                    SymlinkMode::Warn => {
                        if !self.symlink_warned {
                            queue.warning(
                                "Ignoring symlinks, pass --symlinks=allow to allow this behavior",
                            );
                            self.symlink_warned = true;
                        }
                        continue;
                    }
                    SymlinkMode::Allow | SymlinkMode::AllowFile | SymlinkMode::AllowDir => {}
                }

                metadata = match std::fs::metadata(path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        queue.error(format!("Broken symlink: {} ({})", path.display(), e));
                        continue;
                    }
                };
                if metadata.is_file() && self.symlinks == SymlinkMode::AllowDir {
                    queue.error(format!(
                        "File symlink found and only directories are allowed: {}",
                        path.display()
                    ));
                    continue;
                }
                if metadata.is_dir() && self.symlinks == SymlinkMode::AllowFile {
                    queue.error(format!(
                        "Directory symlink found and only files are allowed: {}",
                        path.display()
                    ));
                    continue;
                }
            }

            if metadata.is_file() {
                // Empty files carry nothing worth verifying
                if metadata.len() == 0 {
                    continue;
                }
                if self.is_supported(path) {
                    results.files.push(path.to_path_buf());
                } else if let Some(ext) = path.extension() {
                    unknown_extensions.insert(format!(".{}", ext.to_string_lossy()));
                }
            } else if metadata.is_dir() {
                results.directories.push(path.to_path_buf());
            }
        }

        results.unknown_extensions = unknown_extensions.into_iter().collect();
        Ok(results)
    }
}
