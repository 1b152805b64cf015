//! Directory walker - applies an operation to every directory of a tree

use std::path::Path;
use std::time::Instant;

use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::models::RunSummary;
use crate::operation::Operation;
use crate::progress::ProgressReporter;
use crate::scanner::PathScanner;
use crate::supervisor::CancelToken;

/// Depth-first traversal state for one run
pub struct Walker<'a> {
    scanner: PathScanner,
    operation: &'a mut dyn Operation,
    cancel: CancelToken,
    directories: u64,
}

impl<'a> Walker<'a> {
    /// Create a walker
    pub fn new(
        scanner: PathScanner,
        operation: &'a mut dyn Operation,
        cancel: CancelToken,
    ) -> Self {
        Self {
            scanner,
            operation,
            cancel,
            directories: 0,
        }
    }

    /// Directories processed so far
    pub fn directories(&self) -> u64 {
        self.directories
    }

    /// Process `dir` in `queue`, then each subdirectory in a child job named after it
    pub fn process_directory(
        &mut self,
        queue: &mut JobQueue,
        dir: &Path,
    ) -> Result<(), MediaError> {
        self.cancel.check()?;
        self.directories += 1;

        let results = match self.scanner.scan(queue, dir) {
            Ok(results) => results,
            Err(e) => {
                queue.error(format!(
                    "Unrecoverable filesystem error while trying to read {} ({})",
                    dir.display(),
                    e.message
                ));
                return Ok(());
            }
        };

        if !results.unknown_extensions.is_empty() {
            queue.warning(format!(
                "Unknown extensions found in path: {}",
                results.unknown_extensions.join(" ")
            ));
        }
        if !results.files.is_empty() {
            self.operation.operate(queue, dir, &results.files)?;
        }
        for subdir in &results.directories {
            let name = subdir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| subdir.to_string_lossy().to_string());
            queue.submit(Some(name.as_str()), |q| self.process_directory(q, subdir))?;
        }
        queue.wait();
        Ok(())
    }
}

/// Walk the tree at `root`, applying `operation` to every directory
///
/// The operation initializes on `queue` and its lines are flushed before
/// the walk starts. Only an interrupt or a misused queue is an `Err`;
/// everything else is counted in the returned summary.
pub fn walk(
    root: &Path,
    operation: &mut dyn Operation,
    scanner: PathScanner,
    queue: &mut JobQueue,
    cancel: &CancelToken,
    progress: &ProgressReporter,
) -> Result<RunSummary, MediaError> {
    if !root.is_dir() {
        return Err(MediaError::invalid_root(root.to_path_buf()));
    }

    let start = Instant::now();
    progress.report_start(root, operation.name());
    log::debug!("walking {} with {}", root.display(), operation.name());

    operation.initialize(queue, root)?;
    queue.flush_logs();

    let mut walker = Walker::new(scanner, operation, cancel.clone());
    let result = queue.submit(None, |q| walker.process_directory(q, root));
    queue.wait();
    result?;
    // The last tool may have been ended by the same Ctrl-C
    cancel.check()?;

    let summary = RunSummary {
        directories: walker.directories(),
        errors: queue.error_count(),
        warnings: queue.warning_count(),
        defects: queue.defect_count(),
        duration_ms: start.elapsed().as_millis() as u64,
    };
    progress.report_done(&summary);
    Ok(summary)
}
