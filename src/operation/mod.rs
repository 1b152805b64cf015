//! Operations applied to the media files of each directory
//!
//! The walker hands every directory's file list to one operation.
//! Per-file operations submit one job per file under the directory's
//! queue node; parity operations treat the directory as one batch.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::progress::ProgressReporter;
use crate::supervisor::{ProcessFailure, Supervisor};

pub mod par2;
pub mod transcode;
pub mod verify;

pub use par2::{Par2Mode, Par2Operation, RecoveryList, RecoveryListState};
pub use transcode::{TranscodeOperation, TranscodePreset};
pub use verify::VerifyOperation;

/// A unit of work applied to each directory of the walk
pub trait Operation {
    /// Short name used in progress output
    fn name(&self) -> &'static str;

    /// Prepare for a walk starting at `root`; may log on the root queue
    fn initialize(&mut self, queue: &mut JobQueue, root: &Path) -> Result<(), MediaError>;

    /// Process the media `files` found directly in `dir`
    fn operate(
        &mut self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError>;
}

/// What per-file operations need to run a supervised tool
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Supervisor for the external tool
    pub supervisor: Supervisor,
    /// Progress output shared with the rest of the run
    pub progress: Arc<ProgressReporter>,
}

impl ToolContext {
    /// Create a context
    pub fn new(supervisor: Supervisor, progress: Arc<ProgressReporter>) -> Self {
        Self {
            supervisor,
            progress,
        }
    }

    /// Feed `input` to `executable args...`, reporting progress under `job`
    pub fn run(
        &self,
        job: &str,
        input: &Path,
        executable: &OsStr,
        args: &[String],
    ) -> Result<Vec<ProcessFailure>, MediaError> {
        let progress = &self.progress;
        let mut report = |fraction: f64| {
            progress.report_progress(job, fraction);
        };
        self.supervisor.run(input, executable, args, Some(&mut report))
    }
}

/// File name used as the job name of a per-file submission
pub(crate) fn job_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string_lossy().to_string())
}

/// Lists the media files of every directory
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintFilesOperation;

impl Operation for PrintFilesOperation {
    fn name(&self) -> &'static str {
        "print"
    }

    fn initialize(&mut self, _queue: &mut JobQueue, _root: &Path) -> Result<(), MediaError> {
        Ok(())
    }

    fn operate(
        &mut self,
        queue: &mut JobQueue,
        _dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError> {
        queue.info(format!("{} file(s)", files.len()));
        for file in files {
            queue.info(format!("  {}", job_name(file)));
        }
        Ok(())
    }
}
