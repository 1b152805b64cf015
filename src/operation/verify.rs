//! Integrity verification by decoding every file with ffmpeg

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{job_name, Operation, ToolContext};
use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::models::{FileStats, MediaType};

/// Decode from stdin, fail on the first error, discard the output
pub const FFMPEG_VERIFY_ARGS: &[&str] = &["-xerror", "-v", "error", "-i", "-", "-f", "null", "-"];

/// Verifies that media files decode without errors
#[derive(Debug, Clone)]
pub struct VerifyOperation {
    tools: ToolContext,
    executable: OsString,
    args: Vec<String>,
}

impl VerifyOperation {
    /// Create a verify operation using `ffmpeg` from the PATH
    pub fn new(tools: ToolContext) -> Self {
        Self {
            tools,
            executable: OsString::from("ffmpeg"),
            args: FFMPEG_VERIFY_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Use a different ffmpeg binary
    pub fn with_executable(mut self, executable: impl Into<OsString>) -> Self {
        self.executable = executable.into();
        self
    }

    fn verify_file(
        &self,
        queue: &mut JobQueue,
        stats: &mut FileStats,
        file: &Path,
    ) -> Result<(), MediaError> {
        if MediaType::from_path(file).is_none() {
            stats.ignored += 1;
            return Ok(());
        }

        let job = queue.path().to_string();
        let failures = self.tools.run(&job, file, &self.executable, &self.args)?;
        if failures.is_empty() {
            stats.good += 1;
        } else {
            stats.bad += 1;
            for failure in failures {
                queue.error(failure.to_string());
            }
        }
        Ok(())
    }
}

impl Operation for VerifyOperation {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn initialize(&mut self, queue: &mut JobQueue, _root: &Path) -> Result<(), MediaError> {
        queue.info(format!(
            "Verifying internal consistency of media files: {} {} < [file] > /dev/null",
            self.executable.to_string_lossy(),
            self.args.join(" ")
        ));
        Ok(())
    }

    fn operate(
        &mut self,
        queue: &mut JobQueue,
        _dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError> {
        let mut stats = FileStats::default();
        for file in files {
            let name = job_name(file);
            queue.submit(Some(name.as_str()), |q| self.verify_file(q, &mut stats, file))?;
        }
        queue.wait();
        queue.info(stats.summary());
        Ok(())
    }
}
