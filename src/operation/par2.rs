//! PAR2 parity archives, one per directory
//!
//! Next to the archive (`<name>.par2`, `<name>.vol*.par2`) a recovery list
//! (`<name>.filelist`) records which files the archive covers, so a later
//! run can tell whether the archive is still up to date.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::Operation;
use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::supervisor::CancelToken;

/// First line of every recovery list
pub const RECOVERY_LIST_HEADER: &str = "[media-tools-v1]";

/// Default arguments of `par2 create`
pub const DEFAULT_PAR2_CREATE_ARGS: &str = "-u -n3 -r10";

/// Default arguments of `par2 verify`
pub const DEFAULT_PAR2_VERIFY_ARGS: &str = "-N";

/// Default base name of the archive and the recovery list
pub const DEFAULT_RECOVERY_NAME: &str = "recovery";

/// File names covered by a parity archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryList {
    files: Vec<String>,
}

impl RecoveryList {
    /// Build a list from the files of a directory
    pub fn from_files(files: &[PathBuf]) -> Self {
        let mut files: Vec<String> = files
            .iter()
            .filter_map(|f| f.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .collect();
        files.sort();
        Self { files }
    }

    /// Sorted file names
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Parse the contents of the list stored at `path`
    pub fn parse(path: &Path, contents: &str) -> Result<Self, MediaError> {
        let mut lines = contents.lines();
        let header = lines.next().unwrap_or_default();
        if header.trim_end() != RECOVERY_LIST_HEADER {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(MediaError::recovery_list_invalid(
                path.to_path_buf(),
                format!(
                    "Invalid {} found (header was {}), cannot create parity files",
                    name, header
                ),
            ));
        }

        let mut files: Vec<String> = lines
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(Self { files })
    }

    /// Read the list stored at `path`
    pub fn read(path: &Path) -> Result<Self, MediaError> {
        let contents =
            fs::read_to_string(path).map_err(|e| MediaError::from(e).with_path(path))?;
        Self::parse(path, &contents)
    }

    /// Store the list at `path`
    pub fn write(&self, path: &Path) -> Result<(), MediaError> {
        let mut contents = format!("{}\n", RECOVERY_LIST_HEADER);
        for file in &self.files {
            contents.push_str(file);
            contents.push('\n');
        }
        fs::write(path, contents).map_err(|e| MediaError::from(e).with_path(path))
    }
}

/// Outcome of comparing the recovery list with the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryListState {
    /// No usable archive; one should be created
    Missing,
    /// The archive covers exactly the current files
    UpToDate,
    /// The list is unreadable; leave the directory alone
    Error,
}

/// Which par2 command an operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Par2Mode {
    Create,
    Verify,
}

impl Par2Mode {
    /// par2 subcommand
    pub fn command(&self) -> &'static str {
        match self {
            Par2Mode::Create => "create",
            Par2Mode::Verify => "verify",
        }
    }

    /// Verb used in the log
    pub fn verb(&self) -> &'static str {
        match self {
            Par2Mode::Create => "Creating",
            Par2Mode::Verify => "Verifying",
        }
    }

    /// Text par2 prints on stdout when it completed
    pub fn marker(&self) -> &'static str {
        match self {
            Par2Mode::Create => "Done",
            Par2Mode::Verify => "All files are correct",
        }
    }

    /// Arguments used when none are given on the command line
    pub fn default_args(&self) -> &'static str {
        match self {
            Par2Mode::Create => DEFAULT_PAR2_CREATE_ARGS,
            Par2Mode::Verify => DEFAULT_PAR2_VERIFY_ARGS,
        }
    }
}

/// Creates or verifies a parity archive in every directory with media
#[derive(Debug, Clone)]
pub struct Par2Operation {
    mode: Par2Mode,
    name: String,
    executable: OsString,
    cancel: CancelToken,
    root_args: Vec<String>,
}

impl Par2Operation {
    /// Create an operation running `par2 <mode> <args> -- <name> <files...>`
    pub fn new(
        mode: Par2Mode,
        args: Vec<String>,
        name: impl Into<String>,
        cancel: CancelToken,
    ) -> Self {
        let name = name.into();
        let mut root_args = vec![mode.command().to_string()];
        root_args.extend(args);
        root_args.push("--".to_string());
        root_args.push(name.clone());
        Self {
            mode,
            name,
            executable: OsString::from("par2"),
            cancel,
            root_args,
        }
    }

    /// Use a different par2 binary
    pub fn with_executable(mut self, executable: impl Into<OsString>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Create or verify
    pub fn mode(&self) -> Par2Mode {
        self.mode
    }

    fn recovery_list(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.filelist", self.name))
    }

    fn par2_index(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.par2", self.name))
    }

    /// Compare the stored recovery list of `dir` with `files`
    pub fn validate_recovery_list(
        &self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> RecoveryListState {
        let list_path = self.recovery_list(dir);
        if !self.par2_index(dir).exists() {
            if list_path.exists() {
                queue.warning("File list exists, but PAR2 does not exist");
            }
            return RecoveryListState::Missing;
        }
        if !list_path.exists() {
            return RecoveryListState::Missing;
        }

        let stored = match RecoveryList::read(&list_path) {
            Ok(stored) => stored,
            Err(e) => {
                queue.error(e.message);
                return RecoveryListState::Error;
            }
        };
        let current = RecoveryList::from_files(files);
        if stored == current {
            queue.info("PAR2 exists, and is up-to-date");
            RecoveryListState::UpToDate
        } else {
            queue.warning("PAR2 exists, but is out-of-date");
            queue.warning(format!("{:?}", stored.files()));
            queue.warning(format!("{:?}", current.files()));
            RecoveryListState::Missing
        }
    }

    /// Delete archive files left over from an earlier run
    fn remove_stale_archive(&self, queue: &mut JobQueue, dir: &Path) -> bool {
        let volume_prefix = format!("{}.vol", self.name);
        let mut stale = vec![self.par2_index(dir)];
        match fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().to_string();
                    if name.starts_with(&volume_prefix) && name.ends_with(".par2") {
                        stale.push(entry.path());
                    }
                }
            }
            Err(e) => {
                queue.error(format!("Unable to list {}: {}", dir.display(), e));
                return false;
            }
        }

        for path in stale.iter().filter(|p| p.exists()) {
            log::debug!("removing stale parity file {}", path.display());
            if let Err(e) = fs::remove_file(path) {
                queue.error(format!("Unable to remove {}: {}", path.display(), e));
                return false;
            }
        }
        true
    }

    /// Run par2 in `dir`; true when it completed cleanly
    fn run_par2(
        &self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> Result<bool, MediaError> {
        let names = files.iter().filter_map(|f| f.file_name());
        log::debug!("spawning {:?} in {}", self.executable, dir.display());
        let output = Command::new(&self.executable)
            .args(&self.root_args)
            .args(names)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output();
        self.cancel.check()?;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                queue.error(format!("Failed to run par2: {}", e));
                return Ok(false);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            queue.error(stderr.trim_end().to_string());
        } else if !stdout.contains(self.mode.marker()) {
            queue.error(stdout.trim_end().to_string());
        } else if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            queue.error(format!("PAR2 returned a non-zero errorcode: {}", code));
        } else {
            return Ok(true);
        }
        Ok(false)
    }

    fn create(
        &self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError> {
        if self.validate_recovery_list(queue, dir, files) != RecoveryListState::Missing {
            return Ok(());
        }
        if !self.remove_stale_archive(queue, dir) {
            return Ok(());
        }
        if !self.run_par2(queue, dir, files)? {
            return Ok(());
        }

        if self.par2_index(dir).exists() {
            let list_path = self.recovery_list(dir);
            match RecoveryList::from_files(files).write(&list_path) {
                Ok(()) => queue.info("Done"),
                Err(e) => queue.error(format!(
                    "Unable to write {}: {}",
                    list_path.display(),
                    e.message
                )),
            }
        } else {
            queue.warning("No PAR2 files were generated");
        }
        Ok(())
    }

    fn verify(
        &self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError> {
        if self.validate_recovery_list(queue, dir, files) != RecoveryListState::UpToDate {
            queue.warning("Unable to verify directory");
            return Ok(());
        }
        if !self.run_par2(queue, dir, files)? {
            return Ok(());
        }

        // par2 may have been asked to purge the archive after a clean verify
        if !self.par2_index(dir).exists() {
            queue.warning("PAR2 files were removed after verification");
            let list_path = self.recovery_list(dir);
            if let Err(e) = fs::remove_file(&list_path) {
                queue.error(format!("Unable to remove {}: {}", list_path.display(), e));
            }
        }
        Ok(())
    }
}

impl Operation for Par2Operation {
    fn name(&self) -> &'static str {
        match self.mode {
            Par2Mode::Create => "par2-create",
            Par2Mode::Verify => "par2-verify",
        }
    }

    fn initialize(&mut self, queue: &mut JobQueue, _root: &Path) -> Result<(), MediaError> {
        queue.info(format!(
            "{} par2 files: {} {} [files...]",
            self.mode.verb(),
            self.executable.to_string_lossy(),
            self.root_args.join(" ")
        ));
        Ok(())
    }

    fn operate(
        &mut self,
        queue: &mut JobQueue,
        dir: &Path,
        files: &[PathBuf],
    ) -> Result<(), MediaError> {
        match self.mode {
            Par2Mode::Create => self.create(queue, dir, files),
            Par2Mode::Verify => self.verify(queue, dir, files),
        }
    }
}
