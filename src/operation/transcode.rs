//! Audio transcoding with ffmpeg presets

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use super::{job_name, Operation, ToolContext};
use crate::error::MediaError;
use crate::jobqueue::JobQueue;
use crate::models::{FileStats, MediaType};

/// Read from stdin, overwrite the output, drop any video stream
pub const FFMPEG_TRANSCODE_BASE_ARGS: &[&str] = &["-xerror", "-v", "error", "-y", "-i", "-", "-vn"];

/// Output format presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TranscodePreset {
    #[value(name = "aac-64k")]
    Aac64k,
    #[value(name = "aac-128k")]
    Aac128k,
    #[value(name = "mp3-128k")]
    Mp3128k,
    #[value(name = "mp3-320k")]
    Mp3320k,
    #[value(name = "flac")]
    Flac,
}

impl TranscodePreset {
    /// Extension of the files this preset produces
    pub fn extension(&self) -> &'static str {
        match self {
            TranscodePreset::Aac64k | TranscodePreset::Aac128k => "m4a",
            TranscodePreset::Mp3128k | TranscodePreset::Mp3320k => "mp3",
            TranscodePreset::Flac => "flac",
        }
    }

    /// Codec arguments appended to the base arguments
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            TranscodePreset::Aac64k => &["-c:a", "aac", "-b:a", "64k", "-f", "mp4"],
            TranscodePreset::Aac128k => &["-c:a", "aac", "-b:a", "128k", "-f", "mp4"],
            TranscodePreset::Mp3128k => &["-c:a", "mp3", "-b:a", "128k", "-f", "mp3"],
            TranscodePreset::Mp3320k => &["-c:a", "mp3", "-b:a", "320k", "-f", "mp3"],
            TranscodePreset::Flac => &["-c:a", "flac", "-f", "flac"],
        }
    }
}

/// Transcodes every audio (or audio track of a video) into an output tree
/// mirroring the input tree
#[derive(Debug, Clone)]
pub struct TranscodeOperation {
    tools: ToolContext,
    executable: OsString,
    output_dir: PathBuf,
    preset: TranscodePreset,
    args: Vec<String>,
    root: Option<PathBuf>,
}

impl TranscodeOperation {
    /// Create a transcode operation using `ffmpeg` from the PATH
    pub fn new(tools: ToolContext, output_dir: PathBuf, preset: TranscodePreset) -> Self {
        let args = FFMPEG_TRANSCODE_BASE_ARGS
            .iter()
            .chain(preset.args())
            .map(|s| s.to_string())
            .collect();
        Self {
            tools,
            executable: OsString::from("ffmpeg"),
            output_dir,
            preset,
            args,
            root: None,
        }
    }

    /// Use a different ffmpeg binary
    pub fn with_executable(mut self, executable: impl Into<OsString>) -> Self {
        self.executable = executable.into();
        self
    }

    /// Where the transcoded version of `file` goes
    pub fn output_path(&self, file: &Path) -> PathBuf {
        let relative = self
            .root
            .as_deref()
            .and_then(|root| file.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(job_name(file)));
        self.output_dir
            .join(relative)
            .with_extension(self.preset.extension())
    }

    fn transcode_file(
        &self,
        queue: &mut JobQueue,
        stats: &mut FileStats,
        file: &Path,
    ) -> Result<(), MediaError> {
        match MediaType::from_path(file) {
            Some(MediaType::Audio) | Some(MediaType::Video) => {}
            _ => {
                stats.ignored += 1;
                return Ok(());
            }
        }

        queue.info("Transcoding...");
        let output = self.output_path(file);
        if let Some(parent) = output.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                stats.bad += 1;
                queue.error(format!("Failed to create {}: {}", parent.display(), e));
                return Ok(());
            }
        }

        let mut args = self.args.clone();
        args.push(output.to_string_lossy().to_string());
        let job = queue.path().to_string();
        let failures = self.tools.run(&job, file, &self.executable, &args)?;

        let mut ok = failures.is_empty();
        for failure in failures {
            queue.error(failure.to_string());
        }

        match (fs::metadata(file), fs::metadata(&output)) {
            (Ok(input), Ok(transcoded)) => queue.info(format!(
                "Size: {}k -> {}k",
                input.len() / 1024,
                transcoded.len() / 1024
            )),
            (_, Err(_)) => {
                ok = false;
                queue.error(format!("output file was not created: {}", output.display()));
            }
            (Err(e), Ok(_)) => queue.warning(format!("Could not stat input: {}", e)),
        }

        if ok {
            stats.good += 1;
        } else {
            stats.bad += 1;
        }
        Ok(())
    }
}

impl Operation for TranscodeOperation {
    fn name(&self) -> &'static str {
        "transcode"
    }

    fn initialize(&mut self, queue: &mut JobQueue, root: &Path) -> Result<(), MediaError> {
        queue.info(format!(
            "Transcoding files: {} {} [output-file] < [input-file]",
            self.executable.to_string_lossy(),
            self.args.join(" ")
        ));
        self.root = Some(root.to_path_buf());
        fs::create_dir_all(&self.output_dir)
            .map_err(|e| MediaError::from(e).with_path(&self.output_dir))
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
            queue.submit(Some(name.as_str()), |q| {
                self.transcode_file(q, &mut stats, file)
            })?;
        }
        queue.wait();
        queue.info(stats.summary());
        Ok(())
    }
}
