//! Media directory automation
//!
//! This library walks a tree of media files and applies an operation to the
//! files of every directory: integrity verification and transcoding through
//! a supervised ffmpeg, PAR2 parity archives, or a plain listing. Output is
//! collected per job and printed depth-first.

pub mod config;
pub mod container;
pub mod error;
pub mod jobqueue;
pub mod models;
pub mod operation;
pub mod progress;
pub mod scanner;
pub mod stream;
pub mod supervisor;
pub mod walker;

pub use config::{ScanConfig, SupervisorConfig, SymlinkMode};
pub use error::{MediaError, MediaErrorKind};
pub use jobqueue::{JobQueue, LogCrateSink, LogSink, MemorySink, Severity};
pub use models::{FileStats, MediaType, RunSummary, ScanResults};
pub use operation::{
    Operation, Par2Mode, Par2Operation, PrintFilesOperation, ToolContext, TranscodeOperation,
    TranscodePreset, VerifyOperation,
};
pub use progress::{ProgressEvent, ProgressReporter};
pub use scanner::PathScanner;
pub use stream::ByteStream;
pub use supervisor::{supervise, CancelToken, ProcessFailure, Supervisor};
pub use walker::{walk, Walker};
