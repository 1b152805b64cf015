//! Machine-readable run progress
//!
//! With `--progress`, JSON lines go to stderr next to the human-readable
//! job log: one `start` line, throttled `p` lines while tools consume their
//! input, and one `done` line carrying the run totals. Every line has a
//! sequence number and a millisecond timestamp relative to the reporter.

use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::RunSummary;

/// Default minimum interval between two `p` lines
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 200;

/// Payload of one progress line, tagged by `_t`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "_t")]
pub enum ProgressEvent {
    /// The walk begins
    #[serde(rename = "start")]
    Start { root: String, operation: String },

    /// A tool has consumed `pct` of the input of `job`
    #[serde(rename = "p")]
    Progress { job: String, pct: f64 },

    /// The walk ended
    #[serde(rename = "done")]
    Done {
        dirs: u64,
        ec: u64,
        wc: u64,
        xc: u64,
        ms: u64,
    },
}

impl ProgressEvent {
    /// Final event for a finished run
    pub fn done(summary: &RunSummary) -> Self {
        ProgressEvent::Done {
            dirs: summary.directories,
            ec: summary.errors,
            wc: summary.warnings,
            xc: summary.defects,
            ms: summary.duration_ms,
        }
    }
}

#[derive(Serialize)]
struct Line<'a> {
    seq: u64,
    ts: u64,
    #[serde(flatten)]
    event: &'a ProgressEvent,
}

/// Writes progress lines to stderr
///
/// A disabled reporter does nothing and consumes no sequence numbers, so
/// callers never need to branch on `--progress`.
#[derive(Debug)]
pub struct ProgressReporter {
    enabled: bool,
    interval: Duration,
    origin: Instant,
    seq: AtomicU64,
    last_progress: Mutex<Option<Instant>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ProgressReporter {
    /// Create a reporter that throttles `p` lines to one per `interval_ms`
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval: Duration::from_millis(interval_ms),
            origin: Instant::now(),
            seq: AtomicU64::new(0),
            last_progress: Mutex::new(None),
        }
    }

    /// Create a reporter that never prints
    pub fn disabled() -> Self {
        Self::new(false, DEFAULT_PROGRESS_INTERVAL_MS)
    }

    /// Whether `--progress` was given
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Serialize `event` as the next line, or `None` when disabled
    pub fn render(&self, event: &ProgressEvent) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let line = Line {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            ts: self.origin.elapsed().as_millis() as u64,
            event,
        };
        match serde_json::to_string(&line) {
            Ok(json) => Some(json),
            Err(e) => {
                log::debug!("dropping progress line: {}", e);
                None
            }
        }
    }

    fn emit(&self, event: &ProgressEvent) {
        if let Some(json) = self.render(event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", json);
            let _ = stderr.flush();
        }
    }

    /// Claim the next `p` slot if the interval has passed
    fn throttle(&self) -> bool {
        let mut last = match self.last_progress.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Announce the start of a walk
    pub fn report_start(&self, root: &Path, operation: &str) {
        self.emit(&ProgressEvent::Start {
            root: root.to_string_lossy().to_string(),
            operation: operation.to_string(),
        });
    }

    /// Report how much of a job's input was fed; true if a line was written
    ///
    /// A complete job (`fraction >= 1.0`) is always written.
    pub fn report_progress(&self, job: &str, fraction: f64) -> bool {
        if !self.enabled {
            return false;
        }
        if fraction < 1.0 && !self.throttle() {
            return false;
        }
        self.emit(&ProgressEvent::Progress {
            job: job.to_string(),
            pct: fraction.clamp(0.0, 1.0),
        });
        true
    }

    /// Announce the end of a walk
    pub fn report_done(&self, summary: &RunSummary) {
        self.emit(&ProgressEvent::done(summary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(reporter: &ProgressReporter, event: ProgressEvent) -> Value {
        serde_json::from_str(&reporter.render(&event).unwrap()).unwrap()
    }

    #[test]
    fn test_lines_are_tagged_and_sequenced() {
        let reporter = ProgressReporter::new(true, DEFAULT_PROGRESS_INTERVAL_MS);

        let start = parse(
            &reporter,
            ProgressEvent::Start {
                root: "/media".to_string(),
                operation: "verify".to_string(),
            },
        );
        assert_eq!(start["_t"], "start");
        assert_eq!(start["seq"], 0);
        assert_eq!(start["root"], "/media");
        assert_eq!(start["operation"], "verify");
        assert!(start["ts"].is_u64());

        let progress = parse(
            &reporter,
            ProgressEvent::Progress {
                job: "(root)/a/b.mkv".to_string(),
                pct: 0.5,
            },
        );
        assert_eq!(progress["_t"], "p");
        assert_eq!(progress["seq"], 1);
        assert_eq!(progress["job"], "(root)/a/b.mkv");
        assert_eq!(progress["pct"], 0.5);
    }

    #[test]
    fn test_done_carries_the_summary() {
        let summary = RunSummary {
            directories: 12,
            errors: 2,
            warnings: 3,
            defects: 0,
            duration_ms: 4500,
        };
        let reporter = ProgressReporter::new(true, DEFAULT_PROGRESS_INTERVAL_MS);
        let done = parse(&reporter, ProgressEvent::done(&summary));

        assert_eq!(done["_t"], "done");
        assert_eq!(done["dirs"], 12);
        assert_eq!(done["ec"], 2);
        assert_eq!(done["wc"], 3);
        assert_eq!(done["xc"], 0);
        assert_eq!(done["ms"], 4500);
    }

    #[test]
    fn test_progress_is_throttled() {
        let reporter = ProgressReporter::new(true, 50);
        assert!(reporter.report_progress("(root)/a.mkv", 0.1));
        assert!(!reporter.report_progress("(root)/a.mkv", 0.2));

        std::thread::sleep(Duration::from_millis(80));
        assert!(reporter.report_progress("(root)/a.mkv", 0.9));
    }

    #[test]
    fn test_completion_skips_the_throttle() {
        let reporter = ProgressReporter::new(true, 60_000);
        assert!(reporter.report_progress("(root)/a.mkv", 0.4));
        assert!(!reporter.report_progress("(root)/a.mkv", 0.8));
        assert!(reporter.report_progress("(root)/a.mkv", 1.0));
        assert!(!reporter.report_progress("(root)/b.mkv", 0.1));
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        assert!(!reporter.is_enabled());

        reporter.report_start(Path::new("/media"), "print");
        assert!(!reporter.report_progress("(root)", 0.5));
        reporter.report_done(&RunSummary::default());
        assert!(reporter
            .render(&ProgressEvent::done(&RunSummary::default()))
            .is_none());
        assert_eq!(reporter.seq.load(Ordering::SeqCst), 0);
    }
}
