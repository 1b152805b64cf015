//! Forward-progress supervision of external tools
//!
//! A supervised tool reads one file on stdin. A writer thread pushes the
//! file into the tool chunk by chunk and stamps the time of every
//! successful write; a reader thread collects whatever the tool prints on
//! stderr. The calling thread polls the tool and kills it as stalled once
//! no write has succeeded for longer than the stall timeout. Every exit
//! path goes through the same cleanup: stdin closed, the tool's whole
//! process group killed, workers joined.
//!
//! On unix the tool leads its own process group, so helpers it forks are
//! killed with it and a terminal Ctrl-C reaches only this process. Workers
//! still stuck after the grace period (a helper that escaped the group and
//! holds a pipe open) are detached instead of joined.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::SupervisorConfig;
use crate::error::{MediaError, MediaErrorKind};
use crate::stream::ByteStream;

/// Size of a single stderr read
const STDERR_CHUNK_SIZE: usize = 4096;

/// How long cleanup waits on a worker after the tool was killed
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared flag raised when the user asks the run to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `Interrupted` once cancellation was requested
    pub fn check(&self) -> Result<(), MediaError> {
        if self.is_cancelled() {
            Err(MediaError::interrupted())
        } else {
            Ok(())
        }
    }
}

/// Reason a supervised run did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessFailure {
    #[error("failed to start process: {0}")]
    Spawn(String),
    #[error("failed to read input file: {0}")]
    Input(String),
    #[error("process failed to read the entire input")]
    BrokenInput,
    #[error("process timed out reading from input stream")]
    Stalled,
    #[error("process failed with exit code {0}")]
    ExitCode(i32),
    #[error("process was terminated by a signal")]
    Terminated,
    #[error("process wrote to error stream: {0}")]
    ErrorOutput(String),
    #[error("process failed for unknown reason: {0}")]
    Unknown(String),
}

impl ProcessFailure {
    fn from_exit(status: ExitStatus) -> Option<Self> {
        if status.success() {
            return None;
        }
        Some(match status.code() {
            Some(code) => ProcessFailure::ExitCode(code),
            None => ProcessFailure::Terminated,
        })
    }
}

/// Write-side progress shared between the writer thread and the loop
#[derive(Debug)]
struct FeedProgress {
    started: Instant,
    last_write_ms: AtomicU64,
    fraction_bits: AtomicU64,
}

impl FeedProgress {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_write_ms: AtomicU64::new(0),
            fraction_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    fn record_write(&self, fraction: f64) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_write_ms.store(now, Ordering::Release);
        self.fraction_bits.store(fraction.to_bits(), Ordering::Release);
    }

    fn complete(&self) {
        self.fraction_bits.store(1f64.to_bits(), Ordering::Release);
    }

    fn fraction(&self) -> f64 {
        f64::from_bits(self.fraction_bits.load(Ordering::Acquire))
    }

    fn since_last_write(&self) -> Duration {
        let last = Duration::from_millis(self.last_write_ms.load(Ordering::Acquire));
        self.started.elapsed().saturating_sub(last)
    }
}

fn fraction(written: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        (written as f64 / total as f64).min(1.0)
    }
}

/// Runs external tools under the forward-progress guarantee
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    config: SupervisorConfig,
    cancel: CancelToken,
}

impl Supervisor {
    /// Create a supervisor
    pub fn new(config: SupervisorConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Get the supervisor tuning
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Get the cancellation token checked by the supervisory loop
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `executable args...` with `input` piped to its stdin
    ///
    /// Returns the failures of the run in the order they were observed;
    /// an empty list means success. The only `Err` is `Interrupted`,
    /// returned after cleanup when the cancel token fires mid-run.
    ///
    /// `progress` receives the fraction of the input written so far on
    /// every loop iteration and once more after cleanup. Panics inside the
    /// callback are swallowed.
    pub fn run(
        &self,
        input: &Path,
        executable: impl AsRef<OsStr>,
        args: &[String],
        mut progress: Option<&mut dyn FnMut(f64)>,
    ) -> Result<Vec<ProcessFailure>, MediaError> {
        let executable = executable.as_ref();
        log::debug!(
            "spawning {} {} < {}",
            executable.to_string_lossy(),
            args.join(" "),
            input.display()
        );

        let feed = Arc::new(FeedProgress::new());
        let mut process = match RunningProcess::spawn(
            executable,
            args,
            input.to_path_buf(),
            Arc::clone(&feed),
            self.config.chunk_size,
        ) {
            Ok(process) => process,
            Err(failure) => return Ok(vec![failure]),
        };

        let mut failures = Vec::new();
        let mut interrupted = false;
        loop {
            report(&mut progress, feed.fraction());

            if feed.since_last_write() > self.config.stall_timeout {
                failures.push(ProcessFailure::Stalled);
                break;
            }

            process.poll_threads();

            match process.try_wait() {
                Ok(Some(status)) => {
                    failures.extend(ProcessFailure::from_exit(status));
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    failures.push(ProcessFailure::Unknown(e.to_string()));
                    break;
                }
            }

            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            thread::sleep(self.config.poll_interval);
        }

        let (writer_failure, stderr) = process.finish(self.config.stderr_grace);
        // A Ctrl-C can end the tool before the loop sees the token
        interrupted |= self.cancel.is_cancelled();
        failures.extend(writer_failure);
        report(&mut progress, feed.fraction());
        if !stderr.is_empty() {
            let text = String::from_utf8_lossy(&stderr);
            failures.push(ProcessFailure::ErrorOutput(text.trim_end().to_string()));
        }

        if interrupted {
            log::debug!("supervised run of {} interrupted", input.display());
            return Err(MediaError::interrupted());
        }
        Ok(failures)
    }
}

/// One-shot form of [`Supervisor::run`]
pub fn supervise(
    input: &Path,
    executable: impl AsRef<OsStr>,
    args: &[String],
    config: &SupervisorConfig,
    cancel: &CancelToken,
    progress: Option<&mut dyn FnMut(f64)>,
) -> Result<Vec<ProcessFailure>, MediaError> {
    Supervisor::new(*config, cancel.clone()).run(input, executable, args, progress)
}

fn report(callback: &mut Option<&mut dyn FnMut(f64)>, value: f64) {
    if let Some(callback) = callback.as_mut() {
        let _ = panic::catch_unwind(AssertUnwindSafe(|| (*callback)(value)));
    }
}

/// Child process plus its two worker threads
///
/// Dropping it runs the same cleanup as `finish` with a short join
/// deadline, so an unwinding caller never leaks the child.
struct RunningProcess {
    child: Option<Child>,
    stdin: Arc<ByteStream>,
    stderr: Arc<ByteStream>,
    writer: Option<JoinHandle<Option<ProcessFailure>>>,
    reader: Option<JoinHandle<Vec<u8>>>,
    writer_failure: Option<ProcessFailure>,
    stderr_output: Vec<u8>,
}

impl RunningProcess {
    fn spawn(
        executable: &OsStr,
        args: &[String],
        input: PathBuf,
        feed: Arc<FeedProgress>,
        chunk_size: usize,
    ) -> Result<Self, ProcessFailure> {
        let mut command = Command::new(executable);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command
            .spawn()
            .map_err(|e| ProcessFailure::Spawn(format!("{}: {}", executable.to_string_lossy(), e)))?;

        let (stdin, stderr) = match (child.stdin.take(), child.stderr.take()) {
            (Some(stdin), Some(stderr)) => (
                Arc::new(ByteStream::from_fd(stdin)),
                Arc::new(ByteStream::from_fd(stderr)),
            ),
            _ => {
                reap_in_background(child);
                return Err(ProcessFailure::Spawn("process pipes unavailable".to_string()));
            }
        };

        let mut process = Self {
            child: Some(child),
            stdin,
            stderr,
            writer: None,
            reader: None,
            writer_failure: None,
            stderr_output: Vec::new(),
        };

        let writer_stdin = Arc::clone(&process.stdin);
        process.writer = Some(
            thread::Builder::new()
                .name("automedia-stdin".to_string())
                .spawn(move || feed_input(&input, &writer_stdin, &feed, chunk_size))
                .map_err(|e| ProcessFailure::Spawn(format!("writer thread: {}", e)))?,
        );

        let reader_stderr = Arc::clone(&process.stderr);
        process.reader = Some(
            thread::Builder::new()
                .name("automedia-stderr".to_string())
                .spawn(move || drain_stream(&reader_stderr))
                .map_err(|e| ProcessFailure::Spawn(format!("reader thread: {}", e)))?,
        );

        Ok(process)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        match self.child.as_mut() {
            Some(child) => child.try_wait(),
            None => Ok(None),
        }
    }

    /// Join whichever worker already finished, without blocking
    fn poll_threads(&mut self) {
        if self.writer.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_writer();
        }
        if self.reader.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_reader();
        }
    }

    fn join_writer(&mut self) {
        if let Some(handle) = self.writer.take() {
            match handle.join() {
                Ok(failure) => self.writer_failure = failure,
                Err(_) => log::error!("stdin writer thread panicked"),
            }
        }
    }

    fn join_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            match handle.join() {
                Ok(output) => self.stderr_output = output,
                Err(_) => log::error!("stderr reader thread panicked"),
            }
        }
    }

    fn workers_running(&self) -> bool {
        self.writer.as_ref().is_some_and(|h| !h.is_finished())
            || self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Join the workers that finish before `deadline`, detach the rest
    fn join_until(&mut self, deadline: Instant) {
        while self.workers_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if self.writer.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_writer();
        }
        if self.reader.as_ref().is_some_and(JoinHandle::is_finished) {
            self.join_reader();
        }
        if self.writer.take().is_some() {
            log::warn!("stdin writer still blocked after cleanup, detaching it");
        }
        if self.reader.take().is_some() {
            log::warn!("stderr reader still blocked after cleanup, detaching it");
        }
    }

    /// Close the pipes, kill the child and join both workers
    fn finish(mut self, stderr_grace: Duration) -> (Option<ProcessFailure>, Vec<u8>) {
        self.stdin.close();
        self.kill();

        // The child is gone, so the reader normally hits end-of-stream soon;
        // let it drain what the child wrote before its pipe is closed.
        let deadline = Instant::now() + stderr_grace;
        while self.reader.as_ref().is_some_and(|h| !h.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        self.stderr.close();
        self.join_until(deadline.max(Instant::now() + WORKER_JOIN_TIMEOUT));
        (
            self.writer_failure.take(),
            std::mem::take(&mut self.stderr_output),
        )
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            kill_process_group(&child);
            if let Err(e) = child.kill() {
                log::debug!("kill of pid {} failed: {}", child.id(), e);
            }
            reap_in_background(child);
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        self.stdin.close();
        self.kill();
        self.stderr.close();
        self.join_until(Instant::now() + WORKER_JOIN_TIMEOUT);
    }
}

/// Kill every process in the group the child leads
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let Ok(pgid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; a negative pid names the group
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        log::debug!(
            "kill of process group {} failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// Wait for the child on a detached thread so termination never blocks
fn reap_in_background(mut child: Child) {
    let pid = child.id();
    let spawned = thread::Builder::new()
        .name("automedia-reaper".to_string())
        .spawn(move || {
            let _ = child.wait();
        });
    if let Err(e) = spawned {
        log::warn!("could not reap pid {}: {}", pid, e);
    }
}

/// Writer thread body: feed `input` into the child and always close stdin
fn feed_input(
    input: &Path,
    stdin: &ByteStream,
    feed: &FeedProgress,
    chunk_size: usize,
) -> Option<ProcessFailure> {
    let result = copy_into(input, stdin, feed, chunk_size);
    // Closed by the supervisor: whatever failed afterwards is cleanup noise
    let abandoned = stdin.is_closed();
    stdin.close();
    match result {
        Ok(()) => None,
        Err(_) if abandoned => None,
        Err(failure) => Some(failure),
    }
}

fn copy_into(
    input: &Path,
    stdin: &ByteStream,
    feed: &FeedProgress,
    chunk_size: usize,
) -> Result<(), ProcessFailure> {
    let input_failure = |e: std::io::Error| ProcessFailure::Input(format!("{}: {}", input.display(), e));

    let mut file = File::open(input).map_err(input_failure)?;
    let total = file.metadata().map_err(input_failure)?.len();
    let mut buffer = vec![0u8; chunk_size];
    let mut written = 0u64;

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(input_failure(e)),
        };
        stdin.write_all(&buffer[..n]).map_err(|e| match e.kind {
            MediaErrorKind::BrokenPipe => ProcessFailure::BrokenInput,
            _ => ProcessFailure::Unknown(e.message),
        })?;
        written += n as u64;
        feed.record_write(fraction(written, total));
    }

    feed.complete();
    Ok(())
}

/// Reader thread body: collect everything until end-of-stream or close
fn drain_stream(stream: &ByteStream) -> Vec<u8> {
    let mut output = Vec::new();
    let mut chunk = [0u8; STDERR_CHUNK_SIZE];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&chunk[..n]),
            Err(e) => {
                if e.kind != MediaErrorKind::StreamClosed {
                    log::debug!("stderr reader stopped: {}", e.message);
                }
                break;
            }
        }
    }
    output
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn input_file(dir: &TempDir, size: usize) -> PathBuf {
        let path = dir.path().join("input.bin");
        let mut file = File::create(&path).unwrap();
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        path
    }

    fn shell(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn quick() -> SupervisorConfig {
        SupervisorConfig::default().with_stall_timeout(Duration::from_millis(500))
    }

    fn process_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
        }
    }

    fn read_pid(path: &Path) -> u32 {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(pid) = std::fs::read_to_string(path)
                .ok()
                .and_then(|text| text.trim().parse().ok())
            {
                return pid;
            }
            assert!(Instant::now() < deadline, "no pid in {}", path.display());
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_until_gone(pid: u32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        process_gone(pid)
    }

    #[test]
    fn test_copying_tool_succeeds() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 1024 * 1024 + 17);
        let supervisor = Supervisor::new(
            SupervisorConfig::default().with_chunk_size(64 * 1024),
            CancelToken::new(),
        );

        let mut seen = Vec::new();
        let mut record = |p: f64| seen.push(p);
        let failures = supervisor
            .run(&input, "sh", &shell("cat > /dev/null"), Some(&mut record))
            .unwrap();

        assert!(failures.is_empty(), "{:?}", failures);
        assert_eq!(seen.last().copied(), Some(1.0));
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_empty_input_reports_full_progress() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 0);
        let mut last = 0.0;
        let mut record = |p: f64| last = p;
        let failures = Supervisor::default()
            .run(&input, "sh", &shell("cat > /dev/null"), Some(&mut record))
            .unwrap();
        assert!(failures.is_empty());
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_tool_that_never_reads_is_stalled_and_killed() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 4 * 1024 * 1024);
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

        let started = Instant::now();
        let failures = Supervisor::new(quick(), CancelToken::new())
            .run(&input, "sh", &shell(&script), None)
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(failures, vec![ProcessFailure::Stalled]);
        assert!(elapsed < Duration::from_secs(5), "took {:?}", elapsed);

        let pid = read_pid(&pid_file);
        assert!(wait_until_gone(pid), "pid {} still running", pid);
    }

    #[test]
    fn test_forked_helper_is_killed_with_the_tool() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 4 * 1024 * 1024);
        let pid_file = dir.path().join("helper.pid");
        let script = format!("sleep 6 & echo $! > {}; wait; true", pid_file.display());

        let started = Instant::now();
        let failures = Supervisor::new(quick(), CancelToken::new())
            .run(&input, "sh", &shell(&script), None)
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(failures, vec![ProcessFailure::Stalled]);
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);

        let helper = read_pid(&pid_file);
        assert!(wait_until_gone(helper), "helper {} still running", helper);
    }

    #[test]
    fn test_slow_steady_reader_is_not_stalled() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 1024 * 1024);
        let config = SupervisorConfig::default()
            .with_stall_timeout(Duration::from_millis(400))
            .with_chunk_size(64 * 1024);
        let script = "while [ \"$(dd bs=65536 count=1 iflag=fullblock 2>/dev/null | wc -c)\" -gt 0 ]; \
                      do sleep 0.1; done";

        let started = Instant::now();
        let failures = Supervisor::new(config, CancelToken::new())
            .run(&input, "sh", &shell(script), None)
            .unwrap();
        let elapsed = started.elapsed();

        assert!(failures.is_empty(), "{:?}", failures);
        assert!(elapsed > config.stall_timeout, "took {:?}", elapsed);
    }

    #[test]
    fn test_stall_after_small_input() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 10);
        let failures = Supervisor::new(quick(), CancelToken::new())
            .run(&input, "sh", &shell("exec sleep 30"), None)
            .unwrap();
        assert_eq!(failures, vec![ProcessFailure::Stalled]);
    }

    #[test]
    fn test_non_zero_exit_reported_once() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 1000);
        let failures = Supervisor::default()
            .run(
                &input,
                "sh",
                &shell("cat > /dev/null; echo broken >&2; exit 3"),
                None,
            )
            .unwrap();

        let exit_codes: Vec<_> = failures
            .iter()
            .filter(|f| matches!(f, ProcessFailure::ExitCode(_)))
            .collect();
        assert_eq!(exit_codes, vec![&ProcessFailure::ExitCode(3)]);
        assert!(failures.contains(&ProcessFailure::ErrorOutput("broken".to_string())));
    }

    #[test]
    fn test_stderr_on_success_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 1000);
        let failures = Supervisor::default()
            .run(
                &input,
                "sh",
                &shell("cat > /dev/null; echo 'concealing errors' >&2"),
                None,
            )
            .unwrap();
        assert_eq!(
            failures,
            vec![ProcessFailure::ErrorOutput("concealing errors".to_string())]
        );
        assert_eq!(
            failures[0].to_string(),
            "process wrote to error stream: concealing errors"
        );
    }

    #[test]
    fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 10);
        let failures = Supervisor::default()
            .run(&input, "automedia-no-such-tool", &[], None)
            .unwrap();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], ProcessFailure::Spawn(_)));
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let failures = Supervisor::default()
            .run(
                &dir.path().join("absent.mkv"),
                "sh",
                &shell("cat > /dev/null"),
                None,
            )
            .unwrap();
        assert!(failures
            .iter()
            .any(|f| matches!(f, ProcessFailure::Input(_))));
    }

    #[test]
    fn test_cancelled_run_is_interrupted() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 10);
        let cancel = CancelToken::new();
        cancel.cancel();

        let started = Instant::now();
        let err = Supervisor::new(SupervisorConfig::default(), cancel)
            .run(&input, "sh", &shell("exec sleep 30"), None)
            .unwrap_err();
        assert!(err.is_interrupted());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_interrupt_that_ends_the_tool_is_reported_as_interrupted() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 10);
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        // Slow polling so the tool is already dead when the loop next looks
        let config = SupervisorConfig::default().with_poll_interval(Duration::from_millis(300));
        let cancel = CancelToken::new();

        let remote = cancel.clone();
        let interrupter = thread::spawn(move || {
            let pid = read_pid(&pid_file);
            unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
            wait_until_gone(pid);
            remote.cancel();
        });

        let result = Supervisor::new(config, cancel).run(&input, "sh", &shell(&script), None);
        interrupter.join().unwrap();

        match result {
            Err(e) => assert!(e.is_interrupted(), "{:?}", e),
            Ok(failures) => panic!("expected an interrupt, got {:?}", failures),
        }
    }

    #[test]
    fn test_callback_panic_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 100);
        let mut explode = |_: f64| panic!("callback failure");
        let failures = Supervisor::default()
            .run(&input, "sh", &shell("cat > /dev/null"), Some(&mut explode))
            .unwrap();
        assert!(failures.is_empty());
    }

    #[test]
    fn test_supervise_uses_config() {
        let dir = TempDir::new().unwrap();
        let input = input_file(&dir, 10);
        let failures = supervise(
            &input,
            "sh",
            &shell("exec sleep 30"),
            &quick(),
            &CancelToken::new(),
            None,
        )
        .unwrap();
        assert_eq!(failures, vec![ProcessFailure::Stalled]);
    }

    #[test]
    fn test_cancel_token_check() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.clone().cancel();
        assert!(token.check().unwrap_err().is_interrupted());
    }
}
