//! Hierarchical job queue
//!
//! Every unit of work (the walk, a directory, a single file) runs inside
//! its own queue node. A node buffers its log lines and hands them to the
//! output sink only when the unit that owns it returns, so the output of
//! a subtree is never interleaved with its siblings. Submission is
//! sequential and depth-first.
//!
//! A node that submitted children must call [`JobQueue::wait`] before it
//! returns; forgetting to do so, or leaving buffered lines behind, is
//! reported as a defect (`X[...]` lines) and fails the run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::MediaError;

/// Display name of the root node and of anonymous nodes below it
pub const ROOT_NAME: &str = "(root)";

/// Severity of a buffered log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    /// Misuse of the queue itself
    Defect,
}

impl Severity {
    /// Single-letter prefix used in the output
    pub fn letter(&self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Defect => 'X',
        }
    }

    /// Matching level of the `log` facade
    pub fn log_level(&self) -> log::Level {
        match self {
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Defect => log::Level::Error,
        }
    }
}

/// Destination of flushed log lines
pub trait LogSink: Send + Sync {
    /// Emit one line for the node at `path`
    fn emit(&self, severity: Severity, path: &str, message: &str);
}

/// Format a line the way every sink prints it
pub fn format_line(severity: Severity, path: &str, message: &str) -> String {
    format!("{}[{}]: {}", severity.letter(), path, message)
}

/// Sink forwarding to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn emit(&self, severity: Severity, path: &str, message: &str) {
        log::log!(severity.log_level(), "{}", format_line(severity, path, message));
    }
}

/// Sink collecting lines in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl LogSink for MemorySink {
    fn emit(&self, severity: Severity, path: &str, message: &str) {
        let line = format_line(severity, path, message);
        match self.lines.lock() {
            Ok(mut lines) => lines.push(line),
            Err(poisoned) => poisoned.into_inner().push(line),
        }
    }
}

/// State shared by every node of one tree
struct QueueState {
    sink: Arc<dyn LogSink>,
    jobs: AtomicU64,
    errors: AtomicU64,
    warnings: AtomicU64,
    defects: AtomicU64,
}

/// One node of the job tree
pub struct JobQueue {
    name: Option<String>,
    path: String,
    logs: Vec<(Severity, String)>,
    children: Vec<String>,
    waited: bool,
    retired: bool,
    state: Arc<QueueState>,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("path", &self.path)
            .field("children", &self.children)
            .field("waited", &self.waited)
            .field("pending_logs", &self.logs.len())
            .finish()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Create a root queue that prints through the `log` facade
    pub fn new() -> Self {
        Self::with_sink(Arc::new(LogCrateSink))
    }

    /// Create a root queue with a custom sink
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self {
            name: None,
            path: ROOT_NAME.to_string(),
            logs: Vec::new(),
            children: Vec::new(),
            waited: false,
            retired: false,
            state: Arc::new(QueueState {
                sink,
                jobs: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                warnings: AtomicU64::new(0),
                defects: AtomicU64::new(0),
            }),
        }
    }

    fn child(&self, name: Option<&str>) -> Self {
        let path = match name {
            Some(name) => format!("{}/{}", self.path, name),
            None => ROOT_NAME.to_string(),
        };
        Self {
            name: name.map(str::to_string),
            path,
            logs: Vec::new(),
            children: Vec::new(),
            waited: false,
            retired: false,
            state: Arc::clone(&self.state),
        }
    }

    /// Run `job` in a new child node and flush its logs when it returns
    ///
    /// Only an anonymous node may submit an anonymous child. When the job
    /// fails, its logs are still flushed and the error is passed through.
    pub fn submit<T, F>(&mut self, name: Option<&str>, job: F) -> Result<T, MediaError>
    where
        F: FnOnce(&mut JobQueue) -> Result<T, MediaError>,
    {
        if name.is_none() && self.name.is_some() {
            return Err(MediaError::invalid_job(format!(
                "Queue must have a name if parent queue has a name: {}",
                self.path
            )));
        }

        let mut child = self.child(name);
        self.children.push(name.unwrap_or_default().to_string());
        self.state.jobs.fetch_add(1, Ordering::Relaxed);

        let result = job(&mut child);
        child.flush_logs();
        match result {
            Ok(value) => {
                child.retire();
                Ok(value)
            }
            Err(e) => {
                // The unit is unwinding, its bookkeeping is not meaningful
                child.retired = true;
                Err(e)
            }
        }
    }

    /// Record that this node waited on everything it submitted
    pub fn wait(&mut self) {
        self.waited = true;
    }

    /// Buffer an informational line
    pub fn info(&mut self, message: impl Into<String>) {
        self.log(Severity::Info, message.into());
    }

    /// Buffer a warning
    pub fn warning(&mut self, message: impl Into<String>) {
        self.state.warnings.fetch_add(1, Ordering::Relaxed);
        self.log(Severity::Warning, message.into());
    }

    /// Buffer an error; any error fails the run
    pub fn error(&mut self, message: impl Into<String>) {
        self.state.errors.fetch_add(1, Ordering::Relaxed);
        self.log(Severity::Error, message.into());
    }

    fn log(&mut self, severity: Severity, message: String) {
        self.logs.push((severity, message));
    }

    /// Emit and drain this node's buffered lines
    pub fn flush_logs(&mut self) {
        for (severity, message) in self.logs.drain(..) {
            self.state.sink.emit(severity, &self.path, &message);
        }
    }

    fn defect(&mut self, message: &str) {
        self.state.defects.fetch_add(1, Ordering::Relaxed);
        self.state.sink.emit(Severity::Defect, &self.path, message);
    }

    fn retire(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        if !self.waited && !self.children.is_empty() {
            self.defect("Failed to wait for subordinate jobs!");
        }
        if !self.logs.is_empty() {
            self.defect("Failed to print logs!");
            self.flush_logs();
        }
    }

    /// Node name; `None` for the root and anonymous nodes
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Slash-joined display path, e.g. `(root)/season1/ep1.mkv`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Names of the children submitted so far, in order
    pub fn children(&self) -> &[String] {
        &self.children
    }

    /// Whether `wait` was called
    pub fn has_waited(&self) -> bool {
        self.waited
    }

    /// Lines buffered and not yet flushed
    pub fn pending_logs(&self) -> &[(Severity, String)] {
        &self.logs
    }

    /// Jobs submitted anywhere in the tree
    pub fn job_count(&self) -> u64 {
        self.state.jobs.load(Ordering::Relaxed)
    }

    /// Errors logged anywhere in the tree
    pub fn error_count(&self) -> u64 {
        self.state.errors.load(Ordering::Relaxed)
    }

    /// Warnings logged anywhere in the tree
    pub fn warning_count(&self) -> u64 {
        self.state.warnings.load(Ordering::Relaxed)
    }

    /// Defects detected anywhere in the tree
    pub fn defect_count(&self) -> u64 {
        self.state.defects.load(Ordering::Relaxed)
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if self.retired || std::thread::panicking() {
            return;
        }
        if (!self.waited && !self.children.is_empty()) || !self.logs.is_empty() {
            log::error!("job queue {} dropped in a defective state", self.path);
        }
        self.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaErrorKind;
    use proptest::prelude::*;

    fn queue() -> (JobQueue, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (JobQueue::with_sink(sink.clone()), sink)
    }

    #[test]
    fn test_logs_are_buffered_until_the_job_returns() {
        let (mut root, sink) = queue();
        root.submit(Some("job"), |q| {
            q.info("working");
            assert!(sink.lines().is_empty());
            assert_eq!(q.pending_logs().len(), 1);
            Ok(())
        })
        .unwrap();
        root.wait();

        assert_eq!(sink.lines(), vec!["I[(root)/job]: working"]);
    }

    #[test]
    fn test_nested_output_is_depth_first() {
        let (mut root, sink) = queue();
        root.submit(None, |top| {
            top.submit(Some("parent"), |parent| {
                parent.info("before");
                parent.submit(Some("child"), |child| {
                    child.submit(Some("grandchild"), |grandchild| {
                        grandchild.warning("deep");
                        Ok(())
                    })?;
                    child.wait();
                    child.info("child done");
                    Ok(())
                })?;
                parent.wait();
                parent.info("after");
                Ok(())
            })?;
            top.submit(Some("sibling"), |sibling| {
                sibling.error("failed");
                Ok(())
            })?;
            top.wait();
            Ok(())
        })
        .unwrap();
        root.wait();

        assert_eq!(
            sink.lines(),
            vec![
                "W[(root)/parent/child/grandchild]: deep",
                "I[(root)/parent/child]: child done",
                "I[(root)/parent]: before",
                "I[(root)/parent]: after",
                "E[(root)/sibling]: failed",
            ]
        );
        assert_eq!(root.error_count(), 1);
        assert_eq!(root.warning_count(), 1);
        assert_eq!(root.defect_count(), 0);
        assert_eq!(root.job_count(), 5);
    }

    #[test]
    fn test_missing_wait_is_a_defect() {
        let (mut root, sink) = queue();
        root.submit(Some("lazy"), |q| {
            q.submit(Some("work"), |_| Ok(()))?;
            Ok(())
        })
        .unwrap();
        root.wait();

        assert_eq!(root.defect_count(), 1);
        assert!(sink
            .lines()
            .contains(&"X[(root)/lazy]: Failed to wait for subordinate jobs!".to_string()));
    }

    #[test]
    fn test_root_dropped_without_wait_is_a_defect() {
        let sink = Arc::new(MemorySink::new());
        {
            let mut root = JobQueue::with_sink(sink.clone());
            root.submit(Some("job"), |_| Ok(())).unwrap();
        }
        assert_eq!(
            sink.lines(),
            vec!["X[(root)]: Failed to wait for subordinate jobs!"]
        );
    }

    #[test]
    fn test_unflushed_root_logs_are_a_defect() {
        let sink = Arc::new(MemorySink::new());
        {
            let mut root = JobQueue::with_sink(sink.clone());
            root.info("never flushed");
        }
        assert_eq!(
            sink.lines(),
            vec![
                "X[(root)]: Failed to print logs!",
                "I[(root)]: never flushed",
            ]
        );
    }

    #[test]
    fn test_anonymous_child_of_named_node_is_rejected() {
        let (mut root, _sink) = queue();
        let err = root
            .submit(Some("named"), |q| q.submit(None, |_| Ok(())))
            .unwrap_err();
        assert_eq!(err.kind, MediaErrorKind::InvalidJob);
        root.wait();
    }

    #[test]
    fn test_anonymous_children_of_root_share_the_root_path() {
        let (mut root, sink) = queue();
        root.submit(None, |q| {
            assert_eq!(q.path(), ROOT_NAME);
            assert_eq!(q.name(), None);
            q.info("top");
            Ok(())
        })
        .unwrap();
        root.wait();
        assert_eq!(sink.lines(), vec!["I[(root)]: top"]);
        assert_eq!(root.children(), &["".to_string()]);
    }

    #[test]
    fn test_failed_job_still_flushes() {
        let (mut root, sink) = queue();
        let err = root
            .submit(Some("job"), |q| -> Result<(), MediaError> {
                q.info("partial");
                Err(MediaError::interrupted())
            })
            .unwrap_err();
        root.wait();

        assert!(err.is_interrupted());
        assert_eq!(sink.lines(), vec!["I[(root)/job]: partial"]);
        assert_eq!(root.defect_count(), 0);
    }

    #[test]
    fn test_submit_returns_job_value() {
        let (mut root, _sink) = queue();
        let value = root.submit(Some("answer"), |_| Ok(42)).unwrap();
        root.wait();
        assert_eq!(value, 42);
        assert!(root.has_waited());
    }

    #[derive(Debug, Clone)]
    struct Tree(Vec<Tree>);

    fn tree() -> impl Strategy<Value = Tree> {
        Just(Tree(Vec::new())).prop_recursive(4, 32, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Tree)
        })
    }

    fn run_tree(q: &mut JobQueue, tree: &Tree) -> Result<(), MediaError> {
        q.info("done");
        for (i, child) in tree.0.iter().enumerate() {
            let name = format!("n{}", i);
            q.submit(Some(name.as_str()), |q| run_tree(q, child))?;
        }
        q.wait();
        Ok(())
    }

    fn expected_lines(path: &str, tree: &Tree, out: &mut Vec<String>) {
        for (i, child) in tree.0.iter().enumerate() {
            expected_lines(&format!("{}/n{}", path, i), child, out);
        }
        out.push(format!("I[{}]: done", path));
    }

    proptest! {
        #[test]
        fn prop_output_follows_depth_first_completion(tree in tree()) {
            let (mut root, sink) = queue();
            root.submit(None, |q| run_tree(q, &tree)).unwrap();
            root.wait();

            let mut expected = Vec::new();
            expected_lines(ROOT_NAME, &tree, &mut expected);
            prop_assert_eq!(sink.lines(), expected);
            prop_assert_eq!(root.defect_count(), 0);
        }
    }
}
