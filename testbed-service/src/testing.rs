// Test Doubles
// Fake executor and fetcher used by the orchestration unit tests

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tempfile::TempDir;

use crate::executor::{CancelSignal, ExecError, ExecOutput, Executor, Invocation};
use crate::fetch::{FetchError, Fetcher};

enum Reply {
    Output(ExecOutput),
    SpawnFailure,
    /// Report success without touching the filesystem
    Noop,
}

/// Records every invocation and answers from scripted replies.
///
/// Unscripted commands succeed. `docker cp` is emulated by copying between
/// host paths and a per-container directory tree under a temp dir.
pub struct FakeExecutor {
    calls: Mutex<Vec<Invocation>>,
    replies: Mutex<Vec<(String, Reply)>>,
    containers: TempDir,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            containers: tempfile::tempdir().expect("temp dir for fake containers"),
        }
    }

    /// Answer any command line containing `pattern` with `output`
    pub fn respond(&self, pattern: &str, output: ExecOutput) {
        self.push(pattern, Reply::Output(output));
    }

    /// Make any command line containing `pattern` fail to spawn
    pub fn fail_to_spawn(&self, pattern: &str) {
        self.push(pattern, Reply::SpawnFailure);
    }

    /// Make any command line containing `pattern` succeed without side effects
    pub fn noop(&self, pattern: &str) {
        self.push(pattern, Reply::Noop);
    }

    fn push(&self, pattern: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .push((pattern.to_string(), reply));
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    fn resolve_cp_path(&self, arg: &str) -> PathBuf {
        if arg.starts_with('/') {
            return PathBuf::from(arg);
        }
        match arg.split_once(':') {
            Some((container, path)) => self
                .containers
                .path()
                .join(container)
                .join(path.trim_start_matches('/')),
            None => PathBuf::from(arg),
        }
    }

    fn emulate_cp(&self, invocation: &Invocation) -> ExecOutput {
        let (from, to) = match invocation.args.as_slice() {
            [_, from, to] => (self.resolve_cp_path(from), self.resolve_cp_path(to)),
            _ => return ExecOutput::failed(1, "usage: docker cp SRC DEST"),
        };
        if let Some(parent) = to.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return ExecOutput::failed(1, e.to_string());
            }
        }
        match fs::copy(&from, &to) {
            Ok(_) => ExecOutput::ok(),
            Err(e) => ExecOutput::failed(1, format!("{}: {}", from.display(), e)),
        }
    }
}

#[async_trait::async_trait]
impl Executor for FakeExecutor {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancelSignal,
    ) -> Result<ExecOutput, ExecError> {
        let line = invocation.command_line();
        self.calls.lock().unwrap().push(invocation.clone());

        if *cancel.borrow() {
            return Err(ExecError::Cancelled(line));
        }

        {
            let replies = self.replies.lock().unwrap();
            if let Some((_, reply)) = replies.iter().find(|(p, _)| line.contains(p.as_str())) {
                return match reply {
                    Reply::Output(output) => Ok(output.clone()),
                    Reply::SpawnFailure => Err(ExecError::Spawn {
                        command: line,
                        source: std::io::Error::new(
                            std::io::ErrorKind::PermissionDenied,
                            "permission denied",
                        ),
                    }),
                    Reply::Noop => Ok(ExecOutput::ok()),
                };
            }
        }

        if invocation.args.first().map(String::as_str) == Some("cp") {
            return Ok(self.emulate_cp(invocation));
        }

        Ok(ExecOutput::ok())
    }
}

/// Fetcher returning a fixed body or a fixed failure
pub struct FakeFetcher {
    body: Option<Vec<u8>>,
    status: u16,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
            status: 200,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Every fetch fails with the given HTTP status
    pub fn status(status: u16) -> Self {
        Self {
            body: None,
            status,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, cancel: &CancelSignal) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *cancel.borrow() {
            return Err(FetchError::Cancelled(url.to_string()));
        }
        match &self.body {
            Some(body) => Ok(body.clone()),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: self.status,
            }),
        }
    }
}
