//! Owned chains of piped transcoder processes.
//!
//! A [`TranscodeChain`] runs one or two external programs, wiring the stdout
//! of each stage into the stdin of the next, and exposes the last stage's
//! stdout through [`std::io::Read`]. Every child is killed and reaped when the
//! chain is dropped, whether the consumer hit EOF, bailed out on an error or
//! was cancelled.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Bytes of stderr kept per stage for error reports.
const STDERR_TAIL: usize = 4096;

/// Upper bound on how often the watchdog wakes up.
const WATCHDOG_POLL: Duration = Duration::from_millis(250);

/// Maximum number of stages in a chain.
pub const MAX_STAGES: usize = 2;

/// A fully expanded command line for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, s: impl Into<String>) -> Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

struct Stage {
    name: String,
    child: Child,
    stderr: Arc<Mutex<VecDeque<u8>>>,
    reaped: Option<ExitStatus>,
}

impl Stage {
    fn stderr_tail(&self) -> String {
        let tail = self.stderr.lock();
        let (a, b) = tail.as_slices();
        let mut bytes = Vec::with_capacity(tail.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// Read-side liveness shared with the watchdog thread.
struct Progress {
    started: Instant,
    /// Millis since `started` (plus one) at which the current read began, 0 if idle.
    pending_since: AtomicU64,
    stalled: AtomicBool,
    closed: AtomicBool,
}

impl Progress {
    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64 + 1
    }
}

/// A running chain of transcoder processes.
///
/// # Example
///
/// ```no_run
/// use std::io::Read;
/// use streamforged_av::{StageCommand, TranscodeChain};
///
/// let decode = StageCommand::new("ffmpeg").args(["-i", "in.flac", "-f", "wav", "-"]);
/// let encode = StageCommand::new("lame").args(["-b", "128", "-", "-"]);
/// let mut chain = TranscodeChain::spawn(vec![decode, encode], None)?;
///
/// let mut mp3 = Vec::new();
/// chain.read_to_end(&mut mp3)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct TranscodeChain {
    stages: Arc<Mutex<Vec<Stage>>>,
    stdout: Option<ChildStdout>,
    progress: Arc<Progress>,
    finished: bool,
}

impl TranscodeChain {
    /// Spawn the stages, piping each one's stdout into the next.
    ///
    /// With a `stall_timeout`, a watchdog kills the chain when a read waits
    /// longer than that for output; the read then fails with
    /// [`io::ErrorKind::TimedOut`].
    pub fn spawn(commands: Vec<StageCommand>, stall_timeout: Option<Duration>) -> Result<Self> {
        if commands.is_empty() || commands.len() > MAX_STAGES {
            return Err(Error::InvalidInput(format!(
                "a transcoding chain needs 1 to {MAX_STAGES} stages, got {}",
                commands.len()
            )));
        }

        let mut chain = Self {
            stages: Arc::new(Mutex::new(Vec::with_capacity(commands.len()))),
            stdout: None,
            progress: Arc::new(Progress {
                started: Instant::now(),
                pending_since: AtomicU64::new(0),
                stalled: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
            finished: false,
        };

        // An early return drops `chain`, which kills any stage already running.
        let mut upstream: Option<ChildStdout> = None;
        for command in commands {
            let name = command.name();
            let stdin = match upstream.take() {
                Some(out) => Stdio::from(out),
                None => Stdio::null(),
            };

            let mut child = Command::new(&command.program)
                .args(&command.args)
                .stdin(stdin)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|source| Error::Spawn {
                    tool: name.clone(),
                    source,
                })?;

            tracing::debug!(tool = %name, pid = child.id(), args = ?command.args, "Spawned transcoder stage");

            let stderr = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL)));
            if let Some(pipe) = child.stderr.take() {
                drain_stderr(pipe, Arc::clone(&stderr));
            }
            upstream = child.stdout.take();

            chain.stages.lock().push(Stage {
                name,
                child,
                stderr,
                reaped: None,
            });
        }
        chain.stdout = upstream;

        if let Some(timeout) = stall_timeout {
            chain.start_watchdog(timeout);
        }

        Ok(chain)
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> usize {
        self.stages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the watchdog killed the chain.
    pub fn stalled(&self) -> bool {
        self.progress.stalled.load(Ordering::Acquire)
    }

    fn start_watchdog(&self, timeout: Duration) {
        let progress = Arc::clone(&self.progress);
        let stages = Arc::clone(&self.stages);
        let poll = timeout.min(WATCHDOG_POLL);
        let limit = timeout.as_millis() as u64;

        let spawned = thread::Builder::new()
            .name("transcode-watchdog".into())
            .spawn(move || loop {
                thread::sleep(poll);
                if progress.closed.load(Ordering::Acquire) {
                    return;
                }
                let since = progress.pending_since.load(Ordering::Acquire);
                if since != 0 && progress.now().saturating_sub(since) > limit {
                    progress.stalled.store(true, Ordering::Release);
                    tracing::warn!(timeout_ms = limit, "Transcoder stalled, killing chain");
                    for stage in stages.lock().iter_mut() {
                        let _ = stage.child.kill();
                    }
                    return;
                }
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "Could not start transcoder watchdog");
        }
    }

    /// Reap all stages after EOF, surfacing the first failure.
    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;

        if self.stalled() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "transcoder produced no output before the stall timeout",
            ));
        }

        let mut stages = self.stages.lock();
        let mut failure = None;
        for stage in stages.iter_mut() {
            let status = stage.child.wait()?;
            stage.reaped = Some(status);
            if !status.success() && failure.is_none() {
                let tail = stage.stderr_tail();
                failure = Some(io::Error::other(format!(
                    "{} exited with {}: {}",
                    stage.name, status, tail
                )));
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Read for TranscodeChain {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(0);
        };

        self.progress
            .pending_since
            .store(self.progress.now(), Ordering::Release);
        let result = stdout.read(buf);
        self.progress.pending_since.store(0, Ordering::Release);

        match result {
            Ok(0) => {
                self.stdout = None;
                self.finish().map(|()| 0)
            }
            Ok(n) => Ok(n),
            Err(e) if self.stalled() => Err(io::Error::new(io::ErrorKind::TimedOut, e)),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TranscodeChain {
    fn drop(&mut self) {
        self.progress.closed.store(true, Ordering::Release);
        self.stdout = None;

        for stage in self.stages.lock().iter_mut() {
            if stage.reaped.is_some() {
                continue;
            }
            match stage.child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    let _ = stage.child.kill();
                    tracing::trace!(tool = %stage.name, "Killed transcoder stage");
                }
            }
            let _ = stage.child.wait();
        }
    }
}

impl std::fmt::Debug for TranscodeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.stages.lock().iter().map(|s| s.name.clone()).collect();
        f.debug_struct("TranscodeChain")
            .field("stages", &names)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Keep only the last [`STDERR_TAIL`] bytes of a stage's stderr.
fn drain_stderr(mut pipe: impl Read + Send + 'static, tail: Arc<Mutex<VecDeque<u8>>>) {
    let spawned = thread::Builder::new()
        .name("transcode-stderr".into())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut tail = tail.lock();
                        tail.extend(&buf[..n]);
                        let excess = tail.len().saturating_sub(STDERR_TAIL);
                        tail.drain(..excess);
                    }
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!(error = %e, "Could not start stderr drain thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> StageCommand {
        StageCommand::new("sh").args(["-c", script])
    }

    #[test]
    fn rejects_empty_and_oversized_chains() {
        assert!(matches!(
            TranscodeChain::spawn(vec![], None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            TranscodeChain::spawn(vec![sh("true"), sh("true"), sh("true")], None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn single_stage_output() {
        let mut chain = TranscodeChain::spawn(vec![sh("printf hello")], None).unwrap();
        let mut out = String::new();
        chain.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn two_stages_are_piped() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.txt");
        std::fs::write(&source, b"abc def").unwrap();

        let first = StageCommand::new("cat").arg(source.display().to_string());
        let second = StageCommand::new("tr").args(["a-z", "A-Z"]);
        let mut chain = TranscodeChain::spawn(vec![first, second], None).unwrap();

        let mut out = String::new();
        chain.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ABC DEF");
    }

    #[test]
    fn non_zero_exit_surfaces_stderr() {
        let mut chain =
            TranscodeChain::spawn(vec![sh("printf partial; echo boom >&2; exit 3")], None)
                .unwrap();
        let mut out = Vec::new();
        let err = chain.read_to_end(&mut out).unwrap_err();
        assert_eq!(out, b"partial");
        let message = err.to_string();
        assert!(message.contains("boom"), "unexpected error: {message}");
        assert!(message.contains("sh exited"), "unexpected error: {message}");
    }

    #[test]
    fn spawn_failure_reports_tool() {
        let err =
            TranscodeChain::spawn(vec![StageCommand::new("nonexistent_tool_12345")], None)
                .unwrap_err();
        assert!(matches!(err, Error::Spawn { ref tool, .. } if tool == "nonexistent_tool_12345"));
    }

    #[test]
    fn drop_kills_running_stages() {
        let chain = TranscodeChain::spawn(
            vec![StageCommand::new("sleep").arg("30"), StageCommand::new("cat")],
            None,
        )
        .unwrap();

        let started = Instant::now();
        drop(chain);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn drop_after_partial_read_kills_producer() {
        let mut chain = TranscodeChain::spawn(vec![StageCommand::new("yes")], None).unwrap();
        let mut buf = [0u8; 64];
        chain.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..2], b"y\n");

        let started = Instant::now();
        drop(chain);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn watchdog_kills_stalled_chain() {
        let mut chain = TranscodeChain::spawn(
            vec![StageCommand::new("sleep").arg("30")],
            Some(Duration::from_millis(200)),
        )
        .unwrap();

        let started = Instant::now();
        let mut out = Vec::new();
        let err = chain.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(chain.stalled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn watchdog_ignores_idle_consumer() {
        let mut chain = TranscodeChain::spawn(
            vec![sh("printf a; sleep 0.1; printf b")],
            Some(Duration::from_millis(2000)),
        )
        .unwrap();
        let mut out = String::new();
        chain.read_to_string(&mut out).unwrap();
        assert_eq!(out, "ab");
        assert!(!chain.stalled());
    }
}
