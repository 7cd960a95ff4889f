//! Subprocess runner implementation.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::error::ProcessError;
use super::lines::LineSplitter;

/// Number of trailing lines kept per stream for diagnostics.
pub const DEFAULT_TAIL_LINES: usize = 50;

const READ_CHUNK_SIZE: usize = 8 * 1024;
const LINE_CHANNEL_CAPACITY: usize = 256;

/// How long output is still read after the tool has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line of tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// What to run and for how long.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    /// Hard wall-clock bound; the process is killed when it expires.
    pub deadline: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            deadline,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Command line rendered for logs.
    pub fn display_command(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Outcome of a process that ran to completion (whatever its exit code).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code, `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Best diagnostic text: the stderr tail, or the stdout tail when the tool
    /// wrote nothing to stderr.
    pub fn diagnostic(&self) -> String {
        if self.stderr_tail.is_empty() {
            self.stdout_tail.join("\n")
        } else {
            self.stderr_tail.join("\n")
        }
    }
}

/// Bounded record of the output seen so far.
struct Capture {
    limit: usize,
    stdout_tail: VecDeque<String>,
    stderr_tail: VecDeque<String>,
    stdout_lines: usize,
    stderr_lines: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            stdout_tail: VecDeque::with_capacity(limit),
            stderr_tail: VecDeque::with_capacity(limit),
            stdout_lines: 0,
            stderr_lines: 0,
        }
    }

    fn record(&mut self, line: &OutputLine) {
        let (tail, count) = match line.stream {
            OutputStream::Stdout => (&mut self.stdout_tail, &mut self.stdout_lines),
            OutputStream::Stderr => (&mut self.stderr_tail, &mut self.stderr_lines),
        };
        *count += 1;
        if self.limit == 0 {
            return;
        }
        if tail.len() == self.limit {
            tail.pop_front();
        }
        tail.push_back(line.text.clone());
    }

    fn stderr_tail(&self) -> Vec<String> {
        self.stderr_tail.iter().cloned().collect()
    }

    fn into_result(self, exit_code: Option<i32>, elapsed: Duration) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            stdout_lines: self.stdout_lines,
            stderr_lines: self.stderr_lines,
            stdout_tail: self.stdout_tail.into_iter().collect(),
            stderr_tail: self.stderr_tail.into_iter().collect(),
            elapsed,
        }
    }
}

/// Runs external tools with streamed output and a hard deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    tail_lines: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            tail_lines: DEFAULT_TAIL_LINES,
        }
    }

    /// Sets how many trailing lines per stream are kept for diagnostics.
    pub fn with_tail_lines(mut self, tail_lines: usize) -> Self {
        self.tail_lines = tail_lines;
        self
    }

    /// Runs `invocation` to completion, calling `on_line` for every output line
    /// as soon as it is read.
    ///
    /// On deadline expiry the child and every process in its group are
    /// killed, and the child is reaped, before [`ProcessError::Timeout`] is
    /// returned. Processes the tool leaves behind after a normal exit are
    /// killed too.
    pub async fn run<F>(
        &self,
        invocation: &Invocation,
        mut on_line: F,
    ) -> Result<ExecutionResult, ProcessError>
    where
        F: FnMut(&OutputLine) + Send,
    {
        let started = Instant::now();

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so helpers the tool starts can be killed with it.
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        debug!(command = %invocation.display_command(), "Spawning process");
        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: invocation.program.clone(),
                }
            } else {
                ProcessError::Spawn {
                    program: invocation.program.clone(),
                    source: e,
                }
            }
        })?;
        let mut group = ProcessGroup::of(&child);

        let (tx, mut rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        let mut readers: Vec<JoinHandle<std::io::Result<()>>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                OutputStream::Stdout,
                tx.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                OutputStream::Stderr,
                tx.clone(),
            )));
        }
        drop(tx);

        let mut capture = Capture::new(self.tail_lines);
        let mut deliver = |line: OutputLine| {
            debug!(
                target: "segfetch_core::process",
                stream = ?line.stream,
                "{}",
                line.text
            );
            capture.record(&line);
            on_line(&line);
        };

        // The child is watched alongside its output: a descendant holding the
        // pipes open must not keep the call waiting once the tool itself exits.
        let outcome = timeout(invocation.deadline, async {
            let mut output_open = true;
            loop {
                tokio::select! {
                    line = rx.recv(), if output_open => match line {
                        Some(line) => deliver(line),
                        None => output_open = false,
                    },
                    status = child.wait() => break status,
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(status)) => {
                group.kill();
                let drained = timeout(OUTPUT_DRAIN_GRACE, async {
                    while let Some(line) = rx.recv().await {
                        deliver(line);
                    }
                })
                .await
                .is_ok();
                if drained {
                    for reader in readers {
                        if let Ok(Err(e)) = reader.await {
                            warn!(program = %invocation.program.display(), "Failed reading process output: {}", e);
                        }
                    }
                } else {
                    warn!(
                        program = %invocation.program.display(),
                        "Output still open after exit, abandoning readers"
                    );
                    for reader in &readers {
                        reader.abort();
                    }
                }
                let result = capture.into_result(status.code(), started.elapsed());
                debug!(
                    program = %invocation.program.display(),
                    exit_code = ?result.exit_code,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "Process exited"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                terminate(&mut child, &mut group, &readers).await;
                Err(ProcessError::Io(e))
            }
            Err(_) => {
                warn!(
                    program = %invocation.program.display(),
                    deadline_secs = invocation.deadline.as_secs(),
                    "Process deadline expired, killing"
                );
                terminate(&mut child, &mut group, &readers).await;
                while let Ok(line) = rx.try_recv() {
                    deliver(line);
                }
                Err(ProcessError::Timeout {
                    program: invocation.program.clone(),
                    deadline: invocation.deadline,
                    stderr_tail: capture.stderr_tail(),
                })
            }
        }
    }
}

/// Process group led by a spawned tool. Members still alive when it is
/// dropped are killed.
struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            id: if cfg!(unix) { child.id() } else { None },
        }
    }

    /// Sends SIGKILL to every process in the group. Only the first call signals.
    fn kill(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;
            match killpg(Pid::from_raw(id as i32), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid = id, error = ?e, "killpg SIGKILL failed"),
            }
        }
        #[cfg(not(unix))]
        let _ = id;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kills the whole process group, reaps the child so no zombie is left
/// behind, and stops the output readers.
async fn terminate(
    child: &mut Child,
    group: &mut ProcessGroup,
    readers: &[JoinHandle<std::io::Result<()>>],
) {
    group.kill();
    if let Err(e) = child.kill().await {
        debug!("Kill returned: {}", e);
    }
    for reader in readers {
        reader.abort();
    }
}

/// Reads a pipe to EOF and forwards each completed line.
async fn forward_lines<R>(
    mut reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        for text in splitter.push(&buf[..n]) {
            if tx.send(OutputLine { stream, text }).await.is_err() {
                return Ok(());
            }
        }
    }
    if let Some(text) = splitter.finish() {
        let _ = tx.send(OutputLine { stream, text }).await;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn sh(script: &str, deadline: Duration) -> Invocation {
        Invocation::new("sh", deadline).args(["-c", script])
    }

    /// Whether `pid` is a live process. Zombies awaiting a reaper count as gone.
    fn process_running(pid: &str) -> bool {
        let pid = pid.trim();
        if Path::new("/proc/self").exists() {
            return match std::fs::read_to_string(Path::new("/proc").join(pid).join("stat")) {
                Ok(stat) => stat
                    .rsplit_once(") ")
                    .map(|(_, rest)| !rest.starts_with(['Z', 'X']))
                    .unwrap_or(true),
                Err(_) => false,
            };
        }
        std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn wait_until_gone(pid: &str) -> bool {
        for _ in 0..100 {
            if !process_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        let runner = ProcessRunner::new();
        let mut seen = Vec::new();

        let result = runner
            .run(
                &sh("echo one; echo two 1>&2; echo three; exit 3", Duration::from_secs(10)),
                |line| seen.push(line.clone()),
            )
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(3));
        assert!(!result.success());
        assert_eq!(result.stdout_tail, vec!["one", "three"]);
        assert_eq!(result.stderr_tail, vec!["two"]);
        assert_eq!(result.diagnostic(), "two");
        assert_eq!(seen.len(), 3);
        assert!(seen.contains(&OutputLine {
            stream: OutputStream::Stderr,
            text: "two".to_string()
        }));
    }

    #[tokio::test]
    async fn test_lines_arrive_while_running() {
        let runner = ProcessRunner::new();
        let start = Instant::now();
        let mut first_line_at = None;

        let result = runner
            .run(&sh("echo ready; sleep 2", Duration::from_secs(10)), |_| {
                first_line_at.get_or_insert_with(|| start.elapsed());
            })
            .await
            .unwrap();

        assert!(result.success());
        let first_line_at = first_line_at.expect("line should have been delivered");
        assert!(result.elapsed >= Duration::from_secs(2));
        assert!(first_line_at < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_carriage_return_progress_lines() {
        let runner = ProcessRunner::new();
        let mut seen = Vec::new();
        runner
            .run(
                &sh("printf '10%%\\r20%%\\r30%%\\n'", Duration::from_secs(10)),
                |line| seen.push(line.text.clone()),
            )
            .await
            .unwrap();
        assert_eq!(seen, vec!["10%", "20%", "30%"]);
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!(
            "echo $$ > {}; echo partial 1>&2; exec sleep 30",
            pid_file.display()
        );
        let runner = ProcessRunner::new();
        let start = Instant::now();

        let err = runner
            .run(&sh(&script, Duration::from_millis(500)), |_| {})
            .await
            .unwrap_err();

        assert!(start.elapsed() < Duration::from_secs(10));
        match err {
            ProcessError::Timeout {
                deadline,
                stderr_tail,
                ..
            } => {
                assert_eq!(deadline, Duration::from_millis(500));
                assert_eq!(stderr_tail, vec!["partial"]);
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = std::process::Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "process {} still running", pid.trim());
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("child_pid");
        let script = format!(
            "sleep 30 & echo $! > {}; echo waiting 1>&2; wait",
            pid_file.display()
        );
        let runner = ProcessRunner::new();

        let err = runner
            .run(&sh(&script, Duration::from_millis(500)), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessError::Timeout { .. }));
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(
            wait_until_gone(&pid).await,
            "background child {} survived the timeout",
            pid.trim()
        );
    }

    #[tokio::test]
    async fn test_exit_not_held_up_by_background_child() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("child_pid");
        let script = format!(
            "sleep 20 & echo $! > {}; echo done; exit 0",
            pid_file.display()
        );
        let runner = ProcessRunner::new();
        let start = Instant::now();

        let result = runner
            .run(&sh(&script, Duration::from_secs(15)), |_| {})
            .await
            .unwrap();

        assert!(result.success());
        assert_eq!(result.stdout_tail, vec!["done"]);
        assert!(start.elapsed() < Duration::from_secs(8));
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        assert!(
            wait_until_gone(&pid).await,
            "background child {} outlived the call",
            pid.trim()
        );
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let runner = ProcessRunner::new();
        let err = runner
            .run(
                &Invocation::new("/nonexistent/segfetch-tool", Duration::from_secs(1)),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new();
        let result = runner
            .run(
                &sh("pwd", Duration::from_secs(10)).working_dir(dir.path()),
                |_| {},
            )
            .await
            .unwrap();
        let reported = PathBuf::from(&result.stdout_tail[0]).canonicalize().unwrap();
        assert_eq!(reported, dir.path().canonicalize().unwrap());
    }

    #[tokio::test]
    async fn test_tail_is_bounded() {
        let runner = ProcessRunner::new().with_tail_lines(10);
        let result = runner
            .run(
                &sh(
                    "i=1; while [ $i -le 100 ]; do echo line$i 1>&2; i=$((i+1)); done; exit 1",
                    Duration::from_secs(10),
                ),
                |_| {},
            )
            .await
            .unwrap();
        assert_eq!(result.stderr_lines, 100);
        assert_eq!(result.stderr_tail.len(), 10);
        assert_eq!(result.stderr_tail.first().unwrap(), "line91");
        assert!(result.diagnostic().ends_with("line100"));
    }

    #[test]
    fn test_display_command() {
        let invocation = Invocation::new("ffmpeg", Duration::from_secs(1))
            .args(["-i", "in.ts"])
            .arg("out.mp4");
        assert_eq!(invocation.display_command(), "ffmpeg -i in.ts out.mp4");
    }
}
