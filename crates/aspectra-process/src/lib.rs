//! Spawning helpers for build-tool subprocesses.
//!
//! Bazel writes a lot to stderr while it builds (progress, warnings, and with
//! `--experimental_show_artifacts` one line per output artifact). Both pipes are drained on
//! dedicated threads so the child never blocks on a full OS pipe buffer, and callers can
//! either keep a bounded copy of a stream or filter it line by line while it is being read.
//!
//! There is no timeout by default: aspect builds can legitimately take a very long time.
//! Callers that need to stop a build early pass a [`CancellationToken`] and cancel it from
//! another thread; the whole process group is then terminated.

use std::{
    fmt,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

pub use tokio_util::sync::CancellationToken;

/// Per-line filter applied to a stream while it is drained.
///
/// Returning `Some(line)` keeps the (possibly rewritten) line, `None` drops it.
pub type LineFilter = Box<dyn FnMut(&str) -> Option<String> + Send>;

/// Captured stdout/stderr from a command, truncated to a maximum size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stdout or stderr had more bytes than were captured.
    pub truncated: bool,
}

impl BoundedOutput {
    /// Combine stdout/stderr into a single string.
    pub fn combined(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.stdout);
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Which output stream of the child a [`LineFilter`] is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Options controlling command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process if it hasn't exited after this duration. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Maximum bytes to capture *per stream* for streams that are not filtered.
    pub max_bytes: usize,
    /// When cancelled, the process group is terminated and `cancelled` is set on the result.
    pub cancellation: Option<CancellationToken>,
    /// How long to wait after a graceful termination signal before force-killing.
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            // 16MiB per stream keeps memory bounded while still capturing enough context for
            // diagnostics.
            max_bytes: 16 * 1024 * 1024,
            cancellation: None,
            kill_grace: Duration::from_millis(250),
        }
    }
}

/// A full command invocation (cwd + program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable only; not meant to be pasted back into a shell.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of running a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    /// Bounded copy of the streams that were not filtered. A filtered stream is left empty.
    pub output: BoundedOutput,
    /// Lines kept by the [`LineFilter`], in the order the child printed them.
    pub filtered_lines: Vec<String>,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Run a command, capturing at most `opts.max_bytes` bytes of stdout and stderr each.
///
/// A non-zero exit is not an error here; callers decide what the status means.
pub fn run_command(
    cwd: &Path,
    program: &Path,
    args: &[String],
    opts: RunOptions,
) -> io::Result<CommandResult> {
    let command = CommandSpec::new(cwd, program, args);
    run_command_spec(&command, opts, None)
}

/// Run a command and pass every line of `stream` through `filter` while it is drained.
///
/// Only the lines the filter keeps are retained, so arbitrarily chatty output does not grow
/// memory. The other stream is captured as in [`run_command`].
pub fn run_command_filtered(
    cwd: &Path,
    program: &Path,
    args: &[String],
    opts: RunOptions,
    stream: Stream,
    filter: LineFilter,
) -> io::Result<CommandResult> {
    let command = CommandSpec::new(cwd, program, args);
    run_command_spec(&command, opts, Some((stream, filter)))
}

type ReaderHandle = thread::JoinHandle<io::Result<StreamCapture>>;

#[derive(Default)]
struct StreamCapture {
    bytes: Vec<u8>,
    truncated: bool,
    lines: Vec<String>,
}

fn spawn_reader(
    reader: impl Read + Send + 'static,
    max_bytes: usize,
    filter: Option<LineFilter>,
) -> ReaderHandle {
    thread::spawn(move || match filter {
        Some(filter) => read_filtered(reader, filter),
        None => read_bounded(reader, max_bytes),
    })
}

fn run_command_spec(
    command: &CommandSpec,
    opts: RunOptions,
    filter: Option<(Stream, LineFilter)>,
) -> io::Result<CommandResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group so cancellation reaches the Bazel client and anything it forked.
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and does not allocate.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    tracing::debug!(target: "aspectra.process", command = %command, "spawning command");
    let mut child = cmd.spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };

    let (stdout_filter, stderr_filter) = match filter {
        Some((Stream::Stdout, f)) => (Some(f), None),
        Some((Stream::Stderr, f)) => (None, Some(f)),
        None => (None, None),
    };
    let stdout_handle = spawn_reader(stdout, opts.max_bytes, stdout_filter);
    let stderr_handle = spawn_reader(stderr, opts.max_bytes, stderr_filter);

    let start = Instant::now();
    let mut timed_out = false;
    let mut cancelled = false;

    let status = if opts.timeout.is_some() || opts.cancellation.is_some() {
        let poll = Duration::from_millis(50);
        loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }

            if let Some(token) = opts.cancellation.as_ref() {
                if token.is_cancelled() {
                    cancelled = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
            }

            if let Some(timeout) = opts.timeout {
                if start.elapsed() >= timeout {
                    timed_out = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
                thread::sleep(poll.min(timeout.saturating_sub(start.elapsed())));
            } else {
                thread::sleep(poll);
            }
        }
    } else {
        child.wait()?
    };

    let stdout = join_reader(stdout_handle, "stdout")??;
    let stderr = join_reader(stderr_handle, "stderr")??;

    let mut filtered_lines = stdout.lines;
    filtered_lines.extend(stderr.lines);

    tracing::debug!(
        target: "aspectra.process",
        command = %command,
        status = %status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        timed_out,
        cancelled,
        "command finished"
    );

    Ok(CommandResult {
        status,
        output: BoundedOutput {
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            truncated: stdout.truncated || stderr.truncated,
        },
        filtered_lines,
        timed_out,
        cancelled,
    })
}

fn terminate_process_tree(
    child: &mut std::process::Child,
    grace: Duration,
) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        // Negative pid targets the process group created in `pre_exec`.
        unsafe {
            let _ = libc::kill(-pid, libc::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(25));
        }

        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(windows)]
    {
        let _ = grace;
        // `Child::kill` only stops the immediate process; `bazel.exe` keeps the pipes open
        // through its server children unless the whole tree goes.
        let pid = child.id().to_string();
        let _ = Command::new("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let _ = child.kill();
        child.wait()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = grace;
        let _ = child.kill();
        child.wait()
    }
}

fn join_reader(handle: ReaderHandle, stream: &'static str) -> io::Result<io::Result<StreamCapture>> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))
}

fn read_bounded(mut reader: impl Read, max_bytes: usize) -> io::Result<StreamCapture> {
    let mut capture = StreamCapture::default();
    let mut buf = [0u8; 8 * 1024];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }

        if capture.bytes.len() < max_bytes {
            let remaining = max_bytes - capture.bytes.len();
            let to_store = remaining.min(n);
            capture.bytes.extend_from_slice(&buf[..to_store]);
            if to_store < n {
                capture.truncated = true;
            }
        } else {
            capture.truncated = true;
        }
    }

    Ok(capture)
}

fn read_filtered(reader: impl Read, mut filter: LineFilter) -> io::Result<StreamCapture> {
    let mut capture = StreamCapture::default();
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_end_matches(['\n', '\r']);
        if let Some(kept) = filter(line) {
            capture.lines.push(kept);
        }
    }

    Ok(capture)
}
