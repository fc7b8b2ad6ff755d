// Subprocess runner implementation
// reason: tokio for async process management, nix for graceful termination
use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use optijpeg_core::cancel::CancelToken;
use optijpeg_core::constants::GRACEFUL_TERMINATE_TIMEOUT;
use optijpeg_core::port::tool_runner::{
    ExecutionError, InputStream, Invocation, OutputTarget, RawOutput, ToolRunner,
};

/// Bytes captured once every pump reached end-of-stream
struct Pumped {
    stderr: Vec<u8>,
    /// `None` when stdout was copied into the caller's writer
    stdout: Option<Vec<u8>>,
}

enum Outcome {
    Finished(io::Result<(Pumped, ExitStatus)>),
    Cancelled,
    TimedOut,
}

/// Subprocess runner
/// Runs one jpegoptim process per invocation, pumping all three pipes concurrently
pub struct SubprocessRunner {
    grace_period: Duration,
}

impl Default for SubprocessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::with_grace_period(GRACEFUL_TERMINATE_TIMEOUT)
    }

    /// # Arguments
    /// * `grace_period` - How long an aborted process gets between SIGTERM and SIGKILL
    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Spawn with every stdio channel piped (stdin only when there is input)
    fn spawn(
        &self,
        program: &Path,
        args: &[String],
        has_input: bool,
    ) -> Result<Child, ExecutionError> {
        Command::new(program)
            .args(args)
            .stdin(if has_input {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::ToolUnavailable {
                program: program.display().to_string(),
                source,
            })
    }

    /// Kill process with SIGTERM first, then SIGKILL after the grace period
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                info!(pid = %pid, "Sending SIGTERM");
                match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    Ok(()) => match tokio::time::timeout(self.grace_period, child.wait()).await {
                        Ok(_) => {
                            info!(pid = %pid, "Process exited after SIGTERM");
                            return;
                        }
                        Err(_) => {
                            warn!(
                                pid = %pid,
                                "Process did not exit after SIGTERM, sending SIGKILL"
                            );
                        }
                    },
                    Err(e) => debug!(pid = %pid, error = %e, "SIGTERM failed"),
                }
            }
        }

        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Kill failed (process already gone?)");
        }
        if let Err(e) = child.wait().await {
            warn!(error = %e, "Failed to reap aborted process");
        }
    }
}

#[async_trait]
impl ToolRunner for SubprocessRunner {
    async fn run(&self, invocation: Invocation<'_>) -> Result<RawOutput, ExecutionError> {
        let Invocation {
            program,
            args,
            input,
            output,
            timeout,
            cancel,
        } = invocation;

        if cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ExecutionError::Cancelled);
        }

        let started = Instant::now();
        let status_on_stdout = output.status_on_stdout();

        let mut child = self.spawn(&program, &args, input.is_some())?;
        let pid = child.id();
        debug!(pid = ?pid, program = %program.display(), "Spawned jpegoptim");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let finished = async {
                let pumped = pump(stdin, stdout, stderr, input, output).await?;
                let status = child.wait().await?;
                Ok::<_, io::Error>((pumped, status))
            };

            tokio::select! {
                result = finished => Outcome::Finished(result),
                _ = cancelled(cancel.as_ref()) => Outcome::Cancelled,
                _ = expired(timeout) => Outcome::TimedOut,
            }
        };

        let (pumped, status) = match outcome {
            Outcome::Finished(Ok(done)) => done,
            Outcome::Finished(Err(e)) => {
                warn!(pid = ?pid, error = %e, "Pipe error, aborting jpegoptim");
                self.terminate(&mut child).await;
                return Err(ExecutionError::Io(e));
            }
            Outcome::Cancelled => {
                warn!(pid = ?pid, "Invocation cancelled, aborting jpegoptim");
                self.terminate(&mut child).await;
                return Err(ExecutionError::Cancelled);
            }
            Outcome::TimedOut => {
                let timeout_ms = timeout.map(|d| d.as_millis() as u64).unwrap_or_default();
                warn!(
                    pid = ?pid,
                    timeout_ms = %timeout_ms,
                    "Invocation timed out, aborting jpegoptim"
                );
                self.terminate(&mut child).await;
                return Err(ExecutionError::Timeout(timeout_ms));
            }
        };

        let (status_text, diagnostics, buffer) = if status_on_stdout {
            (
                lossy(pumped.stdout.unwrap_or_default()),
                lossy(pumped.stderr),
                None,
            )
        } else {
            (lossy(pumped.stderr), String::new(), pumped.stdout)
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            pid = ?pid,
            duration_ms = %duration_ms,
            exit_code = ?status.code(),
            "jpegoptim process completed"
        );

        Ok(RawOutput {
            status_text,
            diagnostics,
            exit_code: status.code(),
            buffer,
            duration_ms,
        })
    }
}

/// Drive the three pipes together until each reaches end-of-stream
///
/// Sequential reads would deadlock once the tool blocks on a full stdout
/// pipe while we are still blocked writing its stdin.
async fn pump(
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    input: Option<InputStream<'_>>,
    output: OutputTarget<'_>,
) -> io::Result<Pumped> {
    let stdout_pump = async move {
        match output {
            OutputTarget::Writer(writer) => {
                let copied = copy_to_writer(stdout, writer).await?;
                debug!(bytes = copied, "stdout copied to writer");
                Ok::<_, io::Error>(None)
            }
            OutputTarget::StatusOnly | OutputTarget::Buffer => {
                let bytes = drain(stdout).await?;
                debug!(bytes = bytes.len(), "stdout drained");
                Ok(Some(bytes))
            }
        }
    };

    let stderr_pump = async move {
        let bytes = drain(stderr).await?;
        debug!(bytes = bytes.len(), "stderr drained");
        Ok::<_, io::Error>(bytes)
    };

    let (_, stderr, stdout) = tokio::try_join!(feed(stdin, input), stderr_pump, stdout_pump)?;

    Ok(Pumped { stderr, stdout })
}

/// Copy the caller's input into the child, then close its stdin
async fn feed(stdin: Option<ChildStdin>, input: Option<InputStream<'_>>) -> io::Result<u64> {
    let (Some(mut stdin), Some(mut input)) = (stdin, input) else {
        return Ok(0);
    };

    let copied = match tokio::io::copy(&mut input, &mut stdin).await {
        Ok(copied) => copied,
        // The tool may exit without reading all of its input
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("jpegoptim closed stdin early");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    match stdin.shutdown().await {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e),
        _ => {}
    }
    drop(stdin);

    debug!(bytes = copied, "stdin fed");
    Ok(copied)
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut bytes).await?;
    }
    Ok(bytes)
}

async fn copy_to_writer(
    pipe: Option<ChildStdout>,
    writer: &mut (dyn AsyncWrite + Send + Unpin),
) -> io::Result<u64> {
    let Some(mut pipe) = pipe else {
        return Ok(0);
    };
    let copied = tokio::io::copy(&mut pipe, writer).await?;
    writer.flush().await?;
    Ok(copied)
}

async fn cancelled(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use optijpeg_core::cancel::cancel_channel;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn invocation<'a>(
        program: &str,
        args: &[&str],
        input: Option<InputStream<'a>>,
        output: OutputTarget<'a>,
    ) -> Invocation<'a> {
        Invocation {
            program: PathBuf::from(program),
            args: args.iter().map(|a| a.to_string()).collect(),
            input,
            output,
            timeout: None,
            cancel: None,
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn spawn_error(program: &Path) -> ExecutionError {
        let inv = Invocation {
            program: program.to_path_buf(),
            args: vec!["-b".to_string()],
            input: None,
            output: OutputTarget::StatusOnly,
            timeout: None,
            cancel: None,
        };
        SubprocessRunner::new().run(inv).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_status_on_stdout_for_path_mode() {
        let runner = SubprocessRunner::new();
        let script = "echo 'a.jpg,1x1,8bit,N,10,9,10.00,optimized'; echo warn >&2";

        let raw = runner
            .run(invocation("sh", &["-c", script], None, OutputTarget::StatusOnly))
            .await
            .unwrap();

        assert_eq!(raw.status_text, "a.jpg,1x1,8bit,N,10,9,10.00,optimized\n");
        assert_eq!(raw.diagnostics, "warn\n");
        assert_eq!(raw.exit_code, Some(0));
        assert!(raw.buffer.is_none());
    }

    #[tokio::test]
    async fn test_status_on_stderr_for_writer_mode() {
        let runner = SubprocessRunner::new();
        let mut sink: Vec<u8> = Vec::new();

        let raw = runner
            .run(invocation(
                "sh",
                &["-c", "printf image; echo status >&2"],
                None,
                OutputTarget::Writer(&mut sink),
            ))
            .await
            .unwrap();

        assert_eq!(raw.status_text, "status\n");
        assert!(raw.buffer.is_none());
        assert_eq!(sink, b"image");
    }

    #[tokio::test]
    async fn test_buffer_mode_collects_stdout() {
        let runner = SubprocessRunner::new();

        let raw = runner
            .run(invocation(
                "sh",
                &["-c", "printf image; echo status >&2"],
                None,
                OutputTarget::Buffer,
            ))
            .await
            .unwrap();

        assert_eq!(raw.status_text, "status\n");
        assert_eq!(raw.buffer.as_deref(), Some(&b"image"[..]));
    }

    #[tokio::test]
    async fn test_large_input_and_output_do_not_deadlock() {
        // Well past the default 64 KiB pipe buffer in both directions
        let data = payload(4 * 1024 * 1024);
        let runner = SubprocessRunner::new();

        let run = runner.run(invocation(
            "cat",
            &[],
            Some(Box::new(Cursor::new(data.clone()))),
            OutputTarget::Buffer,
        ));
        let raw = tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("pipe deadlock")
            .unwrap();

        assert_eq!(raw.buffer.map(|b| b.len()), Some(data.len()));
    }

    #[tokio::test]
    async fn test_large_input_streamed_to_writer() {
        let data = payload(1024 * 1024);
        let runner = SubprocessRunner::new();
        let mut sink: Vec<u8> = Vec::new();

        let run = runner.run(invocation(
            "sh",
            &["-c", "cat; echo done >&2"],
            Some(Box::new(Cursor::new(data.clone()))),
            OutputTarget::Writer(&mut sink),
        ));
        let raw = tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("pipe deadlock")
            .unwrap();

        assert_eq!(raw.status_text, "done\n");
        assert_eq!(sink, data);
    }

    #[tokio::test]
    async fn test_both_channels_drained_in_path_mode() {
        let runner = SubprocessRunner::new();
        let script = "head -c 300000 /dev/zero; head -c 300000 /dev/zero >&2";

        let run = runner.run(invocation("sh", &["-c", script], None, OutputTarget::StatusOnly));
        let raw = tokio::time::timeout(Duration::from_secs(30), run)
            .await
            .expect("pipe deadlock")
            .unwrap();

        assert_eq!(raw.status_text.len(), 300000);
        assert_eq!(raw.diagnostics.len(), 300000);
    }

    #[tokio::test]
    async fn test_chunked_reader_input() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hello ")
            .read(b"world")
            .build();
        let runner = SubprocessRunner::new();

        let raw = runner
            .run(invocation("cat", &[], Some(Box::new(reader)), OutputTarget::Buffer))
            .await
            .unwrap();

        assert_eq!(raw.buffer.as_deref(), Some(&b"hello world"[..]));
    }

    #[tokio::test]
    async fn test_early_exit_ignores_broken_stdin() {
        let data = payload(2 * 1024 * 1024);
        let runner = SubprocessRunner::new();

        let raw = runner
            .run(invocation(
                "sh",
                &["-c", "echo bye >&2"],
                Some(Box::new(Cursor::new(data))),
                OutputTarget::Buffer,
            ))
            .await
            .unwrap();

        assert_eq!(raw.status_text, "bye\n");
        assert_eq!(raw.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_unavailable() {
        let runner = SubprocessRunner::new();

        let err = runner
            .run(invocation(
                "/nonexistent/bin/jpegoptim",
                &["-b"],
                None,
                OutputTarget::StatusOnly,
            ))
            .await
            .unwrap_err();

        match err {
            ExecutionError::ToolUnavailable { program, source } => {
                assert_eq!(program, "/nonexistent/bin/jpegoptim");
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_executable_binary_is_tool_unavailable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("jpegoptim");
        std::fs::write(&program, "#!/bin/sh\necho never\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = spawn_error(&program).await;

        match err {
            ExecutionError::ToolUnavailable { program: name, source } => {
                assert_eq!(name, program.display().to_string());
                assert_eq!(source.kind(), ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_informational() {
        let runner = SubprocessRunner::new();

        let raw = runner
            .run(invocation(
                "sh",
                &["-c", "echo line; exit 3"],
                None,
                OutputTarget::StatusOnly,
            ))
            .await
            .unwrap();

        assert_eq!(raw.status_text, "line\n");
        assert_eq!(raw.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = SubprocessRunner::with_grace_period(Duration::from_millis(200));
        let mut inv = invocation("sleep", &["10"], None, OutputTarget::StatusOnly);
        inv.timeout = Some(Duration::from_millis(100));

        let started = Instant::now();
        let err = runner.run(inv).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(100)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_timeout_escalates_to_sigkill() {
        let runner = SubprocessRunner::with_grace_period(Duration::from_millis(200));
        let mut inv = invocation(
            "sh",
            &["-c", "trap '' TERM; while :; do sleep 1; done"],
            None,
            OutputTarget::StatusOnly,
        );
        inv.timeout = Some(Duration::from_millis(100));

        let started = Instant::now();
        let err = runner.run(inv).await.unwrap_err();

        assert!(matches!(err, ExecutionError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_process() {
        let runner = SubprocessRunner::new();
        let (tx, token) = cancel_channel();
        let mut inv = invocation("sleep", &["10"], None, OutputTarget::StatusOnly);
        inv.cancel = Some(token);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.cancel();
        });

        let started = Instant::now();
        let err = runner.run(inv).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, ExecutionError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_never_spawns() {
        let runner = SubprocessRunner::new();
        let (tx, token) = cancel_channel();
        tx.cancel();

        let mut inv = invocation(
            "/nonexistent/bin/jpegoptim",
            &[],
            None,
            OutputTarget::StatusOnly,
        );
        inv.cancel = Some(token);

        let err = runner.run(inv).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Cancelled));
    }
}
