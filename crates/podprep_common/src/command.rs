//! External command execution.
//!
//! One process per call, captured stdout/stderr, no interpretation of the
//! exit code. Cancellation is cooperative: an in-flight process is killed
//! when the cancel signal fires and the call resolves with a partial
//! result rather than an error.

use crate::types::CommandResult;
use std::fmt;
use std::future::Future;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Maximum captured output per stream. Anything beyond is dropped.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// A single external command: program plus arguments, no shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    redact_args: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redact_args: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Hide the arguments from every rendered form of this spec. For
    /// command lines that embed credentials; the process still receives
    /// the real argv.
    pub fn redact(mut self) -> Self {
        self.redact_args = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        if self.redact_args {
            return write!(f, " <arguments redacted>");
        }
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Seam between the provisioning engine and the host process boundary.
///
/// The engine is generic over this trait so the whole workflow can be
/// exercised against a scripted fake in tests.
pub trait Runner: Send + Sync {
    /// Run the command to completion, capturing stdout and stderr.
    fn run(&self, spec: &CommandSpec)
        -> impl Future<Output = io::Result<CommandResult>> + Send;

    /// Run the command, killing it if `cancel` flips to `true` before it
    /// exits. Cancellation resolves with a partial result, never an error.
    fn run_cancellable(
        &self,
        spec: &CommandSpec,
        cancel: watch::Receiver<bool>,
    ) -> impl Future<Output = io::Result<CommandResult>> + Send;
}

/// Real implementation over `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

impl HostRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Runner for HostRunner {
    async fn run(&self, spec: &CommandSpec) -> io::Result<CommandResult> {
        debug!("Executing: {}", spec);

        let output = Command::new(spec.program())
            .args(spec.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        Ok(CommandResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: capture(&output.stdout),
            stderr: capture(&output.stderr),
        })
    }

    async fn run_cancellable(
        &self,
        spec: &CommandSpec,
        mut cancel: watch::Receiver<bool>,
    ) -> io::Result<CommandResult> {
        debug!("Executing (cancellable): {}", spec);

        let mut child = Command::new(spec.program())
            .args(spec.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_task = tokio::spawn(drain(child.stdout.take()));
        let stderr_task = tokio::spawn(drain(child.stderr.take()));

        let exit_code = tokio::select! {
            status = child.wait() => status?.code().unwrap_or(-1),
            _ = cancel_requested(&mut cancel) => {
                warn!("Cancellation requested, killing: {}", spec);
                let _ = child.start_kill();
                let _ = child.wait().await;
                -1
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        Ok(CommandResult {
            exit_code,
            stdout: capture(&stdout),
            stderr: capture(&stderr),
        })
    }
}

/// Resolve when the cancel signal is (or becomes) `true`.
///
/// Pends forever if the sender is dropped without cancelling, so callers
/// racing this against process exit are unaffected.
pub async fn cancel_requested(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn drain<R>(pipe: Option<R>) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    buf
}

fn capture(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_OUTPUT_BYTES {
        &bytes[..MAX_OUTPUT_BYTES]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn spec_display_joins_argv() {
        let spec = CommandSpec::new("wsl.exe").args(["--list", "--quiet"]);
        assert_eq!(spec.to_string(), "wsl.exe --list --quiet");
    }

    #[test]
    fn redacted_spec_display_hides_arguments() {
        let spec = CommandSpec::new("wsl.exe")
            .args(["-d", "Ubuntu", "--exec", "bash", "-c"])
            .arg("echo podman:hunter2 | chpasswd")
            .redact();

        let line = spec.to_string();
        assert_eq!(line, "wsl.exe <arguments redacted>");
        // The process itself still gets the real argv.
        assert!(spec.argv().iter().any(|a| a.contains("hunter2")));
    }

    #[derive(Clone, Default)]
    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogSink {
        type Writer = LogSink;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn redacted_command_line_stays_out_of_debug_logs() {
        let sink = LogSink::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(sink.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let runner = HostRunner::new();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo podman:hunter2 | cat >/dev/null"])
            .redact();
        runner.run(&spec).await.unwrap();

        let log = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("Executing"), "expected a debug line: {log}");
        assert!(!log.contains("hunter2"), "credential leaked into the log: {log}");
    }

    #[tokio::test]
    async fn run_captures_stdout_and_exit_code() {
        let runner = HostRunner::new();
        let spec = CommandSpec::new("echo").arg("hello");

        let result = runner.run(&spec).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_surfaced_not_thrown() {
        let runner = HostRunner::new();
        let spec = CommandSpec::new("sh").args(["-c", "echo oops >&2; exit 3"]);

        let result = runner.run(&spec).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn cancellation_kills_process_and_resolves() {
        let runner = HostRunner::new();
        let spec = CommandSpec::new("sleep").arg("30");
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { runner.run_cancellable(&spec, rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancelled run must resolve promptly")
            .unwrap()
            .unwrap();
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn cancellable_run_completes_normally_without_cancel() {
        let runner = HostRunner::new();
        let spec = CommandSpec::new("echo").arg("done");
        let (_tx, rx) = watch::channel(false);

        let result = runner.run_cancellable(&spec, rx).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("done"));
    }
}
