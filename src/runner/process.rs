use crate::assertions::Outcome;
use crate::error::RunnerError;
use crate::registry::TestUnit;
use crate::runner::sentinel::extract_sentinel;
use crate::runner::signals::{signal_name, terminating_signal};
use crate::runner::worker::{UNIT_INDEX_ENV, UNIT_NAME_ENV};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// How long to keep draining a worker's pipes after it has exited or been killed.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct ProcessRun {
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
}

/// Runs each unit in a fresh copy of the current executable.
///
/// A crash or a hang only ever affects the worker process, and a timed-out
/// worker is killed outright, so forced cancellation always releases the
/// unit's resources.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSupervisor {
    pub fn new(program: PathBuf, args: Vec<OsString>) -> Self {
        Self { program, args }
    }

    /// Re-executes the running binary with the arguments it was started with.
    pub fn current(args: Vec<OsString>) -> Result<Self, RunnerError> {
        let program = std::env::current_exe().map_err(RunnerError::CurrentExe)?;
        Ok(Self::new(program, args))
    }

    pub async fn run(&self, index: usize, unit: &TestUnit, limit: Duration) -> ProcessRun {
        match self.try_run(index, unit, limit).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("{}", e);
                ProcessRun {
                    outcome: Outcome::crashed(match e {
                        RunnerError::Spawn { source, .. } => {
                            format!("failed to spawn worker: {}", source)
                        }
                        other => other.to_string(),
                    }),
                    ..ProcessRun::default()
                }
            }
        }
    }

    async fn try_run(
        &self,
        index: usize,
        unit: &TestUnit,
        limit: Duration,
    ) -> Result<ProcessRun, RunnerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(UNIT_INDEX_ENV, index.to_string())
            .env(UNIT_NAME_ENV, unit.name())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                unit: unit.name().to_string(),
                source,
            })?;

        tracing::debug!("worker for unit '{}' started (pid {:?})", unit.name(), child.id());

        let stdout_reader = child.stdout.take().map(PipeReader::spawn);
        let stderr_reader = child.stderr.take().map(PipeReader::spawn);

        let status = match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(source)) => {
                let _ = child.start_kill();
                return Err(RunnerError::Wait {
                    unit: unit.name().to_string(),
                    source,
                });
            }
            Err(_) => {
                tracing::info!("unit '{}' timed out after {:?}; killing worker", unit.name(), limit);
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };

        let stdout = drain(stdout_reader).await;
        let stderr = drain(stderr_reader).await;

        let Some(status) = status else {
            return Ok(ProcessRun {
                outcome: Outcome::timed_out(),
                stdout,
                stderr,
            });
        };

        let (outcome, stdout) = classify(index, status, stdout);
        Ok(ProcessRun {
            outcome,
            stdout,
            stderr,
        })
    }
}

/// Derives the unit's outcome from how its worker ended and what it printed.
/// Returns the outcome together with the unit's own output.
pub fn classify(index: usize, status: ExitStatus, stdout: String) -> (Outcome, String) {
    let extracted = extract_sentinel(&stdout, index);

    if let Some(signal) = terminating_signal(&status) {
        return (Outcome::crashed(signal_name(signal)), extracted.output);
    }

    match extracted.sentinel {
        Some(sentinel) => (sentinel.outcome, extracted.output),
        None => {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            (
                Outcome::crashed(format!(
                    "exited without reporting an outcome (exit status {})",
                    code
                )),
                extracted.output,
            )
        }
    }
}

/// Copies a worker pipe into a buffer that stays readable while the copy is
/// still running. A unit may leave a background process holding the pipe
/// open, so EOF is not guaranteed.
struct PipeReader {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeReader {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(mut pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);

        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        sink.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        });

        Self { buffer, task }
    }

    /// Waits up to [`DRAIN_TIMEOUT`] for EOF, then keeps whatever has arrived.
    async fn finish(mut self) -> String {
        if timeout(DRAIN_TIMEOUT, &mut self.task).await.is_err() {
            self.task.abort();
        }
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let output = String::from_utf8_lossy(&buffer).into_owned();
        output
    }
}

async fn drain(reader: Option<PipeReader>) -> String {
    match reader {
        Some(reader) => reader.finish().await,
        None => String::new(),
    }
}
