use crate::assertions::Outcome;
use crate::error::RunnerError;
use crate::registry::TestUnit;
use crate::runner::process::ProcessSupervisor;
use crate::runner::thread::ThreadSupervisor;
use std::ffi::OsString;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Isolation {
    /// Each unit runs in a re-executed copy of the test binary
    #[default]
    Process,
    /// Each unit runs on its own thread; only panics are contained
    Thread,
}

/// Everything observed while one unit ran.
#[derive(Debug, Clone)]
pub struct UnitRun {
    pub outcome: Outcome,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

/// Executes one unit inside a fresh isolation boundary with a bounded wait.
/// Every call yields exactly one outcome.
#[derive(Debug, Clone)]
pub enum Supervisor {
    Process(ProcessSupervisor),
    Thread(ThreadSupervisor),
}

impl Supervisor {
    pub fn new(isolation: Isolation, args: Vec<OsString>) -> Result<Self, RunnerError> {
        Ok(match isolation {
            Isolation::Process => Supervisor::Process(ProcessSupervisor::current(args)?),
            Isolation::Thread => Supervisor::Thread(ThreadSupervisor),
        })
    }

    pub async fn run(&self, index: usize, unit: &TestUnit, limit: Duration) -> UnitRun {
        let started = Instant::now();

        let (outcome, stdout, stderr) = match self {
            Supervisor::Process(supervisor) => {
                let run = supervisor.run(index, unit, limit).await;
                (run.outcome, run.stdout, run.stderr)
            }
            Supervisor::Thread(supervisor) => {
                (supervisor.run(unit, limit).await, String::new(), String::new())
            }
        };

        UnitRun {
            outcome,
            duration: started.elapsed(),
            stdout,
            stderr,
        }
    }
}
