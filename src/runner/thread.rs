use crate::assertions::Outcome;
use crate::registry::TestUnit;
use crate::runner::worker::run_contained;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Runs each unit on its own OS thread.
///
/// Panics are contained and reported as `Crash`. Fatal signals are not: a
/// segmentation fault in a unit takes the whole process down, which is why
/// process isolation is the default.
///
/// A unit that exceeds its timeout is reported as `Timeout` and its thread is
/// detached. Rust offers no way to stop a running thread, so the thread keeps
/// executing and keeps every resource it holds until it returns on its own or
/// the process exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSupervisor;

impl ThreadSupervisor {
    pub async fn run(&self, unit: &TestUnit, limit: Duration) -> Outcome {
        let (tx, rx) = oneshot::channel();
        let worker_unit = unit.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("unit-{}", unit.name()))
            .spawn(move || {
                let outcome = run_contained(&worker_unit);
                let _ = tx.send(outcome);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Failed to spawn thread for unit '{}': {}", unit.name(), e);
                return Outcome::crashed(format!("failed to spawn worker: {}", e));
            }
        };

        match timeout(limit, rx).await {
            Ok(Ok(outcome)) => {
                let _ = handle.join();
                outcome
            }
            Ok(Err(_)) => {
                // The sender only disappears without sending if the worker died
                // outside of the contained body.
                let _ = handle.join();
                Outcome::crashed("worker thread exited without reporting an outcome")
            }
            Err(_) => {
                tracing::warn!(
                    "unit '{}' timed out after {:?}; detaching its thread",
                    unit.name(),
                    limit
                );
                drop(handle);
                Outcome::timed_out()
            }
        }
    }
}
