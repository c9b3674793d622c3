//! Worker side of process isolation.
//!
//! The supervisor re-executes the test binary with [`UNIT_INDEX_ENV`] and
//! [`UNIT_NAME_ENV`] set. The worker rebuilds the same registry, runs exactly
//! that unit, and reports its outcome as a sentinel line on stdout.

use crate::assertions::{Outcome, SourceLocation};
use crate::error::RunnerError;
use crate::registry::{Registry, TestUnit};
use crate::runner::sentinel::format_sentinel;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

pub const UNIT_INDEX_ENV: &str = "BULWARK_UNIT_INDEX";
pub const UNIT_NAME_ENV: &str = "BULWARK_UNIT_NAME";

static PANIC_HOOK: Once = Once::new();

thread_local! {
    static LAST_PANIC_LOCATION: RefCell<Option<SourceLocation>> = const { RefCell::new(None) };
    static IN_UNIT: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerRequest {
    pub index: usize,
    pub name: String,
}

/// The unit this process was asked to run, if it is a worker.
pub fn worker_request() -> Option<Result<WorkerRequest, RunnerError>> {
    let raw_index = std::env::var(UNIT_INDEX_ENV).ok()?;
    let name = std::env::var(UNIT_NAME_ENV).unwrap_or_default();

    Some(
        raw_index
            .parse::<usize>()
            .map(|index| WorkerRequest { index, name })
            .map_err(|e| {
                RunnerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{}='{}': {}", UNIT_INDEX_ENV, raw_index, e),
                ))
            }),
    )
}

pub fn run_worker(registry: &Registry, request: &WorkerRequest) -> Result<(), RunnerError> {
    let unit = registry
        .get(request.index)
        .ok_or(RunnerError::UnknownUnit {
            index: request.index,
            len: registry.len(),
        })?;

    if unit.name() != request.name {
        return Err(RunnerError::UnitMismatch {
            index: request.index,
            expected: request.name.clone(),
            actual: unit.name().to_string(),
        });
    }

    install_panic_hook();
    let outcome = run_contained(unit);

    let line = format_sentinel(request.index, &outcome).map_err(std::io::Error::from)?;
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "\n{}\n", line)?;
    stdout.flush()?;
    Ok(())
}

/// Silences panics raised by a unit body and remembers where they happened.
/// Panics anywhere else still reach the previously installed hook. Only the
/// first call installs anything.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !IN_UNIT.with(Cell::get) {
                previous(info);
                return;
            }
            if let Some(location) = info.location() {
                let location = SourceLocation::new(location.file(), location.line());
                LAST_PANIC_LOCATION.with(|slot| *slot.borrow_mut() = Some(location));
            }
        }));
    });
}

/// Runs the unit on the current thread, turning a panic into a `Crash`.
pub fn run_contained(unit: &TestUnit) -> Outcome {
    let mut outcome = Outcome::new();
    LAST_PANIC_LOCATION.with(|slot| slot.borrow_mut().take());

    IN_UNIT.with(|flag| flag.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| unit.invoke(&mut outcome)));
    IN_UNIT.with(|flag| flag.set(false));

    if let Err(payload) = result {
        let location = LAST_PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
        outcome.mark_crashed(format!("panic: {}", panic_message(payload.as_ref())), location);
    }

    outcome
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}
