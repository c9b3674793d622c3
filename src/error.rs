use thiserror::Error;

/// Failures of the runner itself. A failing unit is never an error; it is
/// reported through its `Outcome`.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Invalid test filter: {0}")]
    InvalidFilter(String),

    #[error("{0}")]
    Arguments(#[from] clap::Error),

    #[error("Failed to locate the current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to spawn worker for unit '{unit}': {source}")]
    Spawn {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker for unit '{unit}' could not be observed: {source}")]
    Wait {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unit index {index} does not exist in a registry of {len} units")]
    UnknownUnit { index: usize, len: usize },

    #[error("Unit {index} is '{actual}' but the supervisor expected '{expected}'")]
    UnitMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
