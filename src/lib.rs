#[macro_use]
pub mod assertions;
pub mod error;
pub mod logging;
pub mod registry;
pub mod runner;

pub use assertions::{Outcome, SourceLocation, Status};
pub use error::RunnerError;
pub use registry::{Registry, TestUnit};
pub use runner::{run, OutputFormat, RunSummary, RunnerOptions};
