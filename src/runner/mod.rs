pub mod executor;
pub mod options;
pub mod process;
pub mod reporter;
pub mod sentinel;
mod signals;
pub mod supervisor;
pub mod thread;
pub mod worker;

pub use executor::{execute, report, run, run_registry};
pub use options::{parse_args, RunnerOptions, TestFilter};
pub use reporter::{OutputFormat, Palette, RunSummary};
pub use supervisor::{Isolation, Supervisor, UnitRun};
