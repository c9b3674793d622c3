#[macro_use]
mod macros;

#[doc(hidden)]
pub use macros::strings_equal;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pass,
    Fail,
    ForcedFail,
    Crash,
    Timeout,
}

impl Status {
    pub fn is_failure(self) -> bool {
        self != Status::Pass
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Fail => "fail",
            Status::ForcedFail => "forced_fail",
            Status::Crash => "crash",
            Status::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// The classified result of running one unit.
///
/// A unit body receives `&mut Outcome` and may only move it from `Pass` to
/// `Fail` or `ForcedFail`. `Crash` and `Timeout` are assigned by the
/// supervisor. Once an outcome holds a failing status it keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_signal: Option<String>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crashed(fault: impl Into<String>) -> Self {
        Self {
            status: Status::Crash,
            fault_signal: Some(fault.into()),
            ..Self::default()
        }
    }

    pub fn timed_out() -> Self {
        Self {
            status: Status::Timeout,
            ..Self::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    /// Boolean assertion primitive. Returns `false` when the caller must stop
    /// executing the unit body.
    pub fn assert(&mut self, eval: bool, code: &str, file: &str, line: u32) -> bool {
        if !self.passed() {
            return false;
        }
        if !eval {
            self.status = Status::Fail;
            self.failing_expression = Some(code.to_string());
            self.location = Some(SourceLocation::new(file, line));
        }
        eval
    }

    pub fn force_pass(&mut self, file: &str, line: u32) {
        if self.passed() {
            self.location = Some(SourceLocation::new(file, line));
        }
    }

    pub fn force_fail(&mut self, file: &str, line: u32) {
        if self.passed() {
            self.status = Status::ForcedFail;
            self.location = Some(SourceLocation::new(file, line));
        }
    }

    /// Records a contained fault. An outcome that already failed keeps its
    /// first classification.
    pub fn mark_crashed(&mut self, fault: impl Into<String>, location: Option<SourceLocation>) {
        if self.passed() {
            self.status = Status::Crash;
            self.fault_signal = Some(fault.into());
            self.location = location;
        }
    }
}
