use crate::assertions::{Outcome, SourceLocation, Status};
use crate::runner::supervisor::UnitRun;
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Progress glyphs per output line.
const LINE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Decides whether rendered text carries ANSI styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colored: bool,
}

impl Palette {
    pub const COLORED: Palette = Palette { colored: true };
    pub const PLAIN: Palette = Palette { colored: false };

    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn paint(self, text: impl fmt::Display, style: Style) -> String {
        if self.colored {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::COLORED
    }
}

#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub name: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
}

/// Totals and failure log of one complete run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub total: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub timeout: Duration,
    pub failures: Vec<String>,
    pub units: Vec<UnitRecord>,
    pub start_time: u64,
    pub stop_time: u64,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.total - self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Accumulates unit results as they complete.
pub struct Aggregator {
    timeout: Duration,
    verbose: bool,
    palette: Palette,
    started: Instant,
    start_time: u64,
    failed: usize,
    failures: Vec<String>,
    units: Vec<UnitRecord>,
}

impl Aggregator {
    /// Starts the run clock. Create it immediately before the first unit runs.
    pub fn new(timeout: Duration, verbose: bool, palette: Palette) -> Self {
        Self {
            timeout,
            verbose,
            palette,
            started: Instant::now(),
            start_time: epoch_millis(),
            failed: 0,
            failures: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn record(&mut self, name: &str, run: UnitRun) {
        if run.outcome.status.is_failure() {
            self.failed += 1;
            let stderr = if self.verbose { run.stderr.as_str() } else { "" };
            self.failures.push(format_failure(
                name,
                &run.outcome,
                self.timeout,
                stderr,
                self.palette,
            ));
        }

        self.units.push(UnitRecord {
            name: name.to_string(),
            outcome: run.outcome,
            duration_ms: run.duration.as_millis() as u64,
            stdout: run.stdout,
            stderr: run.stderr,
        });
    }

    pub fn finalize(self) -> RunSummary {
        RunSummary {
            total: self.units.len(),
            failed: self.failed,
            elapsed: self.started.elapsed(),
            timeout: self.timeout,
            failures: self.failures,
            units: self.units,
            start_time: self.start_time,
            stop_time: epoch_millis(),
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn format_seconds(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.2}", duration.as_secs_f64())
    }
}

fn location_text(location: Option<&SourceLocation>) -> String {
    location
        .map(ToString::to_string)
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// One failure-log entry. Returns an empty string for a passing outcome.
pub fn format_failure(
    name: &str,
    outcome: &Outcome,
    timeout: Duration,
    stderr: &str,
    palette: Palette,
) -> String {
    let bold = Style::new().bold();
    let location = || palette.paint(location_text(outcome.location.as_ref()), bold);

    let mut message = match outcome.status {
        Status::Pass => return String::new(),
        Status::Fail => format!(
            "{}: assertion in '{}' {}:\n\t'{}'",
            location(),
            palette.paint(name, bold),
            palette.paint("failed", Style::new().red().bold()),
            palette.paint(
                outcome.failing_expression.as_deref().unwrap_or_default(),
                Style::new().yellow().bold()
            )
        ),
        Status::ForcedFail => format!(
            "{}: '{}' {}.",
            location(),
            palette.paint(name, bold),
            palette.paint("forcefully failed", Style::new().red().bold())
        ),
        Status::Crash => {
            let mut message = format!(
                "unit '{}' had to restore because of fatal signal ({})",
                palette.paint(name, bold),
                palette.paint(
                    outcome.fault_signal.as_deref().unwrap_or("unknown fault"),
                    Style::new().red().bold()
                )
            );
            if let Some(location) = &outcome.location {
                message.push_str(&format!(" at {}", location));
            }
            message
        }
        Status::Timeout => format!(
            "unit '{}' {} (took {} seconds).",
            palette.paint(name, bold),
            palette.paint("timed out", Style::new().yellow().bold()),
            palette.paint(format_seconds(timeout), Style::new().yellow().bold())
        ),
    };

    for line in stderr.lines() {
        message.push_str(&format!("\n\t{} {}", palette.paint("|", Style::new().dimmed()), line));
    }

    message
}

/// Glyph printed as soon as a unit finishes, preceded by a line break every
/// [`LINE_WIDTH`] units.
pub fn progress_glyph(index: usize, status: Status, palette: Palette) -> String {
    let glyph = match status {
        Status::Pass => palette.paint(".", Style::new().on_green().bold()),
        Status::Fail | Status::ForcedFail => palette.paint(":", Style::new().on_red().bold()),
        Status::Crash => palette.paint("!", Style::new().on_red().bold()),
        Status::Timeout => palette.paint("?", Style::new().on_yellow().bold()),
    };

    if index != 0 && index % LINE_WIDTH == 0 {
        format!("\n{}", glyph)
    } else {
        glyph
    }
}

pub trait OutputFormatter {
    fn format(&self, summary: &RunSummary) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter {
    palette: Palette,
}

impl TextFormatter {
    pub fn new(palette: Palette) -> Self {
        Self { palette }
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, summary: &RunSummary) -> String {
        let palette = self.palette;
        let mut result = String::from("\n\n");

        for failure in &summary.failures {
            result.push_str(failure);
            result.push('\n');
        }
        if !summary.failures.is_empty() {
            result.push('\n');
        }

        result.push_str(&format!(
            "tests took {:.2} seconds\n",
            summary.elapsed.as_secs_f64()
        ));

        let green = Style::new().green().bold();
        let red = Style::new().red().bold();
        let yellow = Style::new().yellow().bold();

        if summary.has_failures() {
            result.push_str(&format!(
                "{} and {} of {}\n{}",
                palette.paint(format!("{} successful", summary.passed()), green),
                palette.paint(format!("{} failed", summary.failed), red),
                palette.paint(format!("{} run", summary.total), yellow),
                palette.paint("FAILURE", red)
            ));
        } else {
            result.push_str(&format!(
                "{} of {}\n{}",
                palette.paint(format!("{} successful", summary.passed()), green),
                palette.paint(format!("{} run", summary.total), yellow),
                palette.paint("SUCCESS", green)
            ));
        }

        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CtrfStatus {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub report_format: &'static str,
    pub spec_version: &'static str,
    pub results: Results,
}

#[derive(Debug, Clone, Serialize)]
pub struct Results {
    pub tool: Tool,
    pub summary: Summary,
    pub tests: Vec<Test>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub other: usize,
    pub start: u64,
    pub stop: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub name: String,
    pub status: CtrfStatus,
    pub raw_status: Status,
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stdout: Vec<String>,
}

pub struct JsonFormatter;

impl JsonFormatter {
    fn build_test(record: &UnitRecord, timeout: Duration) -> Test {
        let outcome = &record.outcome;
        let failed = outcome.status.is_failure();

        let message =
            failed.then(|| format_failure(&record.name, outcome, timeout, "", Palette::PLAIN));
        let trace = (failed && !record.stderr.is_empty()).then(|| record.stderr.clone());

        Test {
            name: record.name.clone(),
            status: if failed {
                CtrfStatus::Failed
            } else {
                CtrfStatus::Passed
            },
            raw_status: outcome.status,
            duration: record.duration_ms,
            file_path: outcome.location.as_ref().map(|l| l.file.clone()),
            line: outcome.location.as_ref().map(|l| l.line),
            message,
            trace,
            stdout: record.stdout.lines().map(str::to_string).collect(),
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, summary: &RunSummary) -> String {
        let report = Report {
            report_format: "CTRF",
            spec_version: "0.0.0",
            results: Results {
                tool: Tool {
                    name: "bulwark",
                    version: Some(env!("CARGO_PKG_VERSION")),
                },
                summary: Summary {
                    tests: summary.total,
                    passed: summary.passed(),
                    failed: summary.failed,
                    pending: 0,
                    skipped: 0,
                    other: 0,
                    start: summary.start_time,
                    stop: summary.stop_time,
                },
                tests: summary
                    .units
                    .iter()
                    .map(|record| Self::build_test(record, summary.timeout))
                    .collect(),
            },
        };

        serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            let escaped = serde_json::to_string(&e.to_string())
                .unwrap_or_else(|_| "\"serialization error\"".to_string());
            format!("{{\"error\": {}}}", escaped)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn unit_run(outcome: Outcome) -> UnitRun {
        UnitRun {
            outcome,
            duration: Duration::from_millis(5),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn failed_assertion(expression: &str) -> Outcome {
        let mut outcome = Outcome::new();
        outcome.assert(false, expression, "src/ex.rs", 21);
        outcome
    }

    fn plain_failure(name: &str, outcome: &Outcome, timeout: Duration) -> String {
        format_failure(name, outcome, timeout, "", Palette::PLAIN)
    }

    fn mixed_summary(palette: Palette) -> RunSummary {
        let mut aggregator = Aggregator::new(TIMEOUT, false, palette);
        aggregator.record("adds", unit_run(Outcome::new()));
        aggregator.record("strings_invalid", unit_run(failed_assertion("\"Evil\" == \"Good\"")));
        aggregator.record(
            "null_write",
            unit_run(Outcome::crashed("Segmentation fault (SIGSEGV)")),
        );
        aggregator.finalize()
    }

    #[test]
    fn test_all_passing_summary() {
        let mut aggregator = Aggregator::new(TIMEOUT, false, Palette::PLAIN);
        for name in ["a", "b", "c"] {
            aggregator.record(name, unit_run(Outcome::new()));
        }
        let summary = aggregator.finalize();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_mixed_summary_counts_failures() {
        let summary = mixed_summary(Palette::PLAIN);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_every_failing_status_counts() {
        let mut aggregator = Aggregator::new(TIMEOUT, false, Palette::PLAIN);
        let mut forced = Outcome::new();
        forced.force_fail("f.rs", 1);
        aggregator.record("fail", unit_run(failed_assertion("x")));
        aggregator.record("forced", unit_run(forced));
        aggregator.record("crash", unit_run(Outcome::crashed("Aborted (SIGABRT)")));
        aggregator.record("timeout", unit_run(Outcome::timed_out()));
        let summary = aggregator.finalize();

        assert_eq!(summary.failed, 4);
        assert_eq!(summary.failures.len(), 4);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_empty_run_succeeds() {
        let summary = Aggregator::new(TIMEOUT, false, Palette::PLAIN).finalize();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn test_units_keep_record_order() {
        let summary = mixed_summary(Palette::PLAIN);
        let names: Vec<_> = summary.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["adds", "strings_invalid", "null_write"]);
    }

    #[test]
    fn test_assertion_failure_message() {
        let message = plain_failure(
            "strings_invalid",
            &failed_assertion("\"Evil\" == \"Good\""),
            TIMEOUT,
        );
        assert_eq!(
            message,
            "src/ex.rs:21: assertion in 'strings_invalid' failed:\n\t'\"Evil\" == \"Good\"'"
        );
    }

    #[test]
    fn test_colored_message_has_same_text() {
        let outcome = failed_assertion("1 == 2");
        let colored = format_failure("adds", &outcome, TIMEOUT, "", Palette::COLORED);

        assert!(colored.contains('\x1b'));
        assert!(colored.contains("\n\t"));
        assert!(!plain_failure("adds", &outcome, TIMEOUT).contains('\x1b'));
    }

    #[test]
    fn test_forced_failure_message() {
        let mut outcome = Outcome::new();
        outcome.force_fail("src/ex.rs", 40);
        assert_eq!(
            plain_failure("forced", &outcome, TIMEOUT),
            "src/ex.rs:40: 'forced' forcefully failed."
        );
    }

    #[test]
    fn test_crash_message_names_fault() {
        let message = plain_failure(
            "null_write",
            &Outcome::crashed("Segmentation fault (SIGSEGV)"),
            TIMEOUT,
        );
        assert_eq!(
            message,
            "unit 'null_write' had to restore because of fatal signal (Segmentation fault (SIGSEGV))"
        );
    }

    #[test]
    fn test_crash_message_with_panic_location() {
        let mut outcome = Outcome::new();
        outcome.mark_crashed("panic: boom", Some(SourceLocation::new("src/ex.rs", 7)));
        let message = plain_failure("panics", &outcome, TIMEOUT);
        assert!(message.ends_with("(panic: boom) at src/ex.rs:7"));
    }

    #[test]
    fn test_timeout_message_uses_configured_duration() {
        let message = plain_failure("hangs", &Outcome::timed_out(), Duration::from_secs(7));
        assert_eq!(message, "unit 'hangs' timed out (took 7 seconds).");

        let message = plain_failure("hangs", &Outcome::timed_out(), Duration::from_millis(1500));
        assert_eq!(message, "unit 'hangs' timed out (took 1.50 seconds).");
    }

    #[test]
    fn test_verbose_failure_includes_stderr() {
        let mut aggregator = Aggregator::new(TIMEOUT, true, Palette::PLAIN);
        aggregator.record(
            "noisy",
            UnitRun {
                stderr: "first\nsecond\n".to_string(),
                ..unit_run(Outcome::crashed("Aborted (SIGABRT)"))
            },
        );
        let summary = aggregator.finalize();
        assert!(summary.failures[0].ends_with("\n\t| first\n\t| second"));
    }

    #[test]
    fn test_quiet_failure_omits_stderr() {
        let mut aggregator = Aggregator::new(TIMEOUT, false, Palette::PLAIN);
        aggregator.record(
            "noisy",
            UnitRun {
                stderr: "first\n".to_string(),
                ..unit_run(Outcome::crashed("Aborted (SIGABRT)"))
            },
        );
        assert!(!aggregator.finalize().failures[0].contains("first"));
    }

    #[test]
    fn test_pass_has_no_message() {
        assert!(plain_failure("ok", &Outcome::new(), TIMEOUT).is_empty());
    }

    #[test]
    fn test_progress_glyphs() {
        let glyph = |index, status| progress_glyph(index, status, Palette::PLAIN);
        assert_eq!(glyph(0, Status::Pass), ".");
        assert_eq!(glyph(1, Status::Fail), ":");
        assert_eq!(glyph(2, Status::ForcedFail), ":");
        assert_eq!(glyph(3, Status::Crash), "!");
        assert_eq!(glyph(4, Status::Timeout), "?");
    }

    #[test]
    fn test_colored_glyph_is_styled() {
        let glyph = progress_glyph(0, Status::Crash, Palette::COLORED);
        assert!(glyph.starts_with('\x1b'));
        assert!(glyph.contains('!'));
    }

    #[test]
    fn test_progress_wraps_every_eighty_units() {
        let glyph = |index, status| progress_glyph(index, status, Palette::PLAIN);
        assert_eq!(glyph(79, Status::Pass), ".");
        assert_eq!(glyph(80, Status::Pass), "\n.");
        assert_eq!(glyph(160, Status::Crash), "\n!");
    }

    #[test]
    fn test_text_report_success() {
        let mut summary = Aggregator::new(TIMEOUT, false, Palette::PLAIN).finalize();
        summary.total = 3;
        summary.elapsed = Duration::from_millis(1234);

        let text = TextFormatter::new(Palette::PLAIN).format(&summary);
        assert_eq!(
            text,
            "\n\ntests took 1.23 seconds\n3 successful of 3 run\nSUCCESS"
        );
    }

    #[test]
    fn test_text_report_failure() {
        let mut summary = mixed_summary(Palette::PLAIN);
        summary.elapsed = Duration::from_millis(500);

        let text = TextFormatter::new(Palette::PLAIN).format(&summary);
        assert!(text.starts_with(
            "\n\nsrc/ex.rs:21: assertion in 'strings_invalid' failed:\n\t'\"Evil\" == \"Good\"'\n"
        ));
        assert!(text.contains("fatal signal (Segmentation fault (SIGSEGV))\n\n"));
        assert!(text.ends_with(
            "tests took 0.50 seconds\n1 successful and 2 failed of 3 run\nFAILURE"
        ));
    }

    #[test]
    fn test_text_report_is_idempotent() {
        let summary = mixed_summary(Palette::COLORED);
        let formatter = TextFormatter::default();
        assert_eq!(formatter.format(&summary), formatter.format(&summary));
    }

    #[test]
    fn test_json_report() {
        let summary = mixed_summary(Palette::COLORED);
        let json = JsonFormatter.format(&summary);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        assert_eq!(value["reportFormat"], "CTRF");
        assert_eq!(value["results"]["tool"]["name"], "bulwark");
        assert_eq!(value["results"]["summary"]["tests"], 3);
        assert_eq!(value["results"]["summary"]["failed"], 2);

        let tests = value["results"]["tests"].as_array().unwrap();
        assert_eq!(tests.len(), 3);
        assert_eq!(tests[0]["status"], "passed");
        assert!(tests[0].get("message").is_none());
        assert_eq!(tests[1]["status"], "failed");
        assert_eq!(tests[1]["rawStatus"], "fail");
        assert_eq!(tests[1]["filePath"], "src/ex.rs");
        assert_eq!(tests[1]["line"], 21);
        assert_eq!(
            tests[1]["message"],
            "src/ex.rs:21: assertion in 'strings_invalid' failed:\n\t'\"Evil\" == \"Good\"'"
        );
        assert_eq!(tests[2]["rawStatus"], "crash");
        let message = tests[2]["message"].as_str().unwrap();
        assert!(!message.contains('\x1b'));
        assert!(message.contains("SIGSEGV"));
    }

    #[test]
    fn test_json_report_keeps_captured_output() {
        let mut aggregator = Aggregator::new(TIMEOUT, false, Palette::PLAIN);
        aggregator.record(
            "chatty",
            UnitRun {
                stdout: "one\n\ttwo\n".to_string(),
                stderr: "oops\n".to_string(),
                ..unit_run(Outcome::crashed("Aborted (SIGABRT)"))
            },
        );
        let json = JsonFormatter.format(&aggregator.finalize());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let test = &value["results"]["tests"][0];
        assert_eq!(test["stdout"], serde_json::json!(["one", "\ttwo"]));
        assert_eq!(test["trace"], "oops\n");
    }

    #[test]
    fn test_json_report_is_idempotent() {
        let summary = mixed_summary(Palette::COLORED);
        assert_eq!(JsonFormatter.format(&summary), JsonFormatter.format(&summary));
    }
}
