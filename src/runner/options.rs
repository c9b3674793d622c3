use crate::error::RunnerError;
use crate::runner::reporter::OutputFormat;
use crate::runner::supervisor::Isolation;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use regex::Regex;
use std::ffi::OsString;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

#[derive(Parser, Debug)]
#[command(name = "bulwark")]
#[command(about = "Runs every registered test unit in isolation")]
#[command(version)]
struct Cli {
    /// Seconds a unit may run before it is reported as timed out
    #[arg(
        short = 't',
        long,
        env = "BULWARK_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// How each unit is isolated from the runner
    #[arg(long, env = "BULWARK_ISOLATION", value_enum, default_value = "process")]
    isolation: Isolation,

    /// Filter units by name (exact match or /regex/)
    #[arg(long = "test")]
    test_filter: Option<String>,

    /// Output format
    #[arg(long = "output-format", value_enum, default_value = "text")]
    output_format: OutputFormat,

    /// Show what failing workers wrote to stderr
    #[arg(long, short)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    no_color: bool,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub timeout: Duration,
    pub isolation: Isolation,
    pub test_filter: Option<TestFilter>,
    pub output_format: OutputFormat,
    pub verbose: bool,
    pub color: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            isolation: Isolation::default(),
            test_filter: None,
            output_format: OutputFormat::default(),
            verbose: false,
            color: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedArgs {
    pub options: RunnerOptions,
    /// Arguments that were not recognized and have been ignored.
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum TestFilter {
    Exact(String),
    Regex(Regex),
}

impl TryFrom<&str> for TestFilter {
    type Error = RunnerError;

    fn try_from(pattern: &str) -> Result<Self, Self::Error> {
        if pattern.starts_with('/') && pattern.ends_with('/') && pattern.len() > 2 {
            let regex_pattern = &pattern[1..pattern.len() - 1];
            Regex::new(regex_pattern)
                .map(TestFilter::Regex)
                .map_err(|e| RunnerError::InvalidFilter(format!("Invalid regex pattern: {}", e)))
        } else {
            Ok(TestFilter::Exact(pattern.to_string()))
        }
    }
}

impl TestFilter {
    pub fn matches(&self, unit_name: &str) -> bool {
        match self {
            TestFilter::Exact(pattern) => unit_name == pattern,
            TestFilter::Regex(regex) => regex.is_match(unit_name),
        }
    }
}

/// Parses runner arguments. The first item is the program name.
///
/// Unrecognized options and stray arguments are collected into
/// [`ParsedArgs::unknown`] and parsing continues without them. Any other
/// clap error, including `--help` and `--version`, is returned as
/// [`RunnerError::Arguments`].
pub fn parse_args<I, T>(args: I) -> Result<ParsedArgs, RunnerError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let mut unknown = Vec::new();

    loop {
        let err = match Cli::try_parse_from(&args) {
            Ok(cli) => {
                return Ok(ParsedArgs {
                    options: cli.into_options()?,
                    unknown,
                })
            }
            Err(err) => err,
        };

        if err.kind() != ErrorKind::UnknownArgument {
            return Err(err.into());
        }

        let Some(ContextValue::String(invalid)) = err.get(ContextKind::InvalidArg) else {
            return Err(err.into());
        };
        let invalid = invalid.clone();

        if !remove_unknown(&mut args, &invalid) {
            return Err(err.into());
        }
        unknown.push(invalid);
    }
}

/// Drops `invalid` from `args`, skipping the program name. A short flag that
/// clap found inside a cluster such as `-vx` is cut out of the cluster.
fn remove_unknown(args: &mut Vec<OsString>, invalid: &str) -> bool {
    if let Some(position) = args.iter().skip(1).position(|arg| is_same_arg(arg, invalid)) {
        args.remove(position + 1);
        return true;
    }

    let Some(flag) = short_flag(invalid) else {
        return false;
    };

    for index in 1..args.len() {
        let Some(cluster) = args[index].to_str() else {
            continue;
        };
        if !is_short_cluster(cluster) {
            continue;
        }
        let Some(offset) = cluster[1..].find(flag) else {
            continue;
        };

        let mut rest = cluster.to_string();
        rest.remove(offset + 1);
        if rest == "-" {
            args.remove(index);
        } else {
            args[index] = OsString::from(rest);
        }
        return true;
    }

    false
}

fn is_same_arg(arg: &OsString, invalid: &str) -> bool {
    let arg = arg.to_string_lossy();
    arg == invalid || arg.starts_with(&format!("{}=", invalid))
}

fn short_flag(arg: &str) -> Option<char> {
    let mut chars = arg.strip_prefix('-')?.chars();
    match (chars.next(), chars.next()) {
        (Some(flag), None) if flag != '-' => Some(flag),
        _ => None,
    }
}

fn is_short_cluster(arg: &str) -> bool {
    arg.len() > 2 && arg.starts_with('-') && !arg.starts_with("--")
}

impl Cli {
    fn into_options(self) -> Result<RunnerOptions, RunnerError> {
        let test_filter = self
            .test_filter
            .as_deref()
            .map(TestFilter::try_from)
            .transpose()?;

        Ok(RunnerOptions {
            timeout: Duration::from_secs(self.timeout),
            isolation: self.isolation,
            test_filter,
            output_format: self.output_format,
            verbose: self.verbose,
            color: !self.no_color,
        })
    }
}
