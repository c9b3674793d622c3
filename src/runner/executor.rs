use crate::error::RunnerError;
use crate::logging;
use crate::registry::{Registry, TestUnit};
use crate::runner::options::{parse_args, RunnerOptions};
use crate::runner::reporter::{
    progress_glyph, Aggregator, JsonFormatter, OutputFormat, OutputFormatter, Palette,
    RunSummary, TextFormatter,
};
use crate::runner::supervisor::{Isolation, Supervisor};
use crate::runner::worker::{install_panic_hook, run_worker, worker_request};
use owo_colors::OwoColorize;
use std::ffi::OsString;
use std::io::Write;

/// Builds the registry with `define`, runs every unit and reports the result.
/// Returns the process exit code: 0 when every unit passed, 1 otherwise, and
/// 2 when the runner itself could not do its job.
///
/// When the process was started as a worker for a single unit, only that unit
/// runs and its outcome is written to stdout for the supervising process.
pub fn run<I, T, F>(args: I, define: F) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
    F: FnOnce(&mut Registry),
{
    let request = worker_request();
    if request.is_none() {
        logging::init();
    }

    let mut registry = Registry::new();
    define(&mut registry);

    if let Some(request) = request {
        return match request.and_then(|request| run_worker(&registry, &request)) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{} {}", "Error:".red(), e);
                2
            }
        };
    }

    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    match run_registry(registry, args) {
        Ok(code) => code,
        Err(RunnerError::Arguments(e)) => {
            let _ = e.print();
            e.exit_code()
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            2
        }
    }
}

/// Runs an already populated registry. `args` starts with the program name.
pub fn run_registry(registry: Registry, args: Vec<OsString>) -> Result<i32, RunnerError> {
    logging::init();

    let parsed = parse_args(args.iter().cloned())?;
    let options = parsed.options;
    for arg in &parsed.unknown {
        match options.output_format {
            OutputFormat::Text => println!("unknown option '{}'.", arg),
            OutputFormat::Json => eprintln!("unknown option '{}'.", arg),
        }
    }

    let supervisor = Supervisor::new(options.isolation, args.iter().skip(1).cloned().collect())?;
    if options.isolation == Isolation::Thread {
        install_panic_hook();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RunnerError::Runtime)?;

    let summary = runtime.block_on(execute(&registry, &supervisor, &options));
    println!(
        "{}",
        report(&summary, options.output_format, Palette::new(options.color))
    );

    Ok(summary.exit_code())
}

/// Runs the selected units one after another, in registration order.
pub async fn execute(
    registry: &Registry,
    supervisor: &Supervisor,
    options: &RunnerOptions,
) -> RunSummary {
    let show_progress = options.output_format == OutputFormat::Text;
    let palette = Palette::new(options.color);

    let selected: Vec<(usize, &TestUnit)> = registry
        .iter()
        .enumerate()
        .filter(|(_, unit)| {
            options
                .test_filter
                .as_ref()
                .map(|filter| filter.matches(unit.name()))
                .unwrap_or(true)
        })
        .collect();

    tracing::debug!(
        "running {} of {} registered units",
        selected.len(),
        registry.len()
    );

    let mut aggregator = Aggregator::new(options.timeout, options.verbose, palette);

    for (position, (index, unit)) in selected.into_iter().enumerate() {
        tracing::debug!("unit '{}' started", unit.name());
        let run = supervisor.run(index, unit, options.timeout).await;
        tracing::debug!(
            "unit '{}' finished as {} in {:?}",
            unit.name(),
            run.outcome.status,
            run.duration
        );

        if show_progress {
            print!("{}", progress_glyph(position, run.outcome.status, palette));
            let _ = std::io::stdout().flush();
        }

        aggregator.record(unit.name(), run);
    }

    aggregator.finalize()
}

/// Renders a finished run. Pure: the same summary always renders the same text.
pub fn report(summary: &RunSummary, output_format: OutputFormat, palette: Palette) -> String {
    match output_format {
        OutputFormat::Text => TextFormatter::new(palette).format(summary),
        OutputFormat::Json => JsonFormatter.format(summary),
    }
}
