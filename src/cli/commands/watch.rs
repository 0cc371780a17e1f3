//! Watch command: run the loop in the foreground with the builtin stages.

use anyhow::Context;

use crate::builtin::{InventoryReducer, LineCountReducer, MirrorMapper};
use crate::cli::args::WatchArgs;
use crate::config::Settings;
use crate::reduce::RayonExecutor;
use crate::stage::CycleReport;
use crate::watcher::{CyclePolicy, DebounceMode, WatchLoop, WatchLoopBuilder};

/// Settings with the command-line overrides applied.
pub fn effective_settings(settings: &Settings, args: &WatchArgs) -> Settings {
    let mut settings = settings.clone();
    if let Some(input) = &args.input {
        settings.watch.input_path = input.clone();
    }
    if let Some(output) = &args.output {
        settings.watch.output_path = output.clone();
    }
    if let Some(threads) = args.threads {
        settings.reduce.threads = threads;
    }
    if args.keyed {
        settings.watch.debounce = DebounceMode::Keyed;
    }
    if args.isolate {
        settings.watch.on_map_error = CyclePolicy::Isolate;
    }
    settings
}

fn report_cycle(report: &CycleReport<'_>) {
    for (reducer, outcome) in report.outcomes() {
        match outcome {
            Ok(()) => crate::log_event!("cycle", "reduced", "#{} {reducer} ok", report.cycle),
            Err(e) => tracing::warn!("[cycle] #{} {reducer}: {e}", report.cycle),
        }
    }
    crate::log_event!(
        "cycle",
        "finished",
        "#{} {} in {:?} ({} failed)",
        report.cycle,
        report.event.name,
        report.elapsed,
        report.failures()
    );
}

/// Assemble the builtin loop from settings.
pub fn build_loop(settings: &Settings) -> anyhow::Result<WatchLoop> {
    let threads = settings.reduce.threads.max(1);
    let executor = RayonExecutor::with_threads(threads)
        .with_context(|| format!("building reduce pool with {threads} threads"))?;
    let reports = &settings.reduce.report_path;

    let watch_loop = WatchLoopBuilder::from_settings(&settings.watch)
        .map_stage(MirrorMapper)
        .reducer(InventoryReducer::new(reports))
        .reducer(LineCountReducer::new(reports))
        .executor(executor)
        .finish_fn(report_cycle)
        .build()?;
    Ok(watch_loop)
}

/// Run watch command - blocks until the loop exits.
pub fn run_watch(settings: &Settings, args: &WatchArgs) -> anyhow::Result<()> {
    let settings = effective_settings(settings, args);
    let watch_loop = build_loop(&settings)?;

    println!(
        "Watching {} (output: {}, reports: {})",
        settings.watch.input_path.display(),
        settings.watch.output_path.display(),
        settings.reduce.report_path.display()
    );

    let summary = watch_loop.run()?;
    println!(
        "Stopped ({:?}): {} cycles, {} failed, {} notifications",
        summary.exit, summary.cycles, summary.failed_cycles, summary.notifications
    );
    Ok(())
}
