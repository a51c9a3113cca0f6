//! `fusion-track` CLI: scenario runs and replay through the track manager.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sim::replay::{load_replay, save_replay, ReplayLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracker_core::metrics::CorrelationMetrics;
use tracker_core::{CorrelationMethod, EventCounts, RecordingObserver, TrackManager, TrackManagerConfig};

#[derive(Parser)]
#[command(name = "fusion-track", about = "Track correlation and management driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        manager: ManagerArgs,
        /// Output summary to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
    },
    /// Load and replay a previously recorded report log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[command(flatten)]
        manager: ManagerArgs,
        /// Output summary to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct ManagerArgs {
    /// Track manager configuration: command text, or JSON with a .json extension
    #[arg(long)]
    config: Option<PathBuf>,
    /// Correlation strategy, overriding the configuration file
    #[arg(long, value_enum)]
    correlation: Option<StrategyArg>,
    /// Seconds without an update before a track is purged
    #[arg(long, default_value_t = 20.0)]
    purge_after: f64,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Perfect,
    Truth,
    NearestNeighbor,
    Cluster,
}

impl StrategyArg {
    fn method(self) -> CorrelationMethod {
        let name = match self {
            StrategyArg::Perfect => "perfect",
            StrategyArg::Truth => "truth",
            StrategyArg::NearestNeighbor => "nearest_neighbor",
            StrategyArg::Cluster => "cluster",
        };
        CorrelationMethod::from_name(name).unwrap_or_default()
    }
}

/// What a run prints and writes.
#[derive(Serialize)]
struct RunSummary {
    scenario: String,
    seed: u64,
    strategy: &'static str,
    frames: usize,
    reports: usize,
    elapsed_s: f64,
    final_local_tracks: usize,
    final_raw_tracks: usize,
    events: EventCounts,
    purity: f64,
    fragmentation: f64,
    rmse_position: f64,
    reassignments: u64,
    metrics: CorrelationMetrics,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            manager,
            output,
            save_replay: save_path,
        } => {
            let scenario = Scenario::build(scenario, seed);
            println!(
                "Running scenario '{}' (seed={}, duration={:.0}s)...",
                scenario.name, seed, scenario.duration
            );
            let log = ReplayLog::record(&scenario);
            if let Some(path) = save_path.as_deref() {
                save_replay(&log, path)?;
                println!("Replay saved to {}", path.display());
            }
            let summary = run_log(&log, &manager)?;
            report(&summary, output.as_deref())?;
        }
        Commands::Replay { input, manager, output } => {
            let log = load_replay(&input)?;
            println!("Replaying '{}' ({} reports)...", log.scenario_name, log.report_count());
            let summary = run_log(&log, &manager)?;
            report(&summary, output.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(args: &ManagerArgs) -> Result<TrackManagerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            if path.extension().is_some_and(|ext| ext == "json") {
                serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
            } else {
                TrackManagerConfig::parse(&text).with_context(|| format!("reading {}", path.display()))?
            }
        }
        None => TrackManagerConfig::default(),
    };
    if let Some(strategy) = args.correlation {
        config.correlation = strategy.method();
    }
    Ok(config)
}

/// Feed every frame of `log` through a fresh track manager.
fn run_log(log: &ReplayLog, args: &ManagerArgs) -> Result<RunSummary> {
    let config = load_config(args)?;
    let mut manager = TrackManager::new(config).context("invalid track manager configuration")?;
    let recorder = RecordingObserver::new();
    manager.add_observer(recorder.clone());
    let mut metrics = CorrelationMetrics::default();

    let start = std::time::Instant::now();
    for frame in &log.frames {
        manager.set_truth_source(frame.truth.clone());
        manager.process_scheduled_events(frame.time);
        for report in &frame.reports {
            manager.add_track_report(frame.time, report.clone());
        }
        let purged = manager.purge_inactive_tracks(frame.time, args.purge_after)
            + manager.purge_inactive_raw_tracks(frame.time, args.purge_after);
        if purged > 0 {
            debug!(t = frame.time, purged, "purged inactive tracks");
        }
        metrics.accumulate(frame.time, manager.raw_tracks(), manager.local_tracks(), &frame.truth);
    }
    let elapsed = start.elapsed();

    let events = recorder.events();
    metrics.count_reassignments(&events);
    info!(strategy = manager.strategy_name(), events = events.len(), "run complete");

    Ok(RunSummary {
        scenario: log.scenario_name.clone(),
        seed: log.seed,
        strategy: manager.strategy_name(),
        frames: log.frames.len(),
        reports: log.report_count(),
        elapsed_s: elapsed.as_secs_f64(),
        final_local_tracks: manager.local_tracks().len(),
        final_raw_tracks: manager.raw_tracks().len(),
        events: EventCounts::from_events(&events),
        purity: metrics.purity(),
        fragmentation: metrics.fragmentation(),
        rmse_position: metrics.rmse_position(),
        reassignments: metrics.reassignments,
        metrics,
    })
}

fn report(summary: &RunSummary, output_path: Option<&Path>) -> Result<()> {
    println!(
        "Done [{}]: {} frames, {} reports, {} local tracks, elapsed={:.2}s",
        summary.strategy, summary.frames, summary.reports, summary.final_local_tracks, summary.elapsed_s,
    );
    println!(
        "Purity {:.3}, fragmentation {:.3}, RMSE {:.1} m, {} reassignments",
        summary.purity, summary.fragmentation, summary.rmse_position, summary.reassignments,
    );

    if let Some(path) = output_path {
        let json = serde_json::to_string_pretty(summary)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Summary saved to {}", path.display());
    }
    Ok(())
}
