//! `humangrid` CLI: scenario runs, replay evaluation, config inspection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fusion_core::{snapshot::SnapshotPublisher, FusionConfig};
use sensor_models::SensorSetup;
use serde::{Deserialize, Serialize};
use sim::{evaluate, load_replay, save_replay, simulate, ReplayLog, RunSummary, Scenario, ScenarioKind};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "humangrid", about = "Human likelihood grid fusion CLI")]
struct Cli {
    /// JSON file with `fusion` and `sensors` sections (defaults otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario, fuse it and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
        /// Write every cycle's published messages as JSON lines
        #[arg(long)]
        snapshots: Option<PathBuf>,
    },
    /// Fuse a previously recorded replay log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Write every cycle's published messages as JSON lines
        #[arg(long)]
        snapshots: Option<PathBuf>,
    },
    /// Print the effective configuration as JSON.
    PrintConfig,
}

/// Everything the node reads at startup.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct NodeConfig {
    fusion: FusionConfig,
    sensors: SensorSetup,
}

fn load_config(path: Option<&Path>) -> Result<NodeConfig> {
    let config = match path {
        Some(p) => {
            let text = std::fs::read_to_string(p)
                .with_context(|| format!("reading config {}", p.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", p.display()))?
        }
        None => NodeConfig::default(),
    };
    config.fusion.validate()?;
    tracing::debug!(
        source = ?path,
        modalities = config.fusion.enabled_modalities().count(),
        "configuration loaded"
    );
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            output,
            save_replay: save_path,
            snapshots,
        } => {
            run_scenario(
                &config,
                scenario,
                seed,
                output.as_deref(),
                save_path.as_deref(),
                snapshots.as_deref(),
            )?;
        }
        Commands::Replay {
            input,
            output,
            snapshots,
        } => {
            run_replay(&config, &input, output.as_deref(), snapshots.as_deref())?;
        }
        Commands::PrintConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn run_scenario(
    config: &NodeConfig,
    kind: ScenarioKind,
    seed: u64,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed).with_loop_period(config.fusion.loop_period());
    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s)...",
        scenario.name, seed, scenario.duration
    );

    let log = simulate(&scenario, &config.sensors)?;

    // Save replay if requested
    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    fuse_and_report(config, &log, output_path, snapshot_path)
}

fn run_replay(
    config: &NodeConfig,
    input: &Path,
    output_path: Option<&Path>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let log = load_replay(input)?;
    println!(
        "Replaying '{}' ({} frames)...",
        log.scenario_name,
        log.frames.len()
    );
    fuse_and_report(config, &log, output_path, snapshot_path)
}

fn fuse_and_report(
    config: &NodeConfig,
    log: &ReplayLog,
    output_path: Option<&Path>,
    snapshot_path: Option<&Path>,
) -> Result<()> {
    let start = std::time::Instant::now();

    let summary = match snapshot_path {
        Some(spath) => {
            let mut writer = BufWriter::new(std::fs::File::create(spath)?);
            let mut publisher = SnapshotPublisher::new();
            let mut write_err = None;
            let summary = evaluate(log, &config.fusion, &config.sensors, |output| {
                if write_err.is_some() {
                    return;
                }
                let msgs = publisher.publish(output);
                let line = serde_json::to_string(&msgs)
                    .map_err(anyhow::Error::from)
                    .and_then(|s| writeln!(writer, "{s}").map_err(anyhow::Error::from));
                if let Err(e) = line {
                    write_err = Some(e);
                }
            })?;
            if let Some(e) = write_err {
                return Err(e.context(format!("writing snapshots to {}", spath.display())));
            }
            writer.flush()?;
            println!("Snapshots saved to {}", spath.display());
            summary
        }
        None => evaluate(log, &config.fusion, &config.sensors, |_| {})?,
    };

    let elapsed = start.elapsed();
    print_summary(&summary, elapsed.as_secs_f64());

    // Output metrics
    if let Some(opath) = output_path {
        let m = &summary.metrics;
        let highest_hit_rate = if summary.ticks > 0 {
            m.highest_hits as f64 / summary.ticks as f64
        } else {
            0.0
        };
        let json = serde_json::json!({
            "scenario": log.scenario_name,
            "seed": log.seed,
            "elapsed_s": elapsed.as_secs_f64(),
            "ticks": summary.ticks,
            "precision": m.precision(),
            "recall": m.recall(),
            "rmse_position": m.rmse_position(),
            "highest_hit_rate": highest_hit_rate,
            "mean_cycle_us": summary.mean_cycle_us,
            "max_cycle_us": summary.max_cycle_us,
            "faults": summary.faults,
        });
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, elapsed_s: f64) {
    let m = &summary.metrics;
    println!(
        "Done: {} ticks, mean cycle {:.0}us (max {}us), elapsed={:.2}s",
        summary.ticks, summary.mean_cycle_us, summary.max_cycle_us, elapsed_s,
    );
    println!(
        "Candidates: precision={:.3} recall={:.3} rmse={:.3}m, highest point on a human in {}/{} ticks",
        m.precision(),
        m.recall(),
        m.rmse_position(),
        m.highest_hits,
        summary.ticks,
    );
    if summary.faults.total() > 0 {
        println!("Faults: {:?}", summary.faults);
    }
}
