use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use traffic_replay::ReplayConfig;
use traffic_replay::core::flow::{HttpTransport, ReqwestTransport, SessionFlow};
use traffic_replay::core::logs::{
    EndpointProfile, EventExtractor, ExtractionStats, LossyLines, MergeOptions, PrepareOptions,
    TrafficEvent, distill_line, extract_reader, merge_streams, normalize_for_replay, read_events, write_events,
};
use traffic_replay::core::replay::TrafficReplayer;
use traffic_replay::core::wave::{FlowLauncher, WaveScheduler};

/// Traffic Replay - production log mining and load generation
#[derive(Parser, Debug)]
#[command(name = "traffic-replay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mine COMPLETED lines into a replayable JSONL event stream
    Extract {
        /// Raw log files; several files are merged into one stream
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Endpoint profile (traffic or pplmag)
        #[arg(short = 'p', long = "profile")]
        profile: Option<EndpointProfile>,

        /// Year assumed for log timestamps
        #[arg(short = 'y', long = "year")]
        year: Option<i32>,

        /// Output file (stdout if not specified)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,

        /// Print extraction statistics
        #[arg(long = "stats")]
        stats: bool,
    },

    /// Turn every structured log line into a JSON record
    Distill {
        input: PathBuf,

        #[arg(short = 'y', long = "year")]
        year: Option<i32>,

        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Merge finalized event streams into one
    Merge {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Recompute last-request markers over the merged stream
        #[arg(long = "remark")]
        remark: bool,

        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Normalize a stream for the play-only replayer
    Prepare {
        input: PathBuf,

        /// Series used where an event has none
        #[arg(long = "series")]
        series: Option<String>,

        /// Puzzle id used where an event has none
        #[arg(long = "puzzle-id")]
        puzzle_id: Option<String>,

        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Run fixed-rate waves of full sessions
    Waves {
        /// Sessions per wave
        #[arg(long = "rps")]
        rps: Option<usize>,

        /// Number of waves
        #[arg(short = 'd', long = "duration")]
        duration: Option<usize>,

        #[arg(long = "seed")]
        seed: Option<u64>,

        /// Write the full result as JSON
        #[arg(long = "json")]
        json: Option<PathBuf>,
    },

    /// Replay an event stream with its original timing
    Replay {
        input: PathBuf,

        /// Speed multiplier (2.0 replays twice as fast)
        #[arg(short = 's', long = "speed")]
        speed: Option<f64>,

        /// Schedule events without sending requests
        #[arg(long = "dry-run")]
        dry_run: bool,

        /// Write per-event results as JSONL
        #[arg(long = "results")]
        results: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ReplayConfig::from_file(path)
        }
        None => ReplayConfig::from_env(),
    }
    .map_err(|e| anyhow!("Invalid configuration: {e}"))?;

    match cli.command {
        Commands::Extract {
            inputs,
            profile,
            year,
            output,
            stats,
        } => {
            let extractor = EventExtractor::new(
                profile.unwrap_or(config.profile),
                year.unwrap_or(config.reference_year),
            );

            let mut streams = Vec::with_capacity(inputs.len());
            for input in &inputs {
                info!(input = %input.display(), "Extracting events");
                let extracted = extract_reader(&extractor, open(input)?)
                    .with_context(|| format!("Failed to read {}", input.display()))?;
                if stats {
                    eprintln!("{}", render_stats(input, &extracted.stats));
                }
                streams.push(extracted.events);
            }

            let events = if streams.len() == 1 {
                streams.pop().unwrap_or_default()
            } else {
                merge_streams(streams, MergeOptions::default())
            };
            write_stream(output.as_deref(), &events)?;
            info!(events = events.len(), "Extraction complete");
        }

        Commands::Distill {
            input,
            year,
            output,
        } => {
            let year = year.unwrap_or(config.reference_year);
            let mut writer = create(output.as_deref())?;
            let mut records = 0usize;
            for line in LossyLines::new(open(&input)?) {
                let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
                if let Some(record) = distill_line(&line, year) {
                    serde_json::to_writer(&mut writer, &record)?;
                    writer.write_all(b"\n")?;
                    records += 1;
                }
            }
            writer.flush()?;
            info!(records, "Distillation complete");
        }

        Commands::Merge {
            inputs,
            remark,
            output,
        } => {
            let mut streams = Vec::with_capacity(inputs.len());
            for input in &inputs {
                streams.push(load_stream(input)?);
            }
            let merged = merge_streams(
                streams,
                MergeOptions {
                    remark_last_requests: remark,
                },
            );
            write_stream(output.as_deref(), &merged)?;
            info!(sources = inputs.len(), events = merged.len(), "Merge complete");
        }

        Commands::Prepare {
            input,
            series,
            puzzle_id,
            output,
        } => {
            let mut options = PrepareOptions::default();
            if let Some(series) = series {
                options.default_series = series;
            }
            if let Some(puzzle_id) = puzzle_id {
                options.default_puzzle_id = puzzle_id;
            }

            let (events, report) = normalize_for_replay(load_stream(&input)?, &options);
            write_stream(output.as_deref(), &events)?;
            info!(
                total = report.total,
                kept = report.kept,
                dropped = report.dropped(),
                method_rewrites = report.method_rewrites,
                "Prepare complete"
            );
        }

        Commands::Waves {
            rps,
            duration,
            seed,
            json,
        } => {
            if let Some(rps) = rps {
                config.rps = rps;
            }
            if let Some(duration) = duration {
                config.duration = duration;
            }
            config.seed = seed.or(config.seed);
            config
                .validate()
                .map_err(|e| anyhow!("Invalid configuration: {e}"))?;

            let transport = build_transport(&config)?;
            let flow = SessionFlow::new(transport, Arc::new(config.to_flow_config()));
            let launcher = Arc::new(FlowLauncher::new(flow, config.uid_source(), config.seed));

            let run = WaveScheduler::new(config.rps, config.duration)
                .run(launcher)
                .await;
            println!("{}", run.render_summary());

            if let Some(path) = json {
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                serde_json::to_writer_pretty(BufWriter::new(file), &run.to_json())?;
                info!(path = %path.display(), "Run result written");
            }
        }

        Commands::Replay {
            input,
            speed,
            dry_run,
            results,
        } => {
            if let Some(speed) = speed {
                config.speed = speed;
            }
            config
                .validate()
                .map_err(|e| anyhow!("Invalid configuration: {e}"))?;

            let events = load_stream(&input)?;
            let transport = build_transport(&config)?;
            let replayer = TrafficReplayer::new(
                transport,
                Arc::new(config.to_flow_config()),
                config.to_replay_options(dry_run),
            );
            let report = replayer.replay(&events).await;
            println!("{}", report.summary.render());

            if let Some(path) = results {
                let mut writer = create(Some(&path))?;
                for result in &report.results {
                    serde_json::to_writer(&mut writer, result)?;
                    writer.write_all(b"\n")?;
                }
                writer.flush()?;
                info!(path = %path.display(), "Replay results written");
            }
        }
    }

    Ok(())
}

fn build_transport(config: &ReplayConfig) -> anyhow::Result<Arc<dyn HttpTransport>> {
    let transport = ReqwestTransport::new(&config.to_transport_options())
        .map_err(|e| anyhow!("Failed to build HTTP client: {e}"))?;
    Ok(Arc::new(transport))
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn create(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

fn load_stream(path: &Path) -> anyhow::Result<Vec<TrafficEvent>> {
    let stream =
        read_events(open(path)?).with_context(|| format!("Failed to read {}", path.display()))?;
    if stream.malformed > 0 {
        warn!(
            path = %path.display(),
            malformed = stream.malformed,
            "Skipped malformed event lines"
        );
    }
    Ok(stream.events)
}

fn write_stream(path: Option<&Path>, events: &[TrafficEvent]) -> anyhow::Result<()> {
    let mut writer = create(path)?;
    write_events(&mut writer, events)?;
    writer.flush()?;
    Ok(())
}

fn render_stats(input: &Path, stats: &ExtractionStats) -> String {
    let mut out = format!(
        "{}: {} lines, {} events, {} skipped, {} malformed, {} unique users",
        input.display(),
        stats.lines_read,
        stats.events,
        stats.skipped_total(),
        stats.malformed,
        stats.unique_users()
    );
    for (reason, count) in &stats.skipped {
        out.push_str(&format!("\n  skipped {:<20} {count}", reason.as_str()));
    }
    for (endpoint, count) in &stats.endpoints {
        out.push_str(&format!("\n  {endpoint:<28} {count}"));
    }
    for (method, count) in &stats.methods {
        out.push_str(&format!("\n  method {method:<8} {count}"));
    }
    out
}
