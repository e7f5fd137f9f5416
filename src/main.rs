//! PastureFlow CLI
//!
//! Per-zone pasture telemetry aggregation and grazing risk decisions.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pastureflow_intelligence::{
    config::Config,
    core::{build_policy, PolicyKind},
    ingest::{ingest_channel, IngestLoop, Sender},
    sampling::{CsvSampleWriter, SampleDispatcher},
    telemetry::{JsonLinesSource, Simulator, SimulatorConfig, TelemetryRecord},
    ZoneEngine, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pastureflow")]
#[command(version = VERSION)]
#[command(about = "Pasture telemetry aggregation and grazing risk decisions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run ingestion and the HTTP query surface
    Serve {
        /// JSON-lines telemetry to ingest ("-" for stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Port for the query surface (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Policy answering decision queries (overrides config)
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
    },

    /// Ingest a JSON-lines file and print the decision for every zone
    Replay {
        /// JSON-lines telemetry file ("-" for stdin)
        path: PathBuf,

        /// Policy to decide with (overrides config)
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
    },

    /// Emit simulated telemetry as JSON lines on stdout
    Simulate {
        /// Zone layout (JSON); built-in three-zone layout if omitted
        #[arg(long)]
        zones: Option<PathBuf>,

        /// Number of ticks to emit (runs until Ctrl+C if omitted)
        #[arg(long)]
        ticks: Option<u64>,

        /// Delay between ticks in milliseconds (overrides layout)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// RNG seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show configuration
    Config,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve {
            input,
            port,
            policy,
        } => cmd_serve(input, port, policy),
        Commands::Replay { path, policy } => cmd_replay(&path, policy),
        Commands::Simulate {
            zones,
            ticks,
            interval_ms,
            seed,
        } => cmd_simulate(zones, ticks, interval_ms, seed),
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    // Logs go to stderr so `simulate` output stays pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Could not load config, using defaults: {}", e);
        Config::default()
    })
}

/// Build the engine for `config.policy`, with eager sample logging when
/// enabled. A sample log that cannot be opened only disables sampling.
fn build_engine(config: &Config) -> anyhow::Result<ZoneEngine> {
    config.validate().context("checking configuration")?;

    let policy = config.policy;
    let model_path = config.model_path.as_deref();
    let query_policy =
        build_policy(policy, model_path).with_context(|| format!("building {policy} policy"))?;
    let engine = ZoneEngine::new(query_policy);

    if !config.eager_sampling {
        return Ok(engine);
    }

    let labeler = build_policy(config.labeling_policy, model_path)
        .with_context(|| format!("building {} labeling policy", config.labeling_policy))?;

    match CsvSampleWriter::open(&config.sample_log_path) {
        Ok(writer) => {
            let dispatcher = SampleDispatcher::spawn(writer, config.sample_queue_capacity);
            Ok(engine.with_sampling(labeler, dispatcher))
        }
        Err(e) => {
            tracing::warn!("Sample logging disabled: {}", e);
            Ok(engine)
        }
    }
}

fn cmd_serve(
    input: Option<PathBuf>,
    port: Option<u16>,
    policy: Option<PolicyKind>,
) -> anyhow::Result<()> {
    let mut config = load_config();
    if let Some(port) = port {
        config.listen_port = port;
    }
    if let Some(policy) = policy {
        config.policy = policy;
    }
    if let Err(e) = config.ensure_directories() {
        tracing::warn!("Could not create directories: {}", e);
    }

    println!("PastureFlow v{VERSION}");
    println!();

    let engine = Arc::new(build_engine(&config)?);
    println!("Instance ID: {}", engine.instance_id());
    println!("  Decision policy: {}", config.policy);
    if config.eager_sampling {
        println!(
            "  Sample log: {:?} (labels: {})",
            config.sample_log_path, config.labeling_policy
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let (tx, rx) = ingest_channel(config.ingest_queue_capacity);
    let ingest = IngestLoop::spawn(Arc::clone(&engine), rx, config.ingest_poll_interval)
        .context("starting ingestion thread")?;

    let reader = input
        .map(|path| spawn_reader(path, tx.clone(), Arc::clone(&running)))
        .transpose()
        .context("starting input reader")?;

    #[cfg(feature = "server")]
    let server = {
        use pastureflow_intelligence::server::{run, ServerConfig};

        let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
        let (addr, shutdown_tx) = runtime.block_on(run(
            ServerConfig::new(config.listen_port),
            Arc::clone(&engine),
            tx.clone(),
        ))?;
        println!("  Query surface: http://{addr}");
        (runtime, shutdown_tx)
    };
    #[cfg(not(feature = "server"))]
    println!("  Query surface: disabled (server feature not enabled at compile time)");

    drop(tx);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    println!();
    println!("Stopping...");

    #[cfg(feature = "server")]
    {
        let (runtime, shutdown_tx) = server;
        let _ = shutdown_tx.send(());
        runtime.shutdown_timeout(Duration::from_secs(2));
    }

    if let Some(reader) = reader {
        // A reader blocked on stdin cannot be interrupted; leave it behind.
        if reader.is_finished() {
            let _ = reader.join();
        }
    }

    let applied = ingest.stop();
    tracing::info!(applied, "Ingestion stopped");
    finish(&engine);
    Ok(())
}

fn cmd_replay(path: &Path, policy: Option<PolicyKind>) -> anyhow::Result<()> {
    let mut config = load_config();
    if let Some(policy) = policy {
        config.policy = policy;
    }
    let policy = config.policy;
    let engine = Arc::new(build_engine(&config)?);

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let (tx, rx) = ingest_channel(config.ingest_queue_capacity);
    let ingest = IngestLoop::spawn(Arc::clone(&engine), rx, config.ingest_poll_interval)
        .context("starting ingestion thread")?;

    let stats = read_records(path, &tx, &running)?;
    drop(tx);
    ingest.join();

    println!(
        "Replayed {} lines ({} accepted, {} malformed) with {} policy",
        stats.lines, stats.accepted, stats.malformed, policy
    );
    println!();

    for zone_id in engine.zone_ids() {
        match engine.decision(&zone_id) {
            Ok(result) => {
                let code = result
                    .decision
                    .decision_code
                    .map(|c| format!(" {c}"))
                    .unwrap_or_default();
                println!(
                    "{zone_id}: {}{code} | biomass mean {:.3}, trend {:+.3}, pressure {:.2}",
                    result.decision.label,
                    result.features.biomass_mean,
                    result.features.biomass_trend,
                    result.features.pressure_index
                );
            }
            Err(reason) => println!("{zone_id}: {reason}"),
        }
    }

    finish(&engine);
    Ok(())
}

fn cmd_simulate(
    zones: Option<PathBuf>,
    ticks: Option<u64>,
    interval_ms: Option<u64>,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let layout = match zones {
        Some(path) => SimulatorConfig::load(&path)
            .with_context(|| format!("loading zone layout {path:?}"))?,
        None => SimulatorConfig::default(),
    };
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| layout.tick_interval());

    let mut simulator = Simulator::new(&layout, seed);
    tracing::info!(zones = simulator.zone_count(), ?interval, "Simulating telemetry");

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let mut emitted = 0u64;
    while running.load(Ordering::SeqCst) && ticks.map_or(true, |t| emitted < t) {
        for record in simulator.tick(chrono::Utc::now()) {
            println!("{}", serde_json::to_string(&record)?);
        }
        emitted += 1;

        if ticks.map_or(true, |t| emitted < t) {
            thread::sleep(interval);
        }
    }

    tracing::info!(ticks = emitted, "Simulation finished");
    Ok(())
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Pump a JSON-lines file (or stdin for "-") into the ingestion channel.
fn read_records(
    path: &Path,
    tx: &Sender<TelemetryRecord>,
    running: &AtomicBool,
) -> anyhow::Result<pastureflow_intelligence::telemetry::SourceStats> {
    let stats = if path == Path::new("-") {
        JsonLinesSource::stdin().pump(tx, running)?
    } else {
        JsonLinesSource::open(path)?.pump(tx, running)?
    };
    Ok(stats)
}

fn spawn_reader(
    path: PathBuf,
    tx: Sender<TelemetryRecord>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("reader".to_string())
        .spawn(move || {
            if let Err(e) = read_records(&path, &tx, &running) {
                tracing::error!(input = ?path, "Input reader failed: {:#}", e);
            }
        })
}

/// Drain the sample writer and print final statistics.
fn finish(engine: &ZoneEngine) {
    if let Some(stats) = engine.shutdown_sampling() {
        tracing::info!(
            written = stats.written,
            dropped = stats.dropped,
            failed = stats.failed,
            "Sample log closed"
        );
    }
    println!();
    println!("{}", engine.ingest_summary());
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
