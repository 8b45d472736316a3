//! # Gatemon
//!
//! Host-level telemetry and fault-injection harness for edge gateways.
//!
//! Subcommands:
//! - `monitor`: sample OS indicators into a CSV log.
//! - `run`: monitor while a randomized injection campaign perturbs the
//!   host from a separate process.
//! - `campaign`: the campaign child process entry point (spawned by
//!   `run`, usable standalone).
//! - `merge`: join a monitor file with an injection log into a labeled
//!   dataset.
//! - `stress`: hidden worker entry point re-executed by the process-pool
//!   injectors.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gatemon_core::campaign::CampaignConfig;
use gatemon_core::inject::worker;
use gatemon_core::merge::MergeOptions;
use gatemon_core::monitor::{DeadlinePolicy, MonitorLoop};
use gatemon_core::{
    CsvSink, HarnessConfig, InjectionManager, ProbeRegistry, merge_files,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gatemon")]
#[command(about = "Telemetry and fault-injection harness for edge gateways")]
struct Cli {
    /// 0 suppresses all but warnings, 1 displays base info, 2 shows
    /// per-tick details
    #[arg(short, long, global = true, default_value_t = 1)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample OS indicators into a CSV log
    Monitor(MonitorArgs),
    /// Monitor while driving a randomized injection campaign
    Run(RunArgs),
    /// Campaign child process: run the injection loop and write its log
    Campaign(CampaignArgs),
    /// Label a monitor file with the injections that overlap it
    Merge(MergeArgs),
    /// Stress worker entry point used by the process-pool injectors
    #[command(hide = true)]
    Stress(StressArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Location of the monitor output file
    #[arg(short, long, default_value = "gatemon_monitor.csv")]
    outfile: PathBuf,

    /// Interval in ms between two observations
    #[arg(short, long)]
    interval: Option<i64>,

    /// Number of observations before stopping
    #[arg(short, long)]
    nobs: Option<u64>,

    /// Observations kept in memory before saving to file
    #[arg(short, long)]
    wobs: Option<usize>,

    /// Stop on the first missed sampling deadline instead of continuing
    #[arg(long)]
    strict: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEMON_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Location of the monitor output file
    #[arg(short, long, default_value = "gatemon_monitor.csv")]
    outfile: PathBuf,

    /// Location of the injection log written by the campaign
    #[arg(short = 'j', long, default_value = "gatemon_injections.csv")]
    injfile: PathBuf,

    /// Interval in ms between two observations
    #[arg(short, long)]
    interval: Option<i64>,

    /// Number of observations before stopping
    #[arg(short, long)]
    nobs: Option<u64>,

    /// Observations kept in memory before saving to file
    #[arg(short, long)]
    wobs: Option<usize>,

    /// Duration in ms of one injection
    #[arg(long)]
    injdur: Option<i64>,

    /// Error rate of injections into the system, within [0, 1]
    #[arg(long)]
    injrate: Option<f64>,

    /// Cooldown in ms after a completed injection
    #[arg(long)]
    cooldown: Option<i64>,

    /// Declarative injector spec (JSON file); defaults to the built-in set
    #[arg(short, long)]
    spec: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEMON_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CampaignArgs {
    #[arg(long)]
    tick_ms: i64,

    #[arg(long)]
    total_ticks: u64,

    #[arg(long)]
    duration_ms: i64,

    #[arg(long)]
    error_rate: f64,

    #[arg(long)]
    cooldown_ms: i64,

    #[arg(long, default_value = "redis://127.0.0.1/")]
    redis_url: String,

    /// Where to write the injection log
    #[arg(long)]
    out: PathBuf,

    #[arg(long)]
    spec: Option<PathBuf>,

    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Location of the monitor file
    #[arg(short, long)]
    monfile: PathBuf,

    /// Location of the injection file
    #[arg(short, long)]
    injfile: PathBuf,

    /// Location of the labeled output file
    #[arg(short, long, default_value = "monitor_labeled.csv")]
    outfile: PathBuf,

    /// Name of the timestamp column in the monitor file
    #[arg(short, long, default_value = "timestamp")]
    timetag: String,
}

#[derive(Args, Debug)]
struct StressArgs {
    #[command(subcommand)]
    kind: StressCommand,
}

#[derive(Subcommand, Debug)]
enum StressCommand {
    /// Unbounded arithmetic loop
    CpuBurn,
    /// Write/readback/delete churn inside a scratch directory
    Disk {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long)]
        blocks: usize,
    },
    /// One group of threads acquiring two locks in opposite orders
    Deadlock {
        #[arg(long)]
        threads: usize,
    },
    /// Cycle of GET requests over a URL list
    Http {
        #[arg(long = "url")]
        urls: Vec<String>,
    },
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Monitor(args) => run_monitor(args).await,
        Command::Run(args) => run_coupled(args).await,
        Command::Campaign(args) => run_campaign_child(args).await,
        Command::Merge(args) => run_merge(args),
        Command::Stress(args) => run_stress(args).await,
    }
}

async fn discover_probes(config: &HarnessConfig) -> ProbeRegistry {
    let registry = ProbeRegistry::discover(config).await;
    if registry.is_empty() {
        warn!("no probes are available on this host; only timestamps will be logged");
    } else {
        info!("available probes for this machine:");
        for line in registry.descriptions() {
            info!("    {line}");
        }
    }
    registry
}

async fn run_monitor(args: MonitorArgs) -> anyhow::Result<()> {
    let mut config = HarnessConfig::load(args.config.as_deref())
        .context("loading harness configuration")?;
    if let Some(interval) = args.interval {
        config.tick_ms = interval;
    }
    if let Some(nobs) = args.nobs {
        config.total_ticks = nobs;
    }
    if let Some(wobs) = args.wobs {
        config.batch_size = wobs;
    }
    config.validate().context("validating configuration")?;

    info!(
        "monitor reads every {} ms for {} times, saving to '{}' every {} observations",
        config.tick_ms,
        config.total_ticks,
        args.outfile.display(),
        config.batch_size
    );
    let registry = discover_probes(&config).await;
    let mut sink = CsvSink::new(&args.outfile);
    let policy = if args.strict {
        DeadlinePolicy::Strict
    } else {
        DeadlinePolicy::Lenient
    };
    let summary = MonitorLoop::new(config.tick_ms, config.total_ticks, config.batch_size, policy)
        .run(&registry, &mut sink)
        .await
        .context("running the monitor loop")?;
    info!(
        "monitor finished: {} rows, {} deadline misses",
        summary.rows, summary.deadline_misses
    );
    Ok(())
}

async fn run_coupled(args: RunArgs) -> anyhow::Result<()> {
    let mut config = HarnessConfig::load(args.config.as_deref())
        .context("loading harness configuration")?;
    if let Some(interval) = args.interval {
        config.tick_ms = interval;
    }
    if let Some(nobs) = args.nobs {
        config.total_ticks = nobs;
    }
    if let Some(wobs) = args.wobs {
        config.batch_size = wobs;
    }
    if let Some(injdur) = args.injdur {
        config.duration_ms = injdur;
    }
    if let Some(injrate) = args.injrate {
        config.error_rate = injrate;
    }
    if let Some(cooldown) = args.cooldown {
        config.cooldown_ms = cooldown;
    }
    if let Some(spec) = &args.spec {
        config.injector_spec = Some(spec.clone());
    }
    config.validate().context("validating configuration")?;

    info!(
        "harness reads every {} ms for {} times; injections last {} ms at rate {}",
        config.tick_ms, config.total_ticks, config.duration_ms, config.error_rate
    );
    let registry = discover_probes(&config).await;

    let mut manager =
        InjectionManager::from_config(&config).context("loading injectors")?;
    if manager.has_injectors() {
        info!("injectors loaded for this campaign:");
        for name in manager.injector_names() {
            info!("    {name}");
        }
    } else {
        warn!("no injectors were loaded; the campaign will stay idle");
    }
    manager
        .start(&config, &args.injfile)
        .context("starting the injection campaign")?;

    let mut sink = CsvSink::new(&args.outfile);
    let summary = MonitorLoop::new(
        config.tick_ms,
        config.total_ticks,
        config.batch_size,
        DeadlinePolicy::Strict,
    )
    .run(&registry, &mut sink)
    .await
    .context("running the monitor loop")?;
    info!(
        "monitor finished: {} rows, {} deadline misses",
        summary.rows, summary.deadline_misses
    );

    let records = manager
        .collect(&args.injfile)
        .await
        .context("collecting campaign injections")?;
    info!(
        "campaign finished with {} injections, logged to '{}'",
        records.len(),
        args.injfile.display()
    );
    Ok(())
}

async fn run_campaign_child(args: CampaignArgs) -> anyhow::Result<()> {
    let config = HarnessConfig {
        tick_ms: args.tick_ms,
        total_ticks: args.total_ticks,
        duration_ms: args.duration_ms,
        error_rate: args.error_rate,
        cooldown_ms: args.cooldown_ms,
        redis_url: args.redis_url,
        injector_spec: args.spec,
        scratch_dir: args.scratch_dir,
        ..HarnessConfig::default()
    };
    config.validate().context("validating campaign configuration")?;
    let manager =
        InjectionManager::from_config(&config).context("loading injectors")?;
    manager
        .run_campaign(&CampaignConfig::from(&config), &args.out)
        .await
        .context("running the injection campaign")?;
    Ok(())
}

fn run_merge(args: MergeArgs) -> anyhow::Result<()> {
    info!("merging monitored data with injections into a labeled file");
    let options = MergeOptions {
        timestamp_tag: args.timetag,
    };
    let summary = merge_files(&args.monfile, &args.injfile, &args.outfile, &options)
        .context("merging monitor data with injections")?;
    info!(
        "wrote {} labeled rows to '{}' using {} injections",
        summary.rows,
        args.outfile.display(),
        summary.injections
    );
    Ok(())
}

async fn run_stress(args: StressArgs) -> anyhow::Result<()> {
    match args.kind {
        StressCommand::CpuBurn => worker::cpu_burn(),
        StressCommand::Disk { dir, blocks } => worker::disk_churn(&dir, blocks),
        StressCommand::Deadlock { threads } => worker::deadlock_group(threads),
        StressCommand::Http { urls } => worker::http_read(urls).await,
    }
    Ok(())
}
