//! exitlab CLI: simulate exit strategies over trade signals.
//!
//! Commands:
//! - `run`: simulate one strategy over a signals file and persist a row per signal
//! - `sweep`: simulate a grid of exit plans over the same signals, in parallel
//! - `presets`: list the named strategies
//!
//! Exit code 0 on success, 1 on any unrecoverable error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use exitlab_core::config::{CompiledStrategy, StrategyConfig};
use exitlab_core::data::CandleSource;
use exitlab_runner::{
    load_signals, CachedCandleSource, CircuitBreaker, CsvCandleCache, CsvResultSink, Driver,
    ExitPlanGrid, HttpCandleSource, NullSink, PlanSummary, PresetRegistry, ResultSink, Settings,
    Signal, SignalFilter, Sweep, SweepOutput, SweepStatus, SyntheticCandleSource,
};

#[derive(Parser)]
#[command(
    name = "exitlab",
    version,
    about = "exitlab: deterministic exit-strategy simulation over trade signals"
)]
struct Cli {
    /// Debug-level logging (overrides RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one strategy over every signal and persist the results.
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Result CSV (rows are appended).
        #[arg(long, default_value = "results/run.csv")]
        output: PathBuf,

        /// Simulate but do not persist anything.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Simulate a grid of exit plans over the same signals.
    Sweep {
        #[command(flatten)]
        input: InputArgs,

        /// TOML grid of exit settings to try. Without it only the base strategy runs.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Worker threads (defaults to the settings file, then the CPU count).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Sweep output JSON.
        #[arg(long, default_value = "results/sweep.json")]
        output: PathBuf,

        /// Include every individual run in the output, not just per-plan summaries.
        #[arg(long, default_value_t = false)]
        retain_runs: bool,

        /// Rows printed from the ranked table.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// List the named strategy presets.
    Presets,
}

/// Inputs shared by `run` and `sweep`.
#[derive(Args)]
struct InputArgs {
    /// Signals CSV: instrument_id,chain,caller_label,timestamp,price.
    #[arg(long)]
    signals: PathBuf,

    /// Named preset (see `exitlab presets`).
    #[arg(long, conflicts_with = "config")]
    preset: Option<String>,

    /// Strategy document (.json or .toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only simulate these instruments (repeatable).
    #[arg(long = "instrument")]
    instruments: Vec<String>,

    /// First signal date (YYYY-MM-DD, UTC, inclusive).
    #[arg(long)]
    from: Option<String>,

    /// Last signal date (YYYY-MM-DD, UTC, inclusive).
    #[arg(long)]
    to: Option<String>,

    /// Settings file (exitlab.toml).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Never call the remote candle API.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Use seeded synthetic candles instead of real data.
    #[arg(long, default_value_t = false, conflicts_with = "offline")]
    synthetic: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            dry_run,
        } => run_cmd(&input, &output, dry_run),
        Commands::Sweep {
            input,
            grid,
            concurrency,
            output,
            retain_runs,
            top,
        } => sweep_cmd(&input, grid.as_deref(), concurrency, &output, retain_runs, top),
        Commands::Presets => presets_cmd(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ─── Shared setup ───────────────────────────────────────────────────

/// Settings, strategy config, filtered signals and a driver, ready to go.
struct Prepared {
    settings: Settings,
    strategy: StrategyConfig,
    signals: Vec<Signal>,
    driver: Driver,
}

fn prepare(input: &InputArgs) -> Result<Prepared> {
    let settings = Settings::load_or_default(input.settings.as_deref())?;
    let registry = PresetRegistry::builtin();
    let strategy = resolve_strategy(input, &settings, &registry)?;

    let from = parse_date(input.from.as_deref())?;
    let to = parse_date(input.to.as_deref())?;
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            bail!("--from {f} is after --to {t}");
        }
    }

    let all = load_signals(&input.signals)
        .with_context(|| format!("loading signals from {}", input.signals.display()))?;
    let total = all.len();
    let signals = SignalFilter::default()
        .with_instruments(input.instruments.clone())
        .with_dates(from, to)
        .apply(all);
    if signals.is_empty() {
        bail!("no signals match the instrument/date filter ({total} loaded)");
    }
    info!(loaded = total, selected = signals.len(), "signals ready");

    let source = build_source(input, &settings)?;
    let driver = Driver::new(source, settings.driver_options());
    Ok(Prepared {
        settings,
        strategy,
        signals,
        driver,
    })
}

fn resolve_strategy(
    input: &InputArgs,
    settings: &Settings,
    registry: &PresetRegistry,
) -> Result<StrategyConfig> {
    if let Some(path) = &input.config {
        return load_strategy_file(path);
    }
    if let Some(name) = &input.preset {
        return registry.get(name).cloned().with_context(|| {
            format!("valid presets: {}", registry.names().join(", "))
        });
    }
    match settings.strategy_config(registry)? {
        Some(config) => Ok(config),
        None => bail!("one of --config or --preset is required (or set one in the settings file)"),
    }
}

fn load_strategy_file(path: &Path) -> Result<StrategyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading strategy file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let config = if is_toml {
        StrategyConfig::from_toml(&text)
    } else {
        StrategyConfig::from_json(&text)
    };
    config.with_context(|| format!("parsing strategy file {}", path.display()))
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
        })
        .transpose()
}

fn build_source(input: &InputArgs, settings: &Settings) -> Result<Arc<dyn CandleSource>> {
    if input.synthetic {
        warn!("using synthetic candles; results do not reflect real markets");
        return Ok(Arc::new(SyntheticCandleSource::new(
            settings.data.synthetic_seed,
        )));
    }

    let offline = input.offline || settings.data.offline;
    let remote: Option<Box<dyn CandleSource>> = match settings.http_options() {
        Some(options) if !offline => {
            let breaker = Arc::new(CircuitBreaker::default_provider());
            Some(Box::new(HttpCandleSource::new(options, breaker)?))
        }
        _ => None,
    };
    if remote.is_none() && !offline {
        info!("no data.base_url configured; serving candles from the cache only");
    }
    let cache = CsvCandleCache::new(&settings.data.cache_dir);
    Ok(Arc::new(CachedCandleSource::new(cache, remote).offline(offline)))
}

fn compile(strategy: &StrategyConfig) -> Result<CompiledStrategy> {
    strategy.compile().context("invalid strategy")
}

// ─── run ────────────────────────────────────────────────────────────

fn run_cmd(input: &InputArgs, output: &Path, dry_run: bool) -> Result<()> {
    let prepared = prepare(input)?;
    let strategy = compile(&prepared.strategy)?;

    let mut sink: Box<dyn ResultSink> = if dry_run {
        Box::new(NullSink::new())
    } else {
        Box::new(CsvResultSink::append(output)?)
    };
    let report = prepared
        .driver
        .run_all(&prepared.signals, &strategy, sink.as_mut())?;

    println!("Strategy:  {} ({})", strategy.plan().label(), strategy.config_id().short());
    print_summary(&report.summary);
    for (signal, reason) in &report.failures {
        println!("  failed: {} on {}: {reason}", signal.instrument_id, signal.chain);
    }
    if dry_run {
        println!("Dry run: {} rows not persisted", sink.rows_written());
    } else {
        println!("Results appended to {}", output.display());
    }

    if report.summary.failed == report.summary.runs {
        bail!("no signal could be simulated");
    }
    Ok(())
}

fn print_summary(summary: &PlanSummary) {
    println!(
        "Runs: {}  completed: {}  skipped: {}  failed: {}",
        summary.runs,
        summary.completed,
        summary.skipped(),
        summary.failed
    );
    if summary.completed > 0 {
        println!(
            "Mean multiplier: {:.4} (sd {:.4})  win rate: {:.1}%  best: {:.4}  worst: {:.4}",
            summary.mean_multiplier,
            summary.stddev_multiplier,
            summary.win_rate() * 100.0,
            summary.best_multiplier.unwrap_or(f64::NAN),
            summary.worst_multiplier.unwrap_or(f64::NAN),
        );
    }
    for (code, count) in &summary.skips {
        println!("  skipped ({code}): {count}");
    }
}

// ─── sweep ──────────────────────────────────────────────────────────

fn sweep_cmd(
    input: &InputArgs,
    grid_path: Option<&Path>,
    concurrency: Option<usize>,
    output: &Path,
    retain_runs: bool,
    top: usize,
) -> Result<()> {
    let prepared = prepare(input)?;

    let grid = match grid_path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading grid file {}", path.display()))?;
            ExitPlanGrid::from_toml(&text)?
        }
        None => ExitPlanGrid::default(),
    };
    let strategies = grid.variants(&prepared.strategy)?;
    let Some(first) = strategies.first() else {
        bail!("grid produced no strategies");
    };
    info!(grid_size = grid.size(), plans = strategies.len(), "grid expanded");

    // Every variant shares the entry rule, so one fetch per signal serves all plans.
    let (inputs, failures) = prepared.driver.prepare_all(&prepared.signals, first);
    for (signal, reason) in &failures {
        println!("  no candles: {} on {}: {reason}", signal.instrument_id, signal.chain);
    }
    if inputs.is_empty() {
        bail!("no signal has candles to sweep over");
    }

    let mut options = prepared.settings.sweep_options();
    if let Some(n) = concurrency {
        if n == 0 {
            bail!("--concurrency must be at least 1");
        }
        options.concurrency = n;
    }
    options.retain_records = retain_runs;

    let out = Sweep::new(options).run_with_progress(&strategies, &inputs, |done, total| {
        tracing::debug!(done, total, "sweep progress");
    })?;

    write_sweep(&out, output)?;
    print_ranked(&out, top);
    println!("Sweep written to {}", output.display());
    Ok(())
}

fn write_sweep(out: &SweepOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(out)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_ranked(out: &SweepOutput, top: usize) {
    println!(
        "{:<14} {:<40} {:>9} {:>8} {:>6} {:>6}",
        "Config", "Exit plan", "Mean", "Win %", "Done", "Skip"
    );
    println!("{}", "-".repeat(88));
    for record in out.ranked().into_iter().take(top) {
        match &record.status {
            SweepStatus::Done(s) => println!(
                "{:<14} {:<40} {:>9.4} {:>7.1}% {:>6} {:>6}",
                record.config_id.short(),
                record.label,
                s.mean_multiplier,
                s.win_rate() * 100.0,
                s.completed,
                s.skipped()
            ),
            SweepStatus::Pending { completed, total } => println!(
                "{:<14} {:<40} {:>9} {:>8} {:>6} {:>6}",
                record.config_id.short(),
                record.label,
                "pending",
                "",
                format!("{completed}/{total}"),
                ""
            ),
        }
    }
}

// ─── presets ────────────────────────────────────────────────────────

fn presets_cmd() -> Result<()> {
    let registry = PresetRegistry::builtin();
    println!("{:<18} {:<14} Exit plan", "Preset", "Config");
    println!("{}", "-".repeat(70));
    for name in registry.names() {
        let strategy = registry.compile(name)?;
        println!(
            "{:<18} {:<14} {}",
            name,
            strategy.config_id().short(),
            strategy.plan().label()
        );
    }
    Ok(())
}
