use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use deltabench::{Failure, HarnessConfig, PcPolicy, TestBatch, exit};
use refz80::{Asm, load_batch, reference_runner};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_STEPS_ENV: &str = "DELTABENCH_MAX_STEPS";

#[derive(Parser)]
#[command(name = "deltabench")]
#[command(about = "Delta-verified regression tests against the reference Z80 backend")]
#[command(version)]
struct Args {
    /// YAML batch files or glob patterns, run in order
    #[arg(value_name = "BATCH", required = true)]
    batches: Vec<String>,

    /// Harness configuration file
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Maximum engine steps per test case
    #[arg(long, conflicts_with = "unbounded")]
    max_steps: Option<u64>,

    /// Run every case without a step budget
    #[arg(long)]
    unbounded: bool,

    /// How the expected program counter is derived when a case omits it
    #[arg(long, value_enum)]
    pc_policy: Option<PcPolicyArg>,

    /// Print the case labels and exit
    #[arg(long)]
    list: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PcPolicyArg {
    FallThrough,
    Explicit,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> Result<HarnessConfig> {
    let mut config = match &args.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };

    if let Ok(value) = std::env::var(MAX_STEPS_ENV) {
        let budget = value
            .trim()
            .parse()
            .with_context(|| format!("{MAX_STEPS_ENV} must be a step count, got `{value}`"))?;
        config.step_budget = Some(budget);
    }
    if let Some(budget) = args.max_steps {
        config.step_budget = Some(budget);
    }
    if args.unbounded {
        config.step_budget = None;
    }

    match args.pc_policy {
        Some(PcPolicyArg::Explicit) => config.pc_policy = PcPolicy::Explicit,
        Some(PcPolicyArg::FallThrough) if config.pc_policy == PcPolicy::Explicit => {
            config.pc_policy = PcPolicy::default();
        }
        _ => {}
    }
    Ok(config)
}

fn expand(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let before = files.len();
        for entry in glob::glob(pattern).with_context(|| format!("Invalid pattern {pattern}"))? {
            files.push(entry?);
        }
        if files.len() == before {
            bail!("No batch files match {pattern}");
        }
    }
    Ok(files)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;

    let mut batch = TestBatch::<Asm>::new();
    for path in expand(&args.batches)? {
        batch.append(load_batch(&path)?);
    }

    if args.list {
        for label in batch.labels() {
            println!("{label}");
        }
        return Ok(());
    }

    reference_runner(config).run(batch)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // --help and --version come through here as well
            let code = if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<Failure>() {
            Some(failure) => {
                eprintln!("{failure}");
                ExitCode::from(failure.exit_code())
            }
            None => {
                eprintln!("error: {err:#}");
                ExitCode::from(exit::USAGE)
            }
        },
    }
}
