//! Cinnabar CLI
//!
//! Runs a conformance corpus against an external engine binary and emits
//! the result stream.

use anyhow::Context;
use cinnabar::corpus::{load_corpus, CorpusOptions};
use cinnabar::host::CommandHost;
use cinnabar::includes::IncludeResolver;
use cinnabar::report::OutputFormat;
use cinnabar::runner::{Runner, RunnerConfig};
use cinnabar::VERSION;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cinnabar")]
#[command(author, version, about = "A conformance test execution engine for ECMAScript implementations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a corpus directory against an engine binary
    Run {
        /// Corpus root (e.g. test262/test)
        corpus: PathBuf,

        /// Engine binary to test; receives each assembled source on stdin
        #[arg(short, long)]
        engine: PathBuf,

        /// Extra arguments passed to the engine binary
        #[arg(long = "engine-arg")]
        engine_args: Vec<String>,

        /// Argument selecting module-goal evaluation (e.g. --module)
        #[arg(long)]
        module_arg: Option<String>,

        /// Harness include directory (e.g. test262/harness)
        #[arg(long)]
        harness: Option<PathBuf>,

        /// Worker pool size (defaults to available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Per-test timeout in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,

        /// Global run timeout in seconds; the undispatched remainder is
        /// reported as SKIP
        #[arg(long)]
        run_timeout: Option<u64>,

        /// Only run tests whose id contains this substring
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of tests to load (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_tests: usize,

        /// Feature names the engine does not support (skipped)
        #[arg(long = "skip-feature")]
        skip_features: Vec<String>,

        /// Only run tests declaring one of these features
        #[arg(long = "feature")]
        features: Vec<String>,

        /// Shuffle dispatch order with this seed (report order unchanged)
        #[arg(long)]
        shuffle: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Summary)]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Summary,
    Jsonl,
    Tap,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Summary => OutputFormat::Summary,
            Format::Jsonl => OutputFormat::Jsonl,
            Format::Tap => OutputFormat::Tap,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    tracing::debug!(version = VERSION, "cinnabar starting");

    match cli.command {
        Commands::Run {
            corpus,
            engine,
            engine_args,
            module_arg,
            harness,
            workers,
            timeout,
            run_timeout,
            filter,
            max_tests,
            skip_features,
            features,
            shuffle,
            format,
        } => {
            let options = CorpusOptions { filter, max_tests };
            let tests = load_corpus(&corpus, &options)
                .with_context(|| format!("failed to load corpus from {}", corpus.display()))?;
            if tests.is_empty() {
                anyhow::bail!("no tests found under {}", corpus.display());
            }

            let mut host = CommandHost::new(&engine).with_args(engine_args);
            if let Some(arg) = module_arg {
                host = host.with_module_arg(arg);
            }

            let resolver = match harness {
                Some(dir) => IncludeResolver::new(dir),
                None => IncludeResolver::new(default_harness_dir(&corpus)),
            };

            let mut config = RunnerConfig {
                test_timeout: Duration::from_secs(timeout),
                run_timeout: run_timeout.map(Duration::from_secs),
                unsupported_features: skip_features,
                feature_filter: features,
                shuffle_seed: shuffle,
                ..Default::default()
            };
            if let Some(workers) = workers {
                config.workers = workers;
            }

            let runner = Runner::new(Arc::new(host), Arc::new(resolver), config);
            let results = runner.run(&tests)?;
            print!("{}", results.render(format.into()));

            if !results.totals().is_clean() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// By convention the harness directory sits next to the test directory
/// (`test262/test` → `test262/harness`).
fn default_harness_dir(corpus: &std::path::Path) -> PathBuf {
    corpus
        .parent()
        .map(|p| p.join("harness"))
        .unwrap_or_else(|| PathBuf::from("harness"))
}

fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cinnabar={}", default_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
