//! cglog CLI
//!
//! Thin wrapper around cglog-core for command-line usage: configures the
//! process-wide engine from flags (or a JSON file) and emits records.
//!
//! ## Usage
//!
//! ```bash
//! # One ERROR record into /tmp/logs (echoed to stderr)
//! cglog --log-dir /tmp/logs emit --severity error disk full
//!
//! # V-gated record, shown only when -v/--vmodule allow level 2
//! cglog --log-dir /tmp/logs --vmodule 'main=2' emit --level 2 noisy detail
//!
//! # Fatal record: dumps stacks and exits with status 255
//! cglog --log-dir /tmp/logs emit --severity fatal giving up
//!
//! # 8 threads x 1000 records with 1 MB rotation
//! cglog --log-dir /tmp/logs --max-size 1000000 stress --threads 8 --records 1000
//!
//! # Options from JSON, flags override
//! cglog --config logging.json emit hello
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use cglog_core::{CglogLayer, Operand, Options, Severity};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// cglog - leveled logging from the command line
#[derive(Parser)]
#[command(name = "cglog")]
#[command(version)]
#[command(about = "Emit records through the cglog leveled logging engine")]
struct Cli {
    /// JSON file holding logging options; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for log files (default: the platform temp directory)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log to stderr instead of files
    #[arg(long, global = true, visible_alias = "logtostderr")]
    to_console: bool,

    /// Log to stderr as well as files
    #[arg(long, global = true, visible_alias = "alsologtostderr")]
    also_to_console: bool,

    /// Global V level
    #[arg(short = 'v', long, global = true)]
    verbosity: Option<u32>,

    /// Lowest severity echoed to stderr (info, warning, error, fatal)
    #[arg(long, global = true)]
    stderr_threshold: Option<String>,

    /// Per-file V levels, e.g. "gossip*=3,net/*=1"
    #[arg(long, global = true)]
    vmodule: Option<String>,

    /// Attach a stack trace to records logged at file:line
    #[arg(long, global = true)]
    trace_location: Option<String>,

    /// Rotate files after this many bytes
    #[arg(long, global = true)]
    max_size: Option<u64>,

    /// Seconds between background flushes
    #[arg(long, global = true)]
    flush_interval: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit one record
    Emit {
        /// Severity of the record
        #[arg(short, long, default_value = "info")]
        severity: Severity,

        /// Formatting mode
        #[arg(short, long, value_enum, default_value_t = Mode::Print)]
        mode: Mode,

        /// Gate the record behind V(level); INFO only
        #[arg(short, long)]
        level: Option<u32>,

        /// How many times to emit it
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Message operands; integers count as numbers for print spacing
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Log from many threads at once and report what was written
    Stress {
        /// Writer threads
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Records per thread
        #[arg(short, long, default_value_t = 1000)]
        records: usize,

        /// Severity of every record
        #[arg(short, long, default_value = "info")]
        severity: Severity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Operands joined print-style
    Print,
    /// Operands separated by spaces
    Println,
    /// Operands joined with spaces into one preformatted message
    Printf,
}

/// One message operand as typed on the command line.
enum Word {
    Number(i64),
    Text(String),
}

impl Word {
    fn parse(raw: &str) -> Self {
        raw.parse()
            .map(Word::Number)
            .unwrap_or_else(|_| Word::Text(raw.to_string()))
    }

    fn as_operand(&self) -> &dyn Operand {
        match self {
            Word::Number(n) => n,
            Word::Text(s) => s,
        }
    }
}

fn load_options(path: &Path) -> Result<Options> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

fn build_options(cli: &Cli) -> Result<Options> {
    let mut options = match &cli.config {
        Some(path) => load_options(path)?,
        None => Options::default(),
    };

    options.to_console |= cli.to_console;
    options.also_to_console |= cli.also_to_console;
    if let Some(verbosity) = cli.verbosity {
        options.verbosity = verbosity;
    }
    if let Some(threshold) = &cli.stderr_threshold {
        options.stderr_threshold = Some(threshold.clone());
    }
    if let Some(vmodule) = &cli.vmodule {
        options.vmodule = vmodule.clone();
    }
    if let Some(location) = &cli.trace_location {
        options.trace_location = Some(location.clone());
    }
    if let Some(dir) = &cli.log_dir {
        options.log_dir = Some(dir.clone());
    }
    if let Some(max_size) = cli.max_size {
        options.max_size = max_size;
    }
    if let Some(secs) = cli.flush_interval {
        options.flush_interval_secs = secs;
    }
    Ok(options)
}

/// Route this binary's own `tracing` events into the engine's files.
fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(CglogLayer::for_default().with_filter(filter))
        .init();
}

fn emit(severity: Severity, mode: Mode, level: Option<u32>, words: &[Word]) {
    let text: Vec<&dyn Operand> = words.iter().map(Word::as_operand).collect();
    let text = text.as_slice();
    let joined = words
        .iter()
        .map(|w| w.as_operand().to_string())
        .collect::<Vec<_>>()
        .join(" ");

    if let Some(level) = level {
        let verbose = cglog_core::v(level);
        match mode {
            Mode::Print => verbose.info(text),
            Mode::Println => verbose.infoln(text),
            Mode::Printf => verbose.infof(format_args!("{joined}")),
        }
        return;
    }

    match (severity, mode) {
        (Severity::Info, Mode::Print) => cglog_core::info(text),
        (Severity::Info, Mode::Println) => cglog_core::infoln(text),
        (Severity::Info, Mode::Printf) => cglog_core::infof(format_args!("{joined}")),
        (Severity::Warning, Mode::Print) => cglog_core::warning(text),
        (Severity::Warning, Mode::Println) => cglog_core::warningln(text),
        (Severity::Warning, Mode::Printf) => cglog_core::warningf(format_args!("{joined}")),
        (Severity::Error, Mode::Print) => cglog_core::error(text),
        (Severity::Error, Mode::Println) => cglog_core::errorln(text),
        (Severity::Error, Mode::Printf) => cglog_core::errorf(format_args!("{joined}")),
        (Severity::Fatal, Mode::Print) => cglog_core::fatal(text),
        (Severity::Fatal, Mode::Println) => cglog_core::fatalln(text),
        (Severity::Fatal, Mode::Printf) => cglog_core::fatalf(format_args!("{joined}")),
    }
}

fn stress(threads: usize, records: usize, severity: Severity) -> Result<()> {
    let start = Instant::now();
    let handles = (0..threads)
        .map(|t| {
            thread::Builder::new()
                .name(format!("stress-{t}"))
                .spawn(move || {
                    let logger = cglog_core::default_logger();
                    for seq in 0..records {
                        match severity {
                            Severity::Info => logger.infof(format_args!("worker {t} seq {seq}")),
                            Severity::Warning => logger.warningf(format_args!("worker {t} seq {seq}")),
                            _ => logger.errorf(format_args!("worker {t} seq {seq}")),
                        }
                    }
                })
                .context("cannot spawn writer thread")
        })
        .collect::<Result<Vec<_>>>()?;
    for handle in handles {
        if handle.join().is_err() {
            anyhow::bail!("writer thread panicked");
        }
    }
    cglog_core::flush();

    let elapsed = start.elapsed();
    println!("Wrote {} records in {:.2?}", threads * records, elapsed);
    for severity in Severity::ALL {
        let stats = cglog_core::stats(severity);
        println!("  {:<8} lines={} bytes={}", severity.name(), stats.lines, stats.bytes);
    }
    if let Some(path) = cglog_core::default_logger().current_file(Severity::Info) {
        println!("INFO log: {}", path.display());
    }
    tracing::info!(threads, records, elapsed_ms = elapsed.as_millis() as u64, "stress run complete");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = build_options(&cli)?;
    cglog_core::init(options).context("failed to initialize logging")?;
    setup_logging();

    match cli.command {
        Commands::Emit {
            severity,
            mode,
            level,
            count,
            message,
        } => {
            let words: Vec<Word> = message.iter().map(|m| Word::parse(m)).collect();
            for _ in 0..count {
                emit(severity, mode, level, &words);
            }
        }

        Commands::Stress {
            threads,
            records,
            severity,
        } => {
            if severity == Severity::Fatal {
                anyhow::bail!("stress does not accept the fatal severity");
            }
            stress(threads, records, severity)?;
        }
    }

    cglog_core::shutdown();
    Ok(())
}
