use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use migration_diff_core::{compare, EngineConfig};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "migration-diff")]
#[command(about = "Compare baseline and candidate JSON documents against a migration-annotated schema")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a baseline document against a candidate and report differences
    Compare {
        /// Baseline ("before") JSON document
        baseline: PathBuf,

        /// Candidate ("after") JSON document
        candidate: PathBuf,

        /// OpenAPI-style JSON Schema carrying `x-migration-*` annotations
        #[arg(short, long)]
        schema: PathBuf,

        /// Output report file (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,

        /// Record rule-application traces alongside diffs
        #[arg(long, default_value_t = false)]
        trace: bool,

        /// Stop at the first mismatch instead of enumerating all of them
        #[arg(long, default_value_t = false)]
        fail_fast: bool,

        /// Skip computing schema coverage statistics
        #[arg(long, default_value_t = false)]
        no_statistics: bool,

        /// Maximum recursion depth for `$ref` resolution and diffing
        #[arg(long, default_value_t = 100)]
        max_depth: usize,

        /// Maximum serialized size (megabytes) of either input document
        #[arg(long, default_value_t = 50.0)]
        max_payload_size_mb: f64,

        /// Wall-clock budget for the comparison, in seconds
        #[arg(long, default_value_t = 30)]
        timeout_seconds: u64,

        /// Exit 0 even when the documents don't match
        #[arg(long, default_value_t = false)]
        no_fail_on_mismatch: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Pretty,
    Compact,
}

/// Process exit codes: `0` on a clean match, `1` when the report contains at
/// least one diff, `2` when the engine itself failed (bad input, schema
/// error, budget exceeded).
const EXIT_MISMATCH: i32 = 1;
const EXIT_ENGINE_ERROR: i32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing — logs go to stderr so stdout stays clean for JSON.
    let log_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compare {
            baseline,
            candidate,
            schema,
            output,
            format,
            trace,
            fail_fast,
            no_statistics,
            max_depth,
            max_payload_size_mb,
            timeout_seconds,
            no_fail_on_mismatch,
        } => {
            let baseline_doc = read_json(&baseline)?;
            let candidate_doc = read_json(&candidate)?;
            let schema_doc = read_json(&schema)?;

            let config = EngineConfig {
                max_depth,
                max_payload_size_mb,
                timeout_seconds,
                collect_statistics: !no_statistics,
                trace_rule_application: trace,
                fail_fast,
            };

            match compare(&baseline_doc, &candidate_doc, &schema_doc, &config) {
                Ok(report) => {
                    let is_match = report.is_match;
                    write_json(&report, output.as_ref(), format)?;
                    if !is_match && !no_fail_on_mismatch {
                        std::process::exit(EXIT_MISMATCH);
                    }
                }
                Err(response) => {
                    write_json(&response, output.as_ref(), format)?;
                    std::process::exit(EXIT_ENGINE_ERROR);
                }
            }
        }
    }

    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse JSON from: {}", path.display()))
}

fn write_json<T: serde::Serialize>(
    val: &T,
    path: Option<&PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let mut writer: Box<dyn Write> = if let Some(p) = path {
        let file = File::create(p)
            .with_context(|| format!("Failed to create output file: {}", p.display()))?;
        Box::new(BufWriter::new(file))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };

    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }

    writeln!(writer).context("Failed to write trailing newline")?;
    Ok(())
}
