//! Tallyspan CLI
//!
//! Command-line interface for the Tallyspan telemetry store.
//!
//! # Usage
//!
//! ```bash
//! tallyspan --help
//! tallyspan init
//! tallyspan export metrics.json --timeout-secs 10
//! tallyspan snapshot spans.pb --pretty
//! ```

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shared::otlp::conversions::{metrics_request_to_batches, trace_request_to_spans};
use shared::otlp::proto::collector::metrics::v1::ExportMetricsServiceRequest;
use shared::otlp::proto::collector::trace::v1::ExportTraceServiceRequest;
use shared::otlp::decode_file;
use shared::otlp::encoding::{DeserializeOwned, Message};
use shared::storage::{Database, DatabaseConfig};
use shared::{canonicalize, SqliteMetricExporter};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tallyspan CLI - capture OTLP telemetry into a SQLite store
#[derive(Parser)]
#[command(name = "tallyspan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(short, long, env = "TALLYSPAN_DB_PATH")]
    database: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and metrics schema
    Init,
    /// Export an OTLP metrics request file into the store
    Export {
        /// Request file (`.json` for OTLP/JSON, anything else for protobuf)
        file: PathBuf,
        /// Give up on a batch after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print canonical snapshots of the spans in an OTLP trace request file
    Snapshot {
        /// Request file (`.json` for OTLP/JSON, anything else for protobuf)
        file: PathBuf,
        /// Pretty-print each snapshot
        #[arg(long)]
        pretty: bool,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn database_config(database: Option<PathBuf>) -> Result<DatabaseConfig> {
    let config = DatabaseConfig::from_env().context("Invalid database configuration")?;
    Ok(match database {
        Some(path) => config.with_path(path),
        None => config,
    })
}

async fn open_exporter(config: &DatabaseConfig) -> Result<SqliteMetricExporter> {
    let db = Database::connect(config)
        .await
        .with_context(|| format!("Failed to open database {}", config.path.display()))?;
    let exporter = SqliteMetricExporter::new(db.pool().clone()).await?;
    Ok(exporter)
}

fn read_request<T>(path: &Path) -> Result<T>
where
    T: Message + Default + DeserializeOwned,
{
    decode_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn run_init(config: &DatabaseConfig) -> Result<()> {
    open_exporter(config).await?;
    tracing::info!(path = %config.path.display(), "Database initialized");
    Ok(())
}

async fn run_export(
    config: &DatabaseConfig,
    file: &Path,
    timeout: Option<Duration>,
    out: &mut impl Write,
) -> Result<()> {
    let request: ExportMetricsServiceRequest = read_request(file)?;
    let batches = metrics_request_to_batches(&request);
    let exporter = open_exporter(config).await?;

    let mut records = 0;
    for (index, batch) in batches.iter().enumerate() {
        let rows = match timeout {
            Some(deadline) => exporter.export_with_deadline(batch, deadline).await,
            None => exporter.write_batch(batch).await,
        }
        .with_context(|| format!("Failed to export resource batch #{index}"))?;
        records += rows.records;
    }

    writeln!(
        out,
        "Exported {} batch(es), {} metric record(s) to {}",
        batches.len(),
        records,
        config.path.display()
    )?;
    Ok(())
}

fn run_snapshot(file: &Path, pretty: bool, out: &mut impl Write) -> Result<()> {
    let request: ExportTraceServiceRequest = read_request(file)?;
    for span in trace_request_to_spans(&request) {
        let snapshot = canonicalize(&span);
        if pretty {
            serde_json::to_writer_pretty(&mut *out, &snapshot)?;
        } else {
            serde_json::to_writer(&mut *out, &snapshot)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut stdout = std::io::stdout().lock();
    match cli.command {
        Some(Commands::Init) => run_init(&database_config(cli.database)?).await,
        Some(Commands::Export { file, timeout_secs }) => {
            let config = database_config(cli.database)?;
            run_export(&config, &file, timeout_secs.map(Duration::from_secs), &mut stdout).await
        }
        Some(Commands::Snapshot { file, pretty }) => run_snapshot(&file, pretty, &mut stdout),
        None => {
            writeln!(stdout, "Tallyspan CLI v{}", env!("CARGO_PKG_VERSION"))?;
            writeln!(stdout, "Use --help for usage information")?;
            Ok(())
        }
    }
}
