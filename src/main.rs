//! dlqtail CLI: Tail a dead letter queue directory and print entries as
//! NDJSON on stdout.

use std::net::SocketAddr;
use std::process::ExitCode;

use async_trait::async_trait;
use clap::{ArgAction, Parser};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::info;

use dlqtail::entry::DlqEntry;
use dlqtail::error::ConsumerRejected;
use dlqtail::{init_tracing, shutdown_signal, DlqTailer, EntryConsumer, TailerConfig};

/// Dead letter queue tailer.
#[derive(Parser, Debug)]
#[command(name = "dlqtail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the dead letter queue segments.
    #[arg(short, long)]
    path: PathBuf,

    /// Cursor file location. Defaults to a path derived from the queue
    /// path under the data directory.
    #[arg(long)]
    sincedb_path: Option<PathBuf>,

    /// Data root for derived cursor files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Persist the cursor after every delivered entry.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    commit_offsets: bool,

    /// Skip entries older than this RFC 3339 timestamp on the first pass.
    #[arg(long)]
    start_timestamp: Option<String>,

    /// Delete sealed segments once fully delivered.
    #[arg(long)]
    clean_consumed: bool,

    /// Expose Prometheus metrics on this address (e.g. 0.0.0.0:9090).
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

impl Args {
    fn into_config(self) -> TailerConfig {
        let mut config = TailerConfig::new(self.path);
        config.sincedb_path = self.sincedb_path;
        config.data_dir = self.data_dir;
        config.commit_offsets = self.commit_offsets;
        config.start_timestamp = self.start_timestamp;
        config.clean_consumed = self.clean_consumed;
        config
    }
}

/// Writes each entry as one JSON line on stdout.
struct StdoutConsumer {
    stdout: tokio::io::Stdout,
}

impl StdoutConsumer {
    fn new() -> Self {
        Self {
            stdout: tokio::io::stdout(),
        }
    }
}

#[async_trait]
impl EntryConsumer for StdoutConsumer {
    async fn accept(&mut self, entry: DlqEntry) -> Result<(), ConsumerRejected> {
        let mut line = serde_json::to_vec(&entry).map_err(|e| ConsumerRejected {
            message: format!("failed to serialize entry: {e}"),
        })?;
        line.push(b'\n');
        self.stdout
            .write_all(&line)
            .await
            .map_err(|e| ConsumerRejected {
                message: format!("stdout closed: {e}"),
            })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();

    if let Some(addr) = args.metrics_address {
        let exporter = PrometheusBuilder::new().with_http_listener(addr).install();
        if let Err(e) = exporter {
            eprintln!("Failed to start metrics exporter: {e}");
            return ExitCode::FAILURE;
        }
        info!(address = %addr, "Serving Prometheus metrics");
    }

    let mut tailer = DlqTailer::new(args.into_config());
    if let Err(e) = tailer.register().await {
        eprintln!("Failed to register tailer: {e}");
        return ExitCode::FAILURE;
    }

    let stop = tailer.stop_handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        stop.stop();
    });

    let mut consumer = StdoutConsumer::new();
    match tailer.run(&mut consumer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Tailer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
