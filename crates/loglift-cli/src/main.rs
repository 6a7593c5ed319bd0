//! 🚀 loglift-cli: the front door. Loads config, registers templates, ships NDJSON, prints a table.
//!
//! 🎬 *[narrator voice]* "It all started with a log file nobody wanted to read..."
//! 📦 This binary is a thin wrapper: the real work lives in the `loglift` library.
//! Like a manager. 🦆
//!
//! ⚠️ Exit codes: configuration trouble (bad file, bad servers, refused templates, unreadable
//! input) exits 1. A cluster that rejects documents does NOT: those documents went to failover
//! and the summary tells you how many.

mod summary;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use loglift::ndjson::NdjsonLines;
use loglift::{AppConfig, BatchBuilder, BatchDispatcher, BatchOperations, ClientObjectFactory, ConnectionConfig};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::summary::{DeliveryTally, ShippingProgress};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// 🚚 Ship NDJSON log lines to a search cluster in batches, spilling failures to failover.
#[derive(Parser, Debug)]
#[command(name = "loglift", version, about)]
struct Cli {
    /// 🔧 TOML config file. Missing file = env vars only (LOGLIFT_*).
    #[arg(short, long, env = "LOGLIFT_CONFIG", default_value = "loglift.toml")]
    config: PathBuf,

    /// 📁 NDJSON input. Reads stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 📡 Overrides `shipping.index`.
    #[arg(long)]
    index: Option<String>,

    /// 📦 Overrides `shipping.batch_size`.
    #[arg(long)]
    batch_size: Option<usize>,

    /// 🤫 No progress bar.
    #[arg(long)]
    quiet: bool,
}

/// 🚀 main(): sync on purpose, so the runtime can be sized from config before it exists.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_file = cli
        .config
        .try_exists()
        .with_context(|| format!("💀 Couldn't check whether '{}' exists. Permissions, maybe?", cli.config.display()))?
        .then_some(cli.config.as_path());
    if config_file.is_none() {
        warn!("🔧 '{}' not found; configuring from LOGLIFT_* env vars only", cli.config.display());
    }

    let mut app_config = loglift::load_config(config_file)
        .context("💀 Couldn't load the config. Make sure you didn't forget something obvious.")?;
    if let Some(index) = cli.index.clone() {
        app_config.shipping.index = index;
    }
    if let Some(batch_size) = cli.batch_size {
        app_config.shipping.batch_size = batch_size;
    }
    if app_config.shipping.batch_size == 0 {
        anyhow::bail!("💀 shipping.batch_size must be at least 1. A batch of zero is just a meeting.");
    }

    let connection = app_config
        .connection_config()
        .context("💀 The [connection] section didn't validate")?;

    // 🧵 one worker per configured I/O thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(connection.io_thread_count())
        .enable_all()
        .build()
        .context("💀 The tokio runtime refused to be born")?;

    runtime.block_on(ship(cli, app_config, connection))
}

async fn ship(cli: Cli, app_config: AppConfig, connection: ConnectionConfig) -> Result<()> {
    let factory = ClientObjectFactory::new(app_config.transport_kind(), connection);
    info!(
        "🚚 Shipping via {:?} to {}",
        factory.kind(),
        factory.server_list().join(";")
    );

    let failover = app_config.failover.build().await?;

    // 📐 templates first, synchronously; a refused template stops the show
    for template_ref in &app_config.index_templates {
        let template = template_ref.load().await?;
        factory
            .execute(&template)
            .await
            .with_context(|| format!("💀 Index template '{}' was not applied", template.name))?;
    }

    let listener = factory.create_batch_listener(failover.clone());
    let ops = factory.create_batch_operations();

    let (mut reader, source_name, total_size) = open_input(cli.input.as_deref()).await?;
    let progress = ShippingProgress::new(source_name, total_size, cli.quiet);
    let mut shipper = Shipper {
        listener,
        ops,
        builder: ops.create_batch_builder(),
        index: app_config.shipping.index.clone(),
        batch_size: app_config.shipping.batch_size,
        max_in_flight: factory.config().max_total_connections(),
        in_flight: FuturesUnordered::new(),
        tally: DeliveryTally::default(),
    };

    let mut splitter = NdjsonLines::new();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = reader
            .read(&mut chunk)
            .await
            .context("💀 Reading the input stopped halfway. The rest of the file is a mystery.")?;
        if read == 0 {
            break;
        }
        progress.advance(read as u64);
        for line in splitter.push(&chunk[..read]) {
            shipper.add_line(line).await;
        }
        progress.update(&shipper.tally);
    }
    if let Some(line) = splitter.finish() {
        shipper.add_line(line).await;
    }
    shipper.ship_pending().await;
    shipper.drain_all().await;

    if let Err(e) = failover.flush().await {
        warn!("💀 {} could not flush: {}", failover.name(), e);
    }

    let elapsed = progress.finish();
    println!("{}", shipper.tally.to_table(elapsed));
    Ok(())
}

async fn open_input(path: Option<&Path>) -> Result<(Box<dyn AsyncRead + Unpin + Send>, String, u64)> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("💀 Couldn't open input '{}'", path.display()))?;
            let size = file.metadata().await.map(|meta| meta.len()).unwrap_or(0);
            Ok((Box::new(file), path.display().to_string(), size))
        }
        None => Ok((Box::new(tokio::io::stdin()), "stdin".to_string(), 0)),
    }
}

type Receipt = std::pin::Pin<Box<dyn std::future::Future<Output = Option<loglift::DeliveryReport>> + Send>>;

/// 📦 Batches lines, dispatches one batch at a time, keeps a bounded number of receipts open.
struct Shipper {
    listener: BatchDispatcher,
    ops: BatchOperations,
    builder: BatchBuilder,
    index: String,
    batch_size: usize,
    max_in_flight: usize,
    in_flight: FuturesUnordered<Receipt>,
    tally: DeliveryTally,
}

impl Shipper {
    async fn add_line(&mut self, line: String) {
        self.builder.add(self.ops.create_batch_item(self.index.as_str(), line));
        if self.builder.len() >= self.batch_size {
            self.ship_pending().await;
        }
    }

    async fn ship_pending(&mut self) {
        if self.builder.is_empty() {
            return;
        }
        let builder = std::mem::replace(&mut self.builder, self.ops.create_batch_builder());
        let dispatch = self.listener.dispatch(builder.build()).await;
        if !dispatch.accepted {
            self.tally.record_not_accepted();
        }
        self.in_flight.push(Box::pin(dispatch.delivered()));
        while self.in_flight.len() >= self.max_in_flight {
            self.collect_one().await;
        }
    }

    async fn collect_one(&mut self) {
        match self.in_flight.next().await {
            Some(Some(report)) => self.tally.record(&report),
            Some(None) => self.tally.record_lost_receipt(),
            None => {}
        }
    }

    async fn drain_all(&mut self) {
        while !self.in_flight.is_empty() {
            self.collect_one().await;
        }
    }
}
