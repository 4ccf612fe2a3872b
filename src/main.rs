use chargeflow::application::config::OrchestratorConfig;
use chargeflow::application::middleware::{ChargeHandler, Traced};
use chargeflow::application::orchestrator::PaymentOrchestrator;
use chargeflow::application::reconciler::ReconcilerConfig;
use chargeflow::application::resolver::GatewayResolver;
use chargeflow::domain::ports::LedgerStoreRef;
use chargeflow::infrastructure::in_memory::InMemoryLedgerStore;
use chargeflow::infrastructure::sandbox::SandboxGateway;
use chargeflow::interfaces::csv::charge_reader::ChargeReader;
use chargeflow::interfaces::csv::ledger_writer::LedgerWriter;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input charges CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Retries for charges that never reached the provider
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Per-call gateway timeout in milliseconds
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Run one reconciliation sweep over Pending payments before printing the ledger
    #[arg(long)]
    reconcile: bool,
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    use chargeflow::infrastructure::rocksdb::RocksDBLedgerStore;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDBLedgerStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<LedgerStoreRef> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "persistent storage requested but the 'storage-rocksdb' feature is not enabled; falling back to in-memory storage"
        );
    }
    Ok(Arc::new(InMemoryLedgerStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("warn".parse().into_diagnostic()?),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    let config = OrchestratorConfig {
        max_transport_retries: cli.max_retries,
        gateway_timeout: Duration::from_millis(cli.timeout_ms),
        ..OrchestratorConfig::default()
    };
    let resolver = GatewayResolver::new()
        .register("stripe-like", SandboxGateway::new("stripe-like"))
        .register("adyen-like", SandboxGateway::new("adyen-like"));
    info!(providers = ?resolver.providers().collect::<Vec<_>>(), "gateways registered");
    let store = open_store(cli.db_path)?;
    let orchestrator = PaymentOrchestrator::new(resolver, store.clone(), config);
    let handler = Traced::new(orchestrator.clone());

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = ChargeReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                if let Err(e) = handler.charge(command).await {
                    warn!(error = %e, "error processing charge");
                }
            }
            Err(e) => {
                warn!(error = %e, "error reading charge");
            }
        }
    }

    if cli.reconcile {
        let reconciler = orchestrator.reconciler(ReconcilerConfig {
            min_age: Duration::ZERO,
            ..ReconcilerConfig::default()
        });
        reconciler.sweep().await.into_diagnostic()?;
    }

    let records = store.all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = LedgerWriter::new(stdout.lock());
    writer.write_records(records).into_diagnostic()?;

    Ok(())
}
