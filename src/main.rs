use anyhow::{Context, Result};
use clap::Parser;
use listing_ingest::config::{IngestConfig, SourceConfig};
use listing_ingest::pipeline::{IngestionService, Ingestor};
use listing_ingest::scrapers::{PageFetcher, Politeness, ReqwestTransport};
use listing_ingest::store::{ListingStore, SqliteStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ingest classified listings into a local database
#[derive(Debug, Parser)]
#[command(name = "listing-ingest", version)]
struct Args {
    /// SQLite database file (overrides INGEST_DATABASE)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Sources ingested in parallel (overrides INGEST_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Source preset such as `cars:bmw` or `flats:riga`; repeatable
    #[arg(long = "source", required = true)]
    sources: Vec<String>,

    /// Stop after this many index pages per source
    #[arg(long)]
    max_pages: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = IngestConfig::from_env()?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(workers) = args.workers {
        config.worker_limit = workers.max(1);
    }

    let sources = args
        .sources
        .iter()
        .map(|preset| SourceConfig::from_preset(preset).map(|s| s.with_max_pages(args.max_pages)))
        .collect::<Result<Vec<_>>>()?;

    info!("Listing ingest");
    info!(
        "Database {}, {} source(s), {} worker(s)",
        config.database_path.display(),
        sources.len(),
        config.worker_limit
    );

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("Failed to open {}", config.database_path.display()))?,
    );
    let transport = ReqwestTransport::new(&config.fetch)?;
    let politeness = Arc::new(Politeness::new(&config.fetch));
    let fetcher = PageFetcher::new(Arc::new(transport), politeness, &config.fetch);
    let ingestor = Arc::new(Ingestor::new(fetcher, store.clone()));
    let service = Arc::new(IngestionService::new(ingestor, config.worker_limit));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let stopping = service.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing current listings");
            stopping.shutdown();
            on_signal.cancel();
        }
    });

    let reports = service.run_all(sources, &cancel).await;

    for summary in reports.iter().filter_map(|r| r.summary.as_ref()) {
        match store.count_listings(summary.source_id).await {
            Ok(total) => info!(source = %summary.source, "{} listings stored", total),
            Err(e) => warn!(source = %summary.source, "Could not count stored listings: {}", e),
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{failed} source(s) failed");
    }
    Ok(())
}
