use crate::config::SourceConfig;
use crate::error::{ItemError, RunError};
use crate::models::Source;
use crate::normalize::normalize;
use crate::pipeline::summary::{ItemFailure, RunSummary};
use crate::registry::SourceRegistry;
use crate::scrapers::discover::{DiscoveryStop, LinkDiscoverer};
use crate::scrapers::fetcher::{PageFetcher, PageKind};
use crate::scrapers::parser::ListingParser;
use crate::store::ListingStore;
use crate::upsert::{UpsertEngine, UpsertOutcome};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// States of one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    ResolvingSource,
    Discovering,
    Fetching,
    Parsing,
    Normalizing,
    Upserting,
    Summarizing,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::ResolvingSource => "resolving source",
            RunPhase::Discovering => "discovering",
            RunPhase::Fetching => "fetching",
            RunPhase::Parsing => "parsing",
            RunPhase::Normalizing => "normalizing",
            RunPhase::Upserting => "upserting",
            RunPhase::Summarizing => "summarizing",
        };
        f.write_str(name)
    }
}

struct PhaseTracker {
    phase: RunPhase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
        }
    }

    fn enter(&mut self, next: RunPhase) {
        debug!("{} -> {}", self.phase, next);
        self.phase = next;
    }
}

/// Drives discovery, fetching, parsing, normalization and upserts for a
/// source. Per-listing failures are recorded in the summary; only source
/// resolution and a dead first index page end a run early.
pub struct Ingestor {
    fetcher: PageFetcher,
    registry: SourceRegistry,
    upserter: UpsertEngine,
}

impl Ingestor {
    pub fn new(fetcher: PageFetcher, store: Arc<dyn ListingStore>) -> Self {
        Self {
            fetcher,
            registry: SourceRegistry::new(store.clone()),
            upserter: UpsertEngine::new(store),
        }
    }

    pub async fn run_ingestion(
        &self,
        config: &SourceConfig,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let span = info_span!("ingestion", source = %config.name);
        self.run(config, cancel).instrument(span).await
    }

    async fn run(
        &self,
        config: &SourceConfig,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let mut phase = PhaseTracker::new();

        phase.enter(RunPhase::ResolvingSource);
        let source = self
            .registry
            .resolve(config)
            .await
            .map_err(|source| RunError::SourceResolution {
                name: config.name.clone(),
                source,
            })?;
        let mut summary = RunSummary::start(&source.name, source.id);

        phase.enter(RunPhase::Discovering);
        let discovery = LinkDiscoverer::new(&self.fetcher, config).collect(cancel).await;
        if let DiscoveryStop::Failed(e) = &discovery.stop {
            if discovery.links.is_empty() {
                phase.enter(RunPhase::Idle);
                return Err(RunError::Discovery(e.clone()));
            }
        }
        summary.record_discovery(discovery.links.len(), &discovery.stop);
        summary.cancelled = discovery.stop == DiscoveryStop::Cancelled;
        info!("Discovered {} listings", discovery.links.len());

        let parser = ListingParser::new(config);
        for (index, url) in discovery.links.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Run cancelled after {} of {} listings", index, discovery.links.len());
                summary.cancelled = true;
                break;
            }

            match self.ingest_one(url, &source, config, &parser, &mut phase).await {
                Ok(outcome) => {
                    info!(url = %url, action = ?outcome.action, "Saved: {}", outcome.listing.title);
                    summary.record_success(&outcome);
                }
                Err(e) => {
                    warn!(url = %url, "Listing failed: {}", e);
                    summary.record_failure(ItemFailure::new(url, &e));
                }
            }
        }

        phase.enter(RunPhase::Summarizing);
        summary.finished_at = Utc::now();
        if !summary.cancelled {
            if let Err(e) = self.registry.record_run(&source, summary.finished_at).await {
                warn!("Could not record run time on source: {}", e);
            }
        }

        info!(
            discovered = summary.discovered,
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed(),
            "Run finished"
        );
        phase.enter(RunPhase::Idle);
        Ok(summary)
    }

    async fn ingest_one(
        &self,
        url: &str,
        source: &Source,
        config: &SourceConfig,
        parser: &ListingParser,
        phase: &mut PhaseTracker,
    ) -> Result<UpsertOutcome, ItemError> {
        phase.enter(RunPhase::Fetching);
        let content = self.fetcher.fetch(url, PageKind::Detail).await?;

        phase.enter(RunPhase::Parsing);
        let raw = parser.parse(&content, url)?;

        phase.enter(RunPhase::Normalizing);
        let record = normalize(&raw, config.category, config.car_category.as_deref());

        phase.enter(RunPhase::Upserting);
        Ok(self.upserter.upsert(&record, source).await?)
    }
}
