use crate::config::SourceConfig;
use crate::error::StoreError;
use crate::models::Source;
use crate::store::ListingStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Resolves the source record a run's listings belong to
#[derive(Clone)]
pub struct SourceRegistry {
    store: Arc<dyn ListingStore>,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Existing source named by `config`, created on first encounter
    pub async fn resolve(&self, config: &SourceConfig) -> Result<Source, StoreError> {
        let source = self
            .store
            .resolve_or_create_source(&config.name, config.category, &config.base_url)
            .await?;
        info!(source = %source.name, id = %source.id, "Resolved source");
        Ok(source)
    }

    /// Stamp the source with the end of a completed run
    pub async fn record_run(&self, source: &Source, finished_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.store.mark_source_scraped(source.id, finished_at).await
    }
}
