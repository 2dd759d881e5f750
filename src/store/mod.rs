pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{Category, Listing, NormalizedListing, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Result of one atomic create-or-update
#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub listing: Listing,
    pub created: bool,
    /// Price stored before this write, read in the same transaction
    pub previous_price: Option<Decimal>,
}

/// Persistence the ingestion pipeline relies on
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Get-or-create keyed by source name; never duplicates a source
    async fn resolve_or_create_source(
        &self,
        name: &str,
        category: Category,
        base_url: &str,
    ) -> Result<Source, StoreError>;

    /// Create or update the listing keyed by `record.external_id`, atomically
    /// with respect to the existence check. Updating a row owned by another
    /// source is an integrity violation.
    async fn upsert_listing(
        &self,
        source_id: Uuid,
        record: &NormalizedListing,
    ) -> Result<UpsertResult, StoreError>;

    async fn mark_source_scraped(&self, source_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError>;

    async fn get_listing(&self, external_id: &str) -> Result<Option<Listing>, StoreError>;

    async fn count_listings(&self, source_id: Uuid) -> Result<usize, StoreError>;
}
