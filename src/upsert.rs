use crate::error::StoreError;
use crate::models::{Listing, NormalizedListing, Source};
use crate::store::ListingStore;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Price movement seen when re-scraping a known listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceChange {
    pub previous: Decimal,
    pub current: Decimal,
}

impl PriceChange {
    pub fn is_drop(&self) -> bool {
        self.current < self.previous
    }
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub listing: Listing,
    pub action: UpsertAction,
    pub price_change: Option<PriceChange>,
}

/// Reconciles normalized records against persisted listings
#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn ListingStore>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    /// Create or refresh the listing for `record` under `source`.
    ///
    /// Integrity violations are returned as-is and never retried.
    pub async fn upsert(
        &self,
        record: &NormalizedListing,
        source: &Source,
    ) -> Result<UpsertOutcome, StoreError> {
        let result = match self.store.upsert_listing(source.id, record).await {
            Ok(result) => result,
            Err(e) => {
                if matches!(e, StoreError::Integrity(_)) {
                    error!(external_id = %record.external_id, source = %source.name, "Integrity violation: {}", e);
                }
                return Err(e);
            }
        };

        let action = if result.created {
            UpsertAction::Created
        } else {
            UpsertAction::Updated
        };

        let price_change = match (result.previous_price, result.listing.price) {
            (Some(previous), Some(current)) if previous != current => {
                Some(PriceChange { previous, current })
            }
            _ => None,
        };

        if let Some(change) = &price_change {
            info!(
                external_id = %record.external_id,
                "Price changed {} -> {}",
                change.previous,
                change.current
            );
        }
        debug!(external_id = %record.external_id, ?action, "Upserted listing");

        Ok(UpsertOutcome {
            listing: result.listing,
            action,
            price_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::store::SqliteStore;
    use std::str::FromStr;

    fn record(price: &str) -> NormalizedListing {
        NormalizedListing {
            external_id: "bdkxm".to_string(),
            category: Category::Car,
            url: "https://www.ss.com/msg/lv/transport/cars/bmw/x5/bdkxm.html".to_string(),
            title: "BMW X5".to_string(),
            description: String::new(),
            location: "Rīga".to_string(),
            price: Some(Decimal::from_str(price).unwrap()),
            images: Vec::new(),
            year: None,
            mileage: None,
            fuel_type: None,
            car_category: Some("BMW".to_string()),
            rooms: None,
            area: None,
            property_type: None,
        }
    }

    async fn engine() -> (UpsertEngine, Source) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let source = store
            .resolve_or_create_source("ss.com cars/bmw", Category::Car, "https://www.ss.com")
            .await
            .unwrap();
        (UpsertEngine::new(store), source)
    }

    #[tokio::test]
    async fn reports_created_then_updated() {
        let (engine, source) = engine().await;

        let first = engine.upsert(&record("15000.00"), &source).await.unwrap();
        let second = engine.upsert(&record("15000.00"), &source).await.unwrap();

        assert_eq!(first.action, UpsertAction::Created);
        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(first.listing.id, second.listing.id);
        assert!(second.price_change.is_none());
    }

    #[tokio::test]
    async fn detects_price_drop() {
        let (engine, source) = engine().await;
        engine.upsert(&record("15000.00"), &source).await.unwrap();

        let outcome = engine.upsert(&record("13999.00"), &source).await.unwrap();

        let change = outcome.price_change.unwrap();
        assert!(change.is_drop());
        assert_eq!(change.previous, Decimal::from_str("15000").unwrap());
        assert_eq!(change.current, Decimal::from_str("13999").unwrap());
    }
}
