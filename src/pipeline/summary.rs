use crate::error::ItemError;
use crate::scrapers::discover::DiscoveryStop;
use crate::upsert::{UpsertAction, UpsertOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Step of an item at which it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Fetch,
    Parse,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub url: String,
    pub stage: FailureStage,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(url: &str, error: &ItemError) -> Self {
        let stage = match error {
            ItemError::Fetch(_) => FailureStage::Fetch,
            ItemError::Malformed(_) => FailureStage::Parse,
            ItemError::Store(_) => FailureStage::Upsert,
        };
        Self {
            url: url.to_string(),
            stage,
            reason: error.to_string(),
        }
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub source_id: Uuid,
    pub discovered: usize,
    pub created: usize,
    pub updated: usize,
    pub price_drops: usize,
    pub failures: Vec<ItemFailure>,
    /// Why discovery ended, for operators reading the summary
    pub discovery_end: String,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub(crate) fn start(source: &str, source_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            source: source.to_string(),
            source_id,
            discovered: 0,
            created: 0,
            updated: 0,
            price_drops: 0,
            failures: Vec::new(),
            discovery_end: String::new(),
            cancelled: false,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn record_discovery(&mut self, discovered: usize, stop: &DiscoveryStop) {
        self.discovered = discovered;
        self.discovery_end = match stop {
            DiscoveryStop::EmptyPage => "empty page".to_string(),
            DiscoveryStop::NoContainer => "no results container".to_string(),
            DiscoveryStop::RepeatedPage => "repeated page".to_string(),
            DiscoveryStop::PageCap => "page cap".to_string(),
            DiscoveryStop::Cancelled => "cancelled".to_string(),
            DiscoveryStop::Failed(e) => format!("aborted: {e}"),
        };
    }

    pub(crate) fn record_success(&mut self, outcome: &UpsertOutcome) {
        match outcome.action {
            UpsertAction::Created => self.created += 1,
            UpsertAction::Updated => self.updated += 1,
        }
        if outcome.price_change.is_some_and(|c| c.is_drop()) {
            self.price_drops += 1;
        }
    }

    pub(crate) fn record_failure(&mut self, failure: ItemFailure) {
        self.failures.push(failure);
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}
