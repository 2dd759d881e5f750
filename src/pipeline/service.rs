use crate::config::SourceConfig;
use crate::error::RunError;
use crate::pipeline::orchestrator::Ingestor;
use crate::pipeline::summary::RunSummary;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Outcome of one source within [`IngestionService::run_all`]
#[derive(Debug, Serialize)]
pub struct SourceReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: &str, result: Result<RunSummary, RunError>) -> Self {
        match result {
            Ok(summary) => Self {
                source: source.to_string(),
                summary: Some(summary),
                error: None,
            },
            Err(e) => Self {
                source: source.to_string(),
                summary: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs ingestion for many sources in parallel.
///
/// At most `worker_limit` runs are active at once, and two runs of the same
/// source never overlap: the second waits for the first to finish.
pub struct IngestionService {
    ingestor: Arc<Ingestor>,
    workers: Arc<Semaphore>,
    run_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestionService {
    pub fn new(ingestor: Arc<Ingestor>, worker_limit: usize) -> Self {
        Self {
            ingestor,
            workers: Arc::new(Semaphore::new(worker_limit.max(1))),
            run_locks: Mutex::new(HashMap::new()),
        }
    }

    fn run_lock(&self, source: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.run_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(source.to_string()).or_default().clone()
    }

    /// Run one source once a worker slot and its run lock are free
    pub async fn run_source(
        &self,
        config: &SourceConfig,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, RunError> {
        let lock = self.run_lock(&config.name);
        let _running = lock.lock().await;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| RunError::ShuttingDown)?;

        debug!(source = %config.name, "Worker slot acquired");
        self.ingestor.run_ingestion(config, cancel).await
    }

    /// Run every config concurrently; reports come back in input order
    pub async fn run_all(
        self: &Arc<Self>,
        configs: Vec<SourceConfig>,
        cancel: &CancellationToken,
    ) -> Vec<SourceReport> {
        let names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        let mut results: Vec<Option<SourceReport>> = names.iter().map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (index, config) in configs.into_iter().enumerate() {
            let service = Arc::clone(self);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = service.run_source(&config, &cancel).await;
                (index, SourceReport::new(&config.name, result))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => {
                    if let Some(e) = &report.error {
                        error!(source = %report.source, "Run failed: {}", e);
                    }
                    results[index] = Some(report);
                }
                Err(e) => error!("Ingestion task panicked: {}", e),
            }
        }

        let reports: Vec<SourceReport> = results
            .into_iter()
            .zip(names)
            .map(|(report, name)| {
                report.unwrap_or_else(|| SourceReport {
                    source: name,
                    summary: None,
                    error: Some("ingestion task aborted".to_string()),
                })
            })
            .collect();

        let ok = reports.iter().filter(|r| r.is_ok()).count();
        info!("Finished {} of {} sources", ok, reports.len());
        reports
    }

    /// Refuse new runs; runs already holding a worker slot finish normally
    pub fn shutdown(&self) {
        self.workers.close();
    }
}
