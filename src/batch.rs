// Bulk upload driver.
// Hundreds of receipts arrive at once: concurrency is bounded by a
// semaphore, each file gets its own time budget, and one bad file never
// takes the batch down. The caller receives a per-file manifest it can use
// to re-submit only the failed subset.

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Ok,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set on ok outcomes: whether the ledger entry was created or merged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

impl FileOutcome {
    fn ok(filename: String, created: bool) -> Self {
        FileOutcome {
            filename,
            outcome: OutcomeKind::Ok,
            reason: None,
            created: Some(created),
        }
    }

    fn skipped(filename: String, reason: String) -> Self {
        FileOutcome {
            filename,
            outcome: OutcomeKind::Skipped,
            reason: Some(reason),
            created: None,
        }
    }

    fn error(filename: String, reason: String) -> Self {
        FileOutcome {
            filename,
            outcome: OutcomeKind::Error,
            reason: Some(reason),
            created: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub id: Uuid,
    pub outcomes: Vec<FileOutcome>,
    /// true when the batch stopped early on a cancellation request
    pub cancelled: bool,
}

impl BatchReport {
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == kind).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "lote {}: {} ok, {} con error, {} omitidos",
            self.id,
            self.count(OutcomeKind::Ok),
            self.count(OutcomeKind::Error),
            self.count(OutcomeKind::Skipped),
        )
    }
}

// ============================================================================
// INGESTOR
// ============================================================================

pub struct BatchIngestor {
    pipeline: Arc<Pipeline>,
    pub max_concurrent: usize,
    pub file_timeout: Duration,
}

enum Pending {
    Done(FileOutcome),
    Running(String, tokio::task::JoinHandle<FileOutcome>),
}

impl BatchIngestor {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent: usize, file_timeout: Duration) -> Self {
        BatchIngestor {
            pipeline,
            max_concurrent: max_concurrent.max(1),
            file_timeout,
        }
    }

    /// Ingest a set of (filename, bytes) pairs.
    ///
    /// Admission waits on the semaphore, so the cancellation flag takes
    /// effect between files as slots free up; files already dispatched run
    /// to completion and their ledger writes stay committed. A file whose
    /// parse exceeds the time budget is reported as a timeout for that
    /// file only (the detached worker cannot be interrupted mid-parse, its
    /// late result is discarded).
    pub async fn ingest(
        &self,
        files: Vec<(String, Vec<u8>)>,
        cancel: Arc<AtomicBool>,
    ) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut pending: Vec<Pending> = Vec::with_capacity(files.len());
        let mut cancelled = false;

        for (filename, bytes) in files {
            if cancel.load(Ordering::SeqCst) {
                cancelled = true;
                pending.push(Pending::Done(FileOutcome::skipped(
                    filename,
                    "lote cancelado".to_string(),
                )));
                continue;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");

            let pipeline = self.pipeline.clone();
            let timeout = self.file_timeout;
            let name = filename.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let worker_name = name.clone();
                let work =
                    tokio::task::spawn_blocking(move || pipeline.ingest_file(&worker_name, &bytes));

                match tokio::time::timeout(timeout, work).await {
                    Err(_) => FileOutcome::error(
                        name,
                        PipelineError::ExtractionTimeout(timeout).to_string(),
                    ),
                    Ok(Err(join_err)) => FileOutcome::error(name, join_err.to_string()),
                    Ok(Ok(Ok(summary))) => FileOutcome::ok(name, summary.created),
                    Ok(Ok(Err(e))) => FileOutcome::error(name, e.to_string()),
                }
            });

            pending.push(Pending::Running(filename, handle));
        }

        // Collect in submission order so the manifest mirrors the input
        let mut outcomes = Vec::with_capacity(pending.len());
        for p in pending {
            match p {
                Pending::Done(outcome) => outcomes.push(outcome),
                Pending::Running(filename, handle) => {
                    let outcome = handle
                        .await
                        .unwrap_or_else(|e| FileOutcome::error(filename, e.to_string()));
                    outcomes.push(outcome);
                }
            }
        }

        BatchReport {
            id: Uuid::new_v4(),
            outcomes,
            cancelled,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::CodeRegistry;
    use crate::pdf::TextPassthroughExtractor;
    use crate::pipeline::PipelineConfig;
    use crate::store::{LedgerFilter, LedgerStore, MemoryStore};

    fn ingestor(store: Arc<MemoryStore>) -> BatchIngestor {
        let pipeline = Pipeline::new(
            store,
            Arc::new(TextPassthroughExtractor),
            None,
            None,
            CodeRegistry::builtin(),
            &PipelineConfig::default(),
        )
        .unwrap();
        BatchIngestor::new(Arc::new(pipeline), 4, Duration::from_secs(5))
    }

    fn receipt(legajo: &str) -> Vec<u8> {
        format!(
            "SUMAR SERVICIOS S.A.\nLegajo {} Periodo 09/2025\nContrib.Solidaria 450,00",
            legajo
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let files = vec![
            ("sumar_100.pdf".to_string(), receipt("100")),
            ("sumar_200.pdf".to_string(), receipt("200")),
            // No legajo resolvable: validation error for this file only
            ("roto.pdf".to_string(), b"texto sin identificadores".to_vec()),
        ];

        let report = ingestor.ingest(files, Arc::new(AtomicBool::new(false))).await;

        assert_eq!(report.outcomes.len(), 3);
        assert!(!report.cancelled);
        assert_eq!(report.count(OutcomeKind::Ok), 2);
        assert_eq!(report.count(OutcomeKind::Error), 1);

        // Manifest preserves input order
        assert_eq!(report.outcomes[0].filename, "sumar_100.pdf");
        assert_eq!(report.outcomes[2].outcome, OutcomeKind::Error);
        assert!(report.outcomes[2].reason.as_deref().unwrap().contains("legajo"));

        // The bad file never reached the ledger
        let entries = store.query(&LedgerFilter::default()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_batch_skips_remaining_files() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store);

        let cancel = Arc::new(AtomicBool::new(true));
        let files = vec![
            ("a.pdf".to_string(), receipt("100")),
            ("b.pdf".to_string(), receipt("200")),
        ];

        let report = ingestor.ingest(files, cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.count(OutcomeKind::Skipped), 2);
        for outcome in &report.outcomes {
            assert_eq!(outcome.reason.as_deref(), Some("lote cancelado"));
        }
    }

    #[tokio::test]
    async fn test_duplicate_filenames_in_batch_stay_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(store.clone());

        let files = vec![
            ("recibo.pdf".to_string(), receipt("100")),
            ("recibo.pdf".to_string(), receipt("100")),
        ];

        let report = ingestor.ingest(files, Arc::new(AtomicBool::new(false))).await;
        assert_eq!(report.count(OutcomeKind::Ok), 2);

        let entries = store.query(&LedgerFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_files, vec!["recibo.pdf"]);
    }
}
