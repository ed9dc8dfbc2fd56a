// Pipeline façade: the operations the API layer calls.
// Every collaborator (store, PDF extraction, audit ledger, blob storage)
// arrives through the constructor; nothing reaches for a global.

use crate::audit_csv::CsvAuditLedger;
use crate::blobstore::BlobStore;
use crate::classify::{Classifier, CompanyId};
use crate::codes::CodeRegistry;
use crate::error::PipelineError;
use crate::extract::{ExtractionResult, Extractor};
use crate::pdf::PdfTextExtractor;
use crate::reconcile::{DiffEngine, ReconcileReport};
use crate::store::{LedgerEntry, LedgerFilter, LedgerStore};
use crate::upsert::{UpsertEngine, UpsertOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Pipeline tuning, built once in main and injected.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Reconciliation tolerance as a decimal string ("0.01", "1.00")
    pub tolerance: String,

    /// Per-file budget for the PDF-parsing step in batch ingestion
    pub extract_timeout: Duration,

    /// Concurrent file bound for bulk uploads
    pub max_concurrent: usize,

    /// Upsert retries on a concurrent-write conflict
    pub max_upsert_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tolerance: "1.00".to_string(),
            extract_timeout: Duration::from_secs(30),
            max_concurrent: 8,
            max_upsert_retries: 3,
        }
    }
}

/// Per-file result of a full ingest (classify -> extract -> upsert).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSummary {
    pub filename: String,
    /// Blob reference, when a blob store is wired in
    pub stored_as: Option<String>,
    pub key: String,
    pub created: bool,
    pub company: CompanyId,
    pub confidence: f64,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    classifier: Classifier,
    extractor: Extractor,
    upsert_engine: UpsertEngine,
    diff_engine: DiffEngine,
    pdf: Arc<dyn PdfTextExtractor>,
    blobs: Option<Arc<dyn BlobStore>>,
    store: Arc<dyn LedgerStore>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        pdf: Arc<dyn PdfTextExtractor>,
        csv_ledger: Option<Arc<CsvAuditLedger>>,
        blobs: Option<Arc<dyn BlobStore>>,
        registry: CodeRegistry,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let mut upsert_engine = UpsertEngine::new(store.clone(), csv_ledger);
        upsert_engine.max_retries = config.max_upsert_retries;

        let diff_engine =
            DiffEngine::with_tolerance_str(registry.clone(), &config.tolerance)?;

        Ok(Pipeline {
            classifier: Classifier::new(),
            extractor: Extractor::new(registry),
            upsert_engine,
            diff_engine,
            pdf,
            blobs,
            store,
        })
    }

    /// Classify the payer and extract structured fields from one uploaded
    /// file. Pure aside from the PDF-to-text call.
    pub fn classify_and_extract(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<ExtractionResult, PipelineError> {
        let text = self.pdf.pdf_to_text(bytes)?;
        let classification = self.classifier.classify(filename, Some(&text));

        let mut extraction = self.extractor.extract(&text);
        extraction.company = classification.company;
        Ok(extraction)
    }

    /// Fold an extraction into the ledger.
    pub fn upsert_extraction(
        &self,
        extraction: &ExtractionResult,
        filename: &str,
    ) -> Result<UpsertOutcome, PipelineError> {
        self.upsert_engine.upsert(extraction, filename)
    }

    /// Full single-file ingest: store the bytes, classify, extract, upsert.
    pub fn ingest_file(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestSummary, PipelineError> {
        let stored_as = match &self.blobs {
            Some(blobs) => Some(blobs.store(bytes, filename)?),
            None => None,
        };

        let text = self.pdf.pdf_to_text(bytes)?;
        let classification = self.classifier.classify(filename, Some(&text));
        let mut extraction = self.extractor.extract(&text);
        extraction.company = classification.company;

        let outcome = self.upsert_engine.upsert(&extraction, filename)?;

        Ok(IngestSummary {
            filename: filename.to_string(),
            stored_as,
            key: outcome.key,
            created: outcome.created,
            company: classification.company,
            confidence: classification.confidence,
        })
    }

    /// Reconcile the calculated ledger values for (legajo, periodo) against
    /// an official map. A missing official map yields a report flagged
    /// `no_official_data`, never an error.
    pub fn reconcile(
        &self,
        legajo: &str,
        periodo: &str,
        official: Option<&BTreeMap<String, String>>,
    ) -> Result<ReconcileReport, PipelineError> {
        let official = match official {
            Some(map) if !map.is_empty() => map,
            _ => {
                return Ok(ReconcileReport {
                    legajo: legajo.to_string(),
                    periodo: periodo.to_string(),
                    items: Vec::new(),
                    no_official_data: true,
                });
            }
        };

        let calculated = self.calculated_fields(legajo, periodo)?;
        let items = self.diff_engine.diff(official, &calculated)?;

        Ok(ReconcileReport {
            legajo: legajo.to_string(),
            periodo: periodo.to_string(),
            items,
            no_official_data: false,
        })
    }

    /// List consolidated ledger entries.
    pub fn ledger(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, PipelineError> {
        self.store.query(filter)
    }

    /// Calculated code map for a key, independent of which company prefix
    /// the entry was stored under. Absent entry means an empty map: every
    /// official code then diffs against "0.00".
    fn calculated_fields(
        &self,
        legajo: &str,
        periodo: &str,
    ) -> Result<BTreeMap<String, String>, PipelineError> {
        let filter = LedgerFilter {
            periodo: Some(periodo.to_string()),
            ..Default::default()
        };

        let entry = self
            .store
            .query(&filter)?
            .into_iter()
            .find(|e| e.legajo == legajo);

        Ok(entry.map(|e| e.fields).unwrap_or_default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
