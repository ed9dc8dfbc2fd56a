// Recibos - Payroll Receipt Ingestion & Reconciliation
// Exposes all modules for use in the CLI, the API server, and tests

pub mod normalize;
pub mod money;
pub mod codes;
pub mod classify;
pub mod extract;
pub mod pdf;
pub mod blobstore;
pub mod store;
pub mod audit_csv;
pub mod official;
pub mod upsert;
pub mod reconcile;
pub mod pipeline;
pub mod batch;
pub mod error;

// Re-export commonly used types
pub use classify::{Classification, Classifier, CompanyId};
pub use codes::{CodeDef, CodeRegistry};
pub use error::PipelineError;
pub use extract::{ExtractionResult, Extractor};
pub use money::{format_centavos, parse_amount, parse_decimal, Centavos};
pub use normalize::normalize;
pub use pdf::{LopdfExtractor, PdfTextExtractor};
pub use blobstore::{BlobStore, DiskBlobStore};
pub use store::{
    audit_key, ledger_key, AuditRow, LedgerEntry, LedgerFilter, LedgerStore, MemoryStore,
    SqliteStore,
};
pub use audit_csv::CsvAuditLedger;
pub use official::load_official_map;
pub use upsert::{UpsertEngine, UpsertOutcome};
pub use reconcile::{DiffEngine, DiffItem, Direction, ReconcileReport};
pub use pipeline::{IngestSummary, Pipeline, PipelineConfig};
pub use batch::{BatchIngestor, BatchReport, FileOutcome, OutcomeKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
