// Error taxonomy for the ingestion pipeline
// Non-fatal conditions (unknown company, partial extraction) are NOT errors:
// they are represented in the result values themselves.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The PDF-to-text conversion failed for this file
    #[error("fallo al extraer texto del PDF: {0}")]
    ParseFailure(String),

    /// The extraction step exceeded its per-file time budget
    #[error("extracción abortada por timeout ({0:?})")]
    ExtractionTimeout(Duration),

    /// A concurrent upsert won the race for this key and retries ran out
    #[error("conflicto de escritura concurrente sobre la clave {0}")]
    StorageConflict(String),

    /// The storage backend failed (I/O, SQL, serialization)
    #[error("error de almacenamiento: {0}")]
    Storage(String),

    /// The file cannot be written to the ledger (missing identifiers)
    #[error("validación: {0}")]
    Validation(String),
}

impl PipelineError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        PipelineError::Storage(err.to_string())
    }
}
