// 🔁 Ledger Upsert Engine - Fold one extraction into the consolidated ledger
// Key = (legajo, periodo), company joining in when known. Re-uploading an
// identically named file is idempotent. The audit trail is first-write-wins
// per key and never reflects later merges.

use crate::audit_csv::CsvAuditLedger;
use crate::error::PipelineError;
use crate::extract::ExtractionResult;
use crate::store::{ledger_key, AuditRow, LedgerEntry, LedgerStore};
use chrono::Utc;
use std::sync::Arc;

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    /// true when this upsert created the ledger entry, false when it merged
    /// into an existing one
    pub created: bool,
    pub key: String,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct UpsertEngine {
    store: Arc<dyn LedgerStore>,
    csv_ledger: Option<Arc<CsvAuditLedger>>,

    /// Bounded retries when a concurrent upsert wins the version race
    pub max_retries: u32,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn LedgerStore>, csv_ledger: Option<Arc<CsvAuditLedger>>) -> Self {
        UpsertEngine {
            store,
            csv_ledger,
            max_retries: 3,
        }
    }

    /// Merge an extraction into the ledger.
    ///
    /// Create on first sighting of the key. On an existing entry: append
    /// the source file unless already present, merge codes with later
    /// values overwriting same-code entries, keep the first non-empty
    /// name. The read-modify-write is serialized per key by the store's
    /// version check; a lost race re-reads and re-applies the merge.
    pub fn upsert(
        &self,
        extraction: &ExtractionResult,
        source_file: &str,
    ) -> Result<UpsertOutcome, PipelineError> {
        let legajo = extraction.legajo.as_deref().ok_or_else(|| {
            PipelineError::Validation(format!(
                "no se pudo resolver el legajo en {:?}",
                source_file
            ))
        })?;
        let periodo = extraction.periodo.as_deref().ok_or_else(|| {
            PipelineError::Validation(format!(
                "no se pudo resolver el período en {:?}",
                source_file
            ))
        })?;

        let key = ledger_key(extraction.company, legajo, periodo);

        let mut attempt = 0;
        let created = loop {
            let existing = self.store.get_entry(&key)?;
            let created = existing.is_none();

            let entry = match existing {
                None => LedgerEntry {
                    key: key.clone(),
                    company: extraction.company,
                    legajo: legajo.to_string(),
                    periodo: periodo.to_string(),
                    nombre: extraction.nombre.clone(),
                    source_files: vec![source_file.to_string()],
                    fields: extraction.codes.clone(),
                    version: 0,
                    updated_at: Utc::now(),
                },
                Some(mut entry) => {
                    if !entry.source_files.iter().any(|f| f == source_file) {
                        entry.source_files.push(source_file.to_string());
                    }
                    for (code, value) in &extraction.codes {
                        entry.fields.insert(code.clone(), value.clone());
                    }
                    if entry.nombre.is_none() {
                        entry.nombre = extraction.nombre.clone();
                    }
                    entry
                }
            };

            match self.store.put_entry(&entry) {
                Ok(()) => break created,
                Err(PipelineError::StorageConflict(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        // Audit trail, decoupled from the entry merge: first submission of
        // the (legajo, periodo) key wins, later ones are no-ops.
        let row = AuditRow {
            fecha: Utc::now(),
            archivo: source_file.to_string(),
            legajo: legajo.to_string(),
            periodo: periodo.to_string(),
            codigos: extraction.codes.clone(),
        };
        self.store.append_audit_row(&row)?;
        if let Some(csv) = &self.csv_ledger {
            csv.append(&row)?;
        }

        Ok(UpsertOutcome { created, key })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CompanyId;
    use crate::store::{LedgerFilter, MemoryStore};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn create_test_extraction(codes: &[(&str, &str)]) -> ExtractionResult {
        ExtractionResult {
            company: CompanyId::Sumar,
            legajo: Some("123".to_string()),
            periodo: Some("09/2025".to_string()),
            nombre: Some("PEREZ JUAN".to_string()),
            codes: codes
                .iter()
                .map(|(c, v)| (c.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn engine() -> (Arc<MemoryStore>, UpsertEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = UpsertEngine::new(store.clone(), None);
        (store, engine)
    }

    #[test]
    fn test_create_then_merge() {
        let (store, engine) = engine();

        let first = engine
            .upsert(&create_test_extraction(&[("20530", "885.50")]), "a.pdf")
            .unwrap();
        assert!(first.created);

        let second = engine
            .upsert(&create_test_extraction(&[("20510", "1250.00")]), "b.pdf")
            .unwrap();
        assert!(!second.created);

        // Disjoint code sets union
        let entry = store.get_entry(&first.key).unwrap().unwrap();
        assert_eq!(entry.fields.get("20530"), Some(&"885.50".to_string()));
        assert_eq!(entry.fields.get("20510"), Some(&"1250.00".to_string()));
        assert_eq!(entry.source_files, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_last_write_wins_on_overlapping_code() {
        let (store, engine) = engine();

        engine
            .upsert(&create_test_extraction(&[("20530", "885.50")]), "a.pdf")
            .unwrap();
        let outcome = engine
            .upsert(&create_test_extraction(&[("20530", "900.00")]), "b.pdf")
            .unwrap();

        let entry = store.get_entry(&outcome.key).unwrap().unwrap();
        assert_eq!(entry.fields.get("20530"), Some(&"900.00".to_string()));
    }

    #[test]
    fn test_same_filename_is_idempotent() {
        let (store, engine) = engine();
        let extraction = create_test_extraction(&[("20530", "885.50")]);

        engine.upsert(&extraction, "recibo.pdf").unwrap();
        engine.upsert(&extraction, "recibo.pdf").unwrap();

        let entries = store.query(&LedgerFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_files, vec!["recibo.pdf"]);
    }

    #[test]
    fn test_csv_ledger_gets_exactly_one_row_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let csv = Arc::new(CsvAuditLedger::open(dir.path().join("auditoria.csv")).unwrap());
        let store = Arc::new(MemoryStore::new());
        let engine = UpsertEngine::new(store, Some(csv.clone()));

        let extraction = create_test_extraction(&[("20530", "885.50")]);
        engine.upsert(&extraction, "recibo.pdf").unwrap();
        engine.upsert(&extraction, "recibo.pdf").unwrap();
        engine.upsert(&extraction, "recibo_parte2.pdf").unwrap();

        assert_eq!(csv.row_count(), 1);
    }

    #[test]
    fn test_missing_identifiers_is_validation_error() {
        let (_, engine) = engine();

        let mut extraction = create_test_extraction(&[("20530", "885.50")]);
        extraction.legajo = None;

        let err = engine.upsert(&extraction, "recibo.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let mut extraction = create_test_extraction(&[]);
        extraction.periodo = None;
        let err = engine.upsert(&extraction, "recibo.pdf").unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    /// Store that loses the version race a fixed number of times before
    /// delegating to a real in-memory store.
    struct FlakyStore {
        inner: MemoryStore,
        conflicts_left: AtomicU32,
    }

    impl LedgerStore for FlakyStore {
        fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>, PipelineError> {
            self.inner.get_entry(key)
        }
        fn put_entry(&self, entry: &LedgerEntry) -> Result<(), PipelineError> {
            if self.conflicts_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(PipelineError::StorageConflict(entry.key.clone()));
            }
            self.inner.put_entry(entry)
        }
        fn append_audit_row(&self, row: &AuditRow) -> Result<bool, PipelineError> {
            self.inner.append_audit_row(row)
        }
        fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, PipelineError> {
            self.inner.query(filter)
        }
    }

    #[test]
    fn test_conflict_is_retried() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            conflicts_left: AtomicU32::new(2),
        });
        let engine = UpsertEngine::new(store, None);

        let outcome = engine
            .upsert(&create_test_extraction(&[("20530", "885.50")]), "recibo.pdf")
            .unwrap();
        assert!(outcome.created);
    }

    #[test]
    fn test_conflict_retries_are_bounded() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            conflicts_left: AtomicU32::new(u32::MAX),
        });
        let engine = UpsertEngine::new(store, None);

        let err = engine
            .upsert(&create_test_extraction(&[("20530", "885.50")]), "recibo.pdf")
            .unwrap_err();
        assert!(matches!(err, PipelineError::StorageConflict(_)));
    }

    #[test]
    fn test_merge_codes_snapshot_does_not_rewrite_audit() {
        let (store, engine) = engine();

        engine
            .upsert(&create_test_extraction(&[("20530", "885.50")]), "a.pdf")
            .unwrap();
        engine
            .upsert(&create_test_extraction(&[("20530", "999.99")]), "b.pdf")
            .unwrap();

        // Second submission merged the entry but the audit row for the key
        // was already taken by the first
        let row = AuditRow {
            fecha: Utc::now(),
            archivo: "c.pdf".to_string(),
            legajo: "123".to_string(),
            periodo: "09/2025".to_string(),
            codigos: BTreeMap::new(),
        };
        assert!(!store.append_audit_row(&row).unwrap());
    }
}
