// Ledger storage layer.
// One LedgerEntry per (legajo, periodo) key plus a decoupled first-write-wins
// audit table. Callers receive the backend through the LedgerStore trait,
// chosen once at construction; there is no runtime backend switching.

use crate::classify::CompanyId;
use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;

// ============================================================================
// LEDGER TYPES
// ============================================================================

/// Composite key for a consolidated receipt. The company only joins the key
/// when the caller provides one, to disambiguate legajo collisions across
/// payers.
pub fn ledger_key(company: CompanyId, legajo: &str, periodo: &str) -> String {
    match company {
        CompanyId::Unknown => format!("{}|{}", legajo, periodo),
        c => format!("{}|{}|{}", c.code(), legajo, periodo),
    }
}

/// Audit rows ignore the company: one row ever per (legajo, periodo).
pub fn audit_key(legajo: &str, periodo: &str) -> String {
    format!("{}|{}", legajo, periodo)
}

/// Consolidated record, the durable unit of truth. One per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: String,
    pub company: CompanyId,
    pub legajo: String,
    pub periodo: String,
    pub nombre: Option<String>,

    /// Contributing filenames, insertion order kept, duplicates suppressed
    pub source_files: Vec<String>,

    /// codigo -> valor decimal, merged across contributing extractions
    pub fields: BTreeMap<String, String>,

    /// Optimistic-concurrency token owned by the store. 0 means "not yet
    /// persisted"; callers never fabricate other values.
    #[serde(default)]
    pub version: i64,

    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record: the codes snapshot at first submission of a
/// key. Later submissions for the same key never touch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub fecha: DateTime<Utc>,
    pub archivo: String,
    pub legajo: String,
    pub periodo: String,
    pub codigos: BTreeMap<String, String>,
}

impl AuditRow {
    pub fn clave(&self) -> String {
        audit_key(&self.legajo, &self.periodo)
    }

    pub fn codigos_json(&self) -> String {
        serde_json::to_string(&self.codigos).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub company: Option<CompanyId>,
    pub periodo: Option<String>,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Capability set of the relational/document store. Implemented by the
/// SQLite adapter and the in-memory adapter; callers depend on the trait,
/// never on a concrete backend.
pub trait LedgerStore: Send + Sync {
    fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>, PipelineError>;

    /// Upsert with optimistic concurrency: `entry.version` must equal the
    /// stored version (0 for a brand-new key). A mismatch, including a
    /// concurrent insert of the same key, is a `StorageConflict`.
    fn put_entry(&self, entry: &LedgerEntry) -> Result<(), PipelineError>;

    /// First-write-wins: returns false when a row for the same
    /// (legajo, periodo) already exists.
    fn append_audit_row(&self, row: &AuditRow) -> Result<bool, PipelineError>;

    fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, PipelineError>;
}

// ============================================================================
// SQLITE ADAPTER
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let conn = Connection::open(path).map_err(PipelineError::storage)?;
        Self::setup(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory().map_err(PipelineError::storage)?;
        Self::setup(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn setup(conn: &Connection) -> Result<(), PipelineError> {
        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(PipelineError::storage)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS recibos (
                key TEXT PRIMARY KEY,
                empresa TEXT NOT NULL,
                legajo TEXT NOT NULL,
                periodo TEXT NOT NULL,
                nombre TEXT,
                source_files TEXT NOT NULL,
                fields TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(PipelineError::storage)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auditoria (
                clave TEXT PRIMARY KEY,
                fecha TEXT NOT NULL,
                archivo TEXT NOT NULL,
                legajo TEXT NOT NULL,
                periodo TEXT NOT NULL,
                codigos TEXT NOT NULL
            )",
            [],
        )
        .map_err(PipelineError::storage)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recibos_periodo ON recibos(periodo)",
            [],
        )
        .map_err(PipelineError::storage)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_recibos_empresa ON recibos(empresa)",
            [],
        )
        .map_err(PipelineError::storage)?;

        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
        let empresa: String = row.get(1)?;
        let source_files_json: String = row.get(5)?;
        let fields_json: String = row.get(6)?;
        let updated_at_str: String = row.get(8)?;

        Ok(LedgerEntry {
            key: row.get(0)?,
            company: CompanyId::from_code(&empresa),
            legajo: row.get(2)?,
            periodo: row.get(3)?,
            nombre: row.get(4)?,
            source_files: serde_json::from_str(&source_files_json).unwrap_or_default(),
            fields: serde_json::from_str(&fields_json).unwrap_or_default(),
            version: row.get(7)?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

impl LedgerStore for SqliteStore {
    fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>, PipelineError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT key, empresa, legajo, periodo, nombre, source_files, fields, version, updated_at
                 FROM recibos WHERE key = ?1",
            )
            .map_err(PipelineError::storage)?;

        let mut rows = stmt
            .query_map(params![key], Self::row_to_entry)
            .map_err(PipelineError::storage)?;

        match rows.next() {
            Some(row) => Ok(Some(row.map_err(PipelineError::storage)?)),
            None => Ok(None),
        }
    }

    fn put_entry(&self, entry: &LedgerEntry) -> Result<(), PipelineError> {
        let conn = self.conn.lock().unwrap();
        let source_files_json =
            serde_json::to_string(&entry.source_files).map_err(PipelineError::storage)?;
        let fields_json =
            serde_json::to_string(&entry.fields).map_err(PipelineError::storage)?;
        let updated_at = Utc::now().to_rfc3339();

        if entry.version == 0 {
            let result = conn.execute(
                "INSERT INTO recibos (key, empresa, legajo, periodo, nombre, source_files, fields, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)",
                params![
                    entry.key,
                    entry.company.code(),
                    entry.legajo,
                    entry.periodo,
                    entry.nombre,
                    source_files_json,
                    fields_json,
                    updated_at,
                ],
            );

            return match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // Another writer created the key first
                    Err(PipelineError::StorageConflict(entry.key.clone()))
                }
                Err(e) => Err(PipelineError::storage(e)),
            };
        }

        let changed = conn
            .execute(
                "UPDATE recibos
                 SET empresa = ?2, legajo = ?3, periodo = ?4, nombre = ?5,
                     source_files = ?6, fields = ?7, version = version + 1, updated_at = ?8
                 WHERE key = ?1 AND version = ?9",
                params![
                    entry.key,
                    entry.company.code(),
                    entry.legajo,
                    entry.periodo,
                    entry.nombre,
                    source_files_json,
                    fields_json,
                    updated_at,
                    entry.version,
                ],
            )
            .map_err(PipelineError::storage)?;

        if changed == 0 {
            return Err(PipelineError::StorageConflict(entry.key.clone()));
        }
        Ok(())
    }

    fn append_audit_row(&self, row: &AuditRow) -> Result<bool, PipelineError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.execute(
            "INSERT INTO auditoria (clave, fecha, archivo, legajo, periodo, codigos)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.clave(),
                row.fecha.to_rfc3339(),
                row.archivo,
                row.legajo,
                row.periodo,
                row.codigos_json(),
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(e) => Err(PipelineError::storage(e)),
        }
    }

    fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, PipelineError> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT key, empresa, legajo, periodo, nombre, source_files, fields, version, updated_at
             FROM recibos",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(company) = filter.company {
            clauses.push("empresa = ?");
            values.push(company.code().to_string());
        }
        if let Some(periodo) = &filter.periodo {
            clauses.push("periodo = ?");
            values.push(periodo.clone());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = conn.prepare(&sql).map_err(PipelineError::storage)?;
        let entries = stmt
            .query_map(params_from_iter(values.iter()), Self::row_to_entry)
            .map_err(PipelineError::storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(PipelineError::storage)?;

        Ok(entries)
    }
}

// ============================================================================
// IN-MEMORY ADAPTER
// ============================================================================

/// HashMap-backed store with the same version discipline as SQLite.
/// Used by engine tests and as the second configurable backend.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, LedgerEntry>>,
    audit: Mutex<HashMap<String, AuditRow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl LedgerStore for MemoryStore {
    fn get_entry(&self, key: &str) -> Result<Option<LedgerEntry>, PipelineError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn put_entry(&self, entry: &LedgerEntry) -> Result<(), PipelineError> {
        let mut entries = self.entries.lock().unwrap();

        let current_version = entries.get(&entry.key).map(|e| e.version).unwrap_or(0);
        if current_version != entry.version {
            return Err(PipelineError::StorageConflict(entry.key.clone()));
        }

        let mut stored = entry.clone();
        stored.version = entry.version + 1;
        stored.updated_at = Utc::now();
        entries.insert(entry.key.clone(), stored);
        Ok(())
    }

    fn append_audit_row(&self, row: &AuditRow) -> Result<bool, PipelineError> {
        let mut audit = self.audit.lock().unwrap();
        if audit.contains_key(&row.clave()) {
            return Ok(false);
        }
        audit.insert(row.clave(), row.clone());
        Ok(true)
    }

    fn query(&self, filter: &LedgerFilter) -> Result<Vec<LedgerEntry>, PipelineError> {
        let entries = self.entries.lock().unwrap();
        let mut matched: Vec<LedgerEntry> = entries
            .values()
            .filter(|e| {
                filter.company.map_or(true, |c| e.company == c)
                    && filter.periodo.as_ref().map_or(true, |p| &e.periodo == p)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(matched)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry(key: &str, legajo: &str, periodo: &str) -> LedgerEntry {
        LedgerEntry {
            key: key.to_string(),
            company: CompanyId::Sumar,
            legajo: legajo.to_string(),
            periodo: periodo.to_string(),
            nombre: Some("PEREZ JUAN".to_string()),
            source_files: vec!["recibo.pdf".to_string()],
            fields: BTreeMap::from([("20530".to_string(), "885.50".to_string())]),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    fn create_test_audit(legajo: &str, periodo: &str) -> AuditRow {
        AuditRow {
            fecha: Utc::now(),
            archivo: "recibo.pdf".to_string(),
            legajo: legajo.to_string(),
            periodo: periodo.to_string(),
            codigos: BTreeMap::from([("20530".to_string(), "885.50".to_string())]),
        }
    }

    #[test]
    fn test_ledger_key_with_and_without_company() {
        assert_eq!(ledger_key(CompanyId::Sumar, "123", "09/2025"), "sumar|123|09/2025");
        assert_eq!(ledger_key(CompanyId::Unknown, "123", "09/2025"), "123|09/2025");
    }

    fn exercise_store(store: &dyn LedgerStore) {
        let key = "sumar|123|09/2025";

        // Create
        let entry = create_test_entry(key, "123", "09/2025");
        store.put_entry(&entry).unwrap();

        let stored = store.get_entry(key).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.fields.get("20530"), Some(&"885.50".to_string()));

        // Stale write loses
        let stale = create_test_entry(key, "123", "09/2025");
        let err = store.put_entry(&stale).unwrap_err();
        assert!(matches!(err, PipelineError::StorageConflict(_)));

        // Fresh read-modify-write wins
        let mut fresh = store.get_entry(key).unwrap().unwrap();
        fresh.fields.insert("20510".to_string(), "1250.00".to_string());
        store.put_entry(&fresh).unwrap();

        let stored = store.get_entry(key).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.fields.len(), 2);

        // Audit is first-write-wins
        assert!(store.append_audit_row(&create_test_audit("123", "09/2025")).unwrap());
        assert!(!store.append_audit_row(&create_test_audit("123", "09/2025")).unwrap());

        // Query by periodo
        let all = store.query(&LedgerFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        let none = store
            .query(&LedgerFilter {
                periodo: Some("10/2025".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_memory_store_semantics() {
        exercise_store(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store_semantics() {
        exercise_store(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("recibos.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store
                .put_entry(&create_test_entry("123|09/2025", "123", "09/2025"))
                .unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let entry = store.get_entry("123|09/2025").unwrap().unwrap();
        assert_eq!(entry.legajo, "123");
        assert_eq!(entry.source_files, vec!["recibo.pdf".to_string()]);
    }
}
