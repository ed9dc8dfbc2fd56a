// Append-only CSV audit trail.
// One row per unique (legajo, periodo) ever submitted, first-write-wins,
// intentionally decoupled from the mutable ledger entries. Column order is
// fixed: fecha, archivo, legajo, periodo, codigos_json.

use crate::error::PipelineError;
use crate::store::{audit_key, AuditRow};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const HEADERS: [&str; 5] = ["fecha", "archivo", "legajo", "periodo", "codigos_json"];

pub struct CsvAuditLedger {
    path: PathBuf,
    /// Keys already present in the file, loaded once at open
    seen: Mutex<HashSet<String>>,
}

impl CsvAuditLedger {
    /// Open (or create) the ledger file and index its existing keys.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let path = path.as_ref().to_path_buf();
        let mut seen = HashSet::new();

        if path.exists() {
            let mut reader = csv::Reader::from_path(&path).map_err(PipelineError::storage)?;
            for record in reader.records() {
                let record = record.map_err(PipelineError::storage)?;
                let legajo = record.get(2).unwrap_or("");
                let periodo = record.get(3).unwrap_or("");
                seen.insert(audit_key(legajo, periodo));
            }
        } else {
            let mut writer = csv::Writer::from_path(&path).map_err(PipelineError::storage)?;
            writer.write_record(HEADERS).map_err(PipelineError::storage)?;
            writer.flush().map_err(PipelineError::storage)?;
        }

        Ok(CsvAuditLedger {
            path,
            seen: Mutex::new(seen),
        })
    }

    /// Append a row unless its key was already written. Returns whether the
    /// row was appended. Quoting follows RFC 4180: fields holding commas,
    /// quotes or newlines are double-quoted with embedded quotes doubled
    /// (the csv crate's default).
    pub fn append(&self, row: &AuditRow) -> Result<bool, PipelineError> {
        let mut seen = self.seen.lock().unwrap();
        if seen.contains(&row.clave()) {
            return Ok(false);
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(PipelineError::storage)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer
            .write_record([
                row.fecha.to_rfc3339().as_str(),
                row.archivo.as_str(),
                row.legajo.as_str(),
                row.periodo.as_str(),
                row.codigos_json().as_str(),
            ])
            .map_err(PipelineError::storage)?;
        writer.flush().map_err(PipelineError::storage)?;

        seen.insert(row.clave());
        Ok(true)
    }

    pub fn row_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn create_test_row(legajo: &str, periodo: &str, archivo: &str) -> AuditRow {
        AuditRow {
            fecha: Utc::now(),
            archivo: archivo.to_string(),
            legajo: legajo.to_string(),
            periodo: periodo.to_string(),
            codigos: BTreeMap::from([("20530".to_string(), "885.50".to_string())]),
        }
    }

    #[test]
    fn test_append_writes_header_and_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auditoria.csv");

        let ledger = CsvAuditLedger::open(&path).unwrap();
        assert!(ledger.append(&create_test_row("123", "09/2025", "recibo.pdf")).unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("fecha,archivo,legajo,periodo,codigos_json"));
        let row = lines.next().unwrap();
        assert!(row.contains("recibo.pdf"));
        assert!(row.contains("123"));
        // codigos_json carries commas and quotes, so it must arrive quoted
        assert!(row.contains("\"{\"\"20530\"\":\"\"885.50\"\"}\""));
    }

    #[test]
    fn test_first_write_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auditoria.csv");

        let ledger = CsvAuditLedger::open(&path).unwrap();
        assert!(ledger.append(&create_test_row("123", "09/2025", "recibo.pdf")).unwrap());
        // Same key, different file: still a no-op
        assert!(!ledger.append(&create_test_row("123", "09/2025", "recibo_v2.pdf")).unwrap());
        assert_eq!(ledger.row_count(), 1);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!content.contains("recibo_v2.pdf"));
    }

    #[test]
    fn test_dedup_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auditoria.csv");

        {
            let ledger = CsvAuditLedger::open(&path).unwrap();
            ledger.append(&create_test_row("123", "09/2025", "recibo.pdf")).unwrap();
        }

        let ledger = CsvAuditLedger::open(&path).unwrap();
        assert_eq!(ledger.row_count(), 1);
        assert!(!ledger.append(&create_test_row("123", "09/2025", "recibo.pdf")).unwrap());
        assert!(ledger.append(&create_test_row("456", "09/2025", "otro.pdf")).unwrap());
    }
}
