// Official reference values, consumed as a codigo -> valor map.
// Parsing the payroll office's spreadsheet itself happens upstream; this
// loader covers the CSV export used by the reconcile CLI and the tests.

use crate::money::{format_centavos, parse_decimal};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Load a two-column `codigo,valor` CSV into the official map. Values are
/// re-formatted to canonical two-fraction-digit form; a malformed value is
/// an error, not a silent zero.
pub fn load_official_map<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .with_context(|| format!("Failed to open official CSV: {:?}", path.as_ref()))?;

    let mut map = BTreeMap::new();

    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {}", idx + 2))?;

        let codigo = record.get(0).unwrap_or("").trim();
        let valor = record.get(1).unwrap_or("").trim();
        if codigo.is_empty() {
            continue;
        }

        let cents = match parse_decimal(valor) {
            Ok(c) => c,
            Err(_) => bail!("valor inválido {:?} para código {} (fila {})", valor, codigo, idx + 2),
        };

        map.insert(codigo.to_string(), format_centavos(cents));
    }

    Ok(map)
}
