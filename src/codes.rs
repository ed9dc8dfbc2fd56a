// 🏷️ Payroll Code Registry - Codes as Data
// The set of payroll line codes and their label synonyms lives in a table,
// not scattered through the extraction logic. The builtin table covers the
// codes seen on current receipts; a JSON file can replace it per deployment.

use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// CODE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeDef {
    /// Fixed-format 5-digit payroll line code ("20530")
    pub code: String,

    /// Canonical human name for the code
    pub label: String,

    /// Label variants as they appear on receipts, matched case- and
    /// accent-insensitively over normalized text. The raw code itself is
    /// always accepted as an alias.
    pub synonyms: Vec<String>,
}

impl CodeDef {
    fn new(code: &str, label: &str, synonyms: &[&str]) -> Self {
        CodeDef {
            code: code.to_string(),
            label: label.to_string(),
            synonyms: synonyms.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone)]
pub struct CodeRegistry {
    defs: Vec<CodeDef>,
}

impl CodeRegistry {
    /// Registry with the builtin code table.
    ///
    /// The enumeration mirrors the deduction lines on current receipts.
    /// TODO: confirm the full code list with payroll before relying on it
    /// for companies beyond the four known payers.
    pub fn builtin() -> Self {
        CodeRegistry {
            defs: vec![
                CodeDef::new(
                    "20510",
                    "Cuota Sindical",
                    &["cuota sindical", "aporte sindical", "cuota sind"],
                ),
                CodeDef::new(
                    "20530",
                    "Contribución Solidaria",
                    &["contrib.solidaria", "contrib solidaria", "contribucion solidaria"],
                ),
                CodeDef::new(
                    "20610",
                    "Seguro de Sepelio",
                    &["seguro sepelio", "seguro de sepelio", "sepelio"],
                ),
                CodeDef::new(
                    "20710",
                    "Aporte Mutual",
                    &["aporte mutual", "mutual"],
                ),
                CodeDef::new(
                    "20810",
                    "Fondo Compensador",
                    &["fondo compensador", "fdo compensador", "fdo.compensador"],
                ),
            ],
        }
    }

    /// Load a replacement code table from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read code table: {:?}", path.as_ref()))?;

        let defs: Vec<CodeDef> =
            serde_json::from_str(&content).context("Failed to parse code table JSON")?;

        Ok(CodeRegistry { defs })
    }

    pub fn defs(&self) -> &[CodeDef] {
        &self.defs
    }

    pub fn is_known(&self, code: &str) -> bool {
        self.defs.iter().any(|d| d.code == code)
    }

    /// Canonical label for a code. Unknown codes keep their literal code
    /// string as the label (forward-compatibility bucket).
    pub fn label_for(&self, code: &str) -> String {
        self.defs
            .iter()
            .find(|d| d.code == code)
            .map(|d| d.label.clone())
            .unwrap_or_else(|| code.to_string())
    }

    pub fn code_count(&self) -> usize {
        self.defs.len()
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// TESTS
// ============================================================================
