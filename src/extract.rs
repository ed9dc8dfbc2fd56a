// 🧾 Field Extractor - Structured payroll fields from raw receipt text
// Label-anchored proximity search over normalized lines. Every field is
// best-effort: malformed or empty text yields an empty result, never an
// error, and the same input always yields the same output.

use crate::classify::CompanyId;
use crate::codes::CodeRegistry;
use crate::money::{format_centavos, parse_amount, Centavos};
use crate::normalize::{normalize, uppercase_run_len};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// EXTRACTION RESULT
// ============================================================================

/// One extraction per parsed document. Folded into the ledger by the
/// upsert engine and then discarded; never persisted standalone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Payer identity, assigned by the classifier
    pub company: CompanyId,

    /// Employee file number ("legajo"), digits only
    pub legajo: Option<String>,

    /// Pay period in MM/YYYY form
    pub periodo: Option<String>,

    /// Employee name, best-effort
    pub nombre: Option<String>,

    /// Payroll code -> decimal value with two fraction digits.
    /// Absent codes are omitted entirely, never defaulted to "0.00".
    pub codes: BTreeMap<String, String>,
}

impl ExtractionResult {
    pub fn empty() -> Self {
        ExtractionResult {
            company: CompanyId::Unknown,
            legajo: None,
            periodo: None,
            nombre: None,
            codes: BTreeMap::new(),
        }
    }

    /// True when the upsert key (legajo + periodo) can be formed.
    pub fn has_identifiers(&self) -> bool {
        self.legajo.is_some() && self.periodo.is_some()
    }
}

// ============================================================================
// EXTRACTOR
// ============================================================================

pub struct Extractor {
    registry: CodeRegistry,
    re_legajo: Regex,
    re_periodo: Regex,
    re_amount: Regex,
    re_code_line: Regex,
}

impl Extractor {
    pub fn new(registry: CodeRegistry) -> Self {
        Extractor {
            registry,
            // "Legajo 1234", "LEG. Nº 1234", "legajo: 1234"
            re_legajo: Regex::new(r"(?i)leg(?:ajo)?[^0-9\r\n]{0,12}(\d{3,})").unwrap(),
            re_periodo: Regex::new(r"\b(\d{1,2})/(\d{4})\b").unwrap(),
            re_amount: Regex::new(r"-?\d+(?:[.,]\d+)*").unwrap(),
            // Lines that open with a bare 5-digit line code
            re_code_line: Regex::new(r"^(\d{5})\b").unwrap(),
        }
    }

    /// Extract all fields from raw receipt text.
    pub fn extract(&self, raw_text: &str) -> ExtractionResult {
        let lines: Vec<String> = raw_text
            .lines()
            .map(normalize)
            .filter(|l| !l.is_empty())
            .collect();

        let mut result = ExtractionResult::empty();
        if lines.is_empty() {
            return result;
        }

        let full_text = lines.join("\n");

        result.legajo = self.extract_legajo(&full_text);
        result.periodo = self.extract_periodo(&full_text);
        result.nombre = self.extract_nombre(&lines);
        result.codes = self.extract_codes(&lines);

        result
    }

    /// Employee file number: label followed by 3+ digits, first match wins.
    fn extract_legajo(&self, text: &str) -> Option<String> {
        self.re_legajo
            .captures(text)
            .map(|c| c[1].to_string())
    }

    /// Pay period: first M/YYYY or MM/YYYY token with a real month,
    /// normalized to MM/YYYY.
    fn extract_periodo(&self, text: &str) -> Option<String> {
        for cap in self.re_periodo.captures_iter(text) {
            let month: u32 = match cap[1].parse() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if (1..=12).contains(&month) {
                return Some(format!("{:02}/{}", month, &cap[2]));
            }
        }
        None
    }

    /// Employee name: the line right before the CUIL/CUIT line, when it
    /// carries a run of 3+ uppercase letters. Fallback: first short line
    /// (5 words or fewer) with such a run.
    fn extract_nombre(&self, lines: &[String]) -> Option<String> {
        let cuil_idx = lines.iter().position(|l| {
            let h = l.to_lowercase();
            h.contains("cuil") || h.contains("cuit")
        });

        if let Some(i) = cuil_idx {
            if i > 0 && uppercase_run_len(&lines[i - 1]) >= 3 {
                return Some(lines[i - 1].clone());
            }
        }

        lines
            .iter()
            .find(|l| l.split_whitespace().count() <= 5 && uppercase_run_len(l) >= 3)
            .cloned()
    }

    /// Payroll codes: for each registry entry, scan for the first line
    /// matching any synonym (or the raw code), then pull the amount from
    /// the remainder of that line, or from the next line.
    fn extract_codes(&self, lines: &[String]) -> BTreeMap<String, String> {
        let mut codes = BTreeMap::new();

        for def in self.registry.defs() {
            let mut aliases: Vec<String> =
                def.synonyms.iter().map(|s| s.to_lowercase()).collect();
            aliases.push(def.code.clone());

            'scan: for (i, line) in lines.iter().enumerate() {
                let hay = line.to_lowercase();
                for alias in &aliases {
                    let pos = match hay.find(alias.as_str()) {
                        Some(p) => p,
                        None => continue,
                    };

                    let after = &hay[pos + alias.len()..];
                    let cents = self
                        .pick_amount(after)
                        .or_else(|| lines.get(i + 1).and_then(|l| self.pick_amount(l)));

                    if let Some(c) = cents {
                        codes.insert(def.code.clone(), format_centavos(c));
                    }
                    // First label occurrence decides; absent amount means
                    // the field stays omitted.
                    break 'scan;
                }
            }
        }

        // Unknown-code bucket: lines opening with a bare 5-digit code that
        // the registry does not know yet.
        for (i, line) in lines.iter().enumerate() {
            let cap = match self.re_code_line.captures(line) {
                Some(c) => c,
                None => continue,
            };
            let code_match = match cap.get(1) {
                Some(m) => m,
                None => continue,
            };
            let code = code_match.as_str();
            if self.registry.is_known(code) || codes.contains_key(code) {
                continue;
            }
            let after = &line[code_match.end()..];
            let cents = self
                .pick_amount(after)
                .or_else(|| lines.get(i + 1).and_then(|l| self.pick_amount(l)));
            if let Some(c) = cents {
                codes.insert(code.to_string(), format_centavos(c));
            }
        }

        codes
    }

    /// Among the numeric tokens on a line, prefer the first with absolute
    /// magnitude >= 100 (filters stray small numbers like page or item
    /// counts); when none qualifies, take the last candidate.
    fn pick_amount(&self, text: &str) -> Option<Centavos> {
        let candidates: Vec<Centavos> = self
            .re_amount
            .find_iter(text)
            .filter_map(|m| parse_amount(m.as_str()))
            .collect();

        candidates
            .iter()
            .find(|c| c.abs() >= 100 * 100)
            .or_else(|| candidates.last())
            .copied()
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor::new(CodeRegistry::builtin())
    }
}

// ============================================================================
// TESTS
// ============================================================================
