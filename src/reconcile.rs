// ⚖️ Reconciliation Engine - Official values vs calculated ledger values
// Pure per-code diff over the union of both maps. Deltas run over integer
// centavos so a comparison never picks up binary floating point noise.

use crate::codes::CodeRegistry;
use crate::error::PipelineError;
use crate::money::{format_centavos, parse_decimal, Centavos};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// DIFF ITEM
// ============================================================================

/// Sign convention of the source system, pending business confirmation:
/// official above calculated reads "a favor", below reads "en contra".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "a favor")]
    AFavor,
    #[serde(rename = "en contra")]
    EnContra,
}

impl Direction {
    pub fn as_str(&self) -> &str {
        match self {
            Direction::AFavor => "a favor",
            Direction::EnContra => "en contra",
        }
    }
}

/// One per-code difference beyond the tolerance. Ephemeral: produced for a
/// report, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
    pub code: String,
    pub label: String,
    pub official: String,
    pub calculated: String,
    /// official - calculated, sign preserved
    pub delta: String,
    pub direction: Direction,
}

/// Reconciliation result for one (legajo, periodo) key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub legajo: String,
    pub periodo: String,
    pub items: Vec<DiffItem>,
    /// Set when no official map was available for the requested key; an
    /// empty `items` then means "nothing to compare", not "all matches".
    pub no_official_data: bool,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct DiffEngine {
    registry: CodeRegistry,

    /// Differences at or below this many centavos are ignored
    pub tolerance: Centavos,
}

impl DiffEngine {
    pub fn new(registry: CodeRegistry, tolerance: Centavos) -> Self {
        DiffEngine {
            registry,
            tolerance,
        }
    }

    /// Parse a decimal-string tolerance ("0.01", "1.00").
    pub fn with_tolerance_str(registry: CodeRegistry, tolerance: &str) -> Result<Self, PipelineError> {
        let cents = parse_decimal(tolerance)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        Ok(Self::new(registry, cents))
    }

    /// Compare the official map against the calculated map.
    ///
    /// Codes present in either map participate; a missing side defaults to
    /// "0.00". A DiffItem is emitted only when `abs(delta)` strictly
    /// exceeds the tolerance. Output is ordered by code ascending so that
    /// reports are snapshot-stable.
    pub fn diff(
        &self,
        official: &BTreeMap<String, String>,
        calculated: &BTreeMap<String, String>,
    ) -> Result<Vec<DiffItem>, PipelineError> {
        let codes: BTreeSet<&String> = official.keys().chain(calculated.keys()).collect();

        let mut items = Vec::new();

        for code in codes {
            let official_cents = Self::value_of(official, code)?;
            let calculated_cents = Self::value_of(calculated, code)?;

            let delta = official_cents - calculated_cents;
            if delta.abs() <= self.tolerance {
                continue;
            }

            items.push(DiffItem {
                code: code.clone(),
                label: self.registry.label_for(code),
                official: format_centavos(official_cents),
                calculated: format_centavos(calculated_cents),
                delta: format_centavos(delta),
                direction: if delta > 0 {
                    Direction::AFavor
                } else {
                    Direction::EnContra
                },
            });
        }

        Ok(items)
    }

    fn value_of(map: &BTreeMap<String, String>, code: &str) -> Result<Centavos, PipelineError> {
        match map.get(code) {
            None => Ok(0),
            Some(raw) => parse_decimal(raw).map_err(|e| {
                PipelineError::Validation(format!("código {}: {}", code, e))
            }),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(c, v)| (c.to_string(), v.to_string()))
            .collect()
    }

    fn engine(tolerance: &str) -> DiffEngine {
        DiffEngine::with_tolerance_str(CodeRegistry::builtin(), tolerance).unwrap()
    }

    #[test]
    fn test_diff_a_favor() {
        let items = engine("1.00")
            .diff(&map(&[("20530", "500.00")]), &map(&[("20530", "450.00")]))
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].code, "20530");
        assert_eq!(items[0].label, "Contribución Solidaria");
        assert_eq!(items[0].delta, "50.00");
        assert_eq!(items[0].direction, Direction::AFavor);
    }

    #[test]
    fn test_diff_en_contra() {
        let items = engine("1.00")
            .diff(&map(&[("20530", "450.00")]), &map(&[("20530", "500.00")]))
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].delta, "-50.00");
        assert_eq!(items[0].direction, Direction::EnContra);
    }

    #[test]
    fn test_tolerance_boundary_is_strict() {
        // Exactly at tolerance: silent
        let items = engine("1.00")
            .diff(&map(&[("20530", "451.00")]), &map(&[("20530", "450.00")]))
            .unwrap();
        assert!(items.is_empty());

        // One centavo beyond: emitted
        let items = engine("1.00")
            .diff(&map(&[("20530", "451.01")]), &map(&[("20530", "450.00")]))
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].delta, "1.01");
    }

    #[test]
    fn test_union_of_keys_defaults_missing_side_to_zero() {
        let items = engine("0.01")
            .diff(
                &map(&[("20530", "500.00")]),
                &map(&[("20510", "1250.00")]),
            )
            .unwrap();

        assert_eq!(items.len(), 2);
        // Ordered by code ascending
        assert_eq!(items[0].code, "20510");
        assert_eq!(items[0].official, "0.00");
        assert_eq!(items[0].delta, "-1250.00");
        assert_eq!(items[0].direction, Direction::EnContra);
        assert_eq!(items[1].code, "20530");
        assert_eq!(items[1].calculated, "0.00");
        assert_eq!(items[1].direction, Direction::AFavor);
    }

    #[test]
    fn test_matching_values_emit_nothing() {
        let items = engine("0.01")
            .diff(&map(&[("20530", "500.00")]), &map(&[("20530", "500.00")]))
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_unknown_code_keeps_literal_label() {
        let items = engine("0.01")
            .diff(&map(&[("77777", "10.00")]), &map(&[]))
            .unwrap();
        assert_eq!(items[0].label, "77777");
    }

    #[test]
    fn test_invalid_value_is_validation_error() {
        let result = engine("0.01").diff(&map(&[("20530", "no-es-numero")]), &map(&[]));
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_diff_is_pure_and_deterministic() {
        let e = engine("1.00");
        let official = map(&[("20530", "500.00"), ("20510", "100.00")]);
        let calculated = map(&[("20530", "450.00")]);

        let a = e.diff(&official, &calculated).unwrap();
        let b = e.diff(&official, &calculated).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.code, y.code);
            assert_eq!(x.delta, y.delta);
        }
    }
}
