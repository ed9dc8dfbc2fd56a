// 🏢 Company Classifier - Which payer issued this receipt?
// Primary signal is the filename; document text is the coarser fallback.

use crate::normalize::{normalize, strip_separators};
use serde::{Deserialize, Serialize};

// ============================================================================
// COMPANY IDENTITY
// ============================================================================

/// The fixed set of payer identities receipts can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompanyId {
    Tysa,
    Serlim,
    Sumar,
    Ecovial,
    Unknown,
}

impl CompanyId {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            CompanyId::Tysa => "T.Y.S.A.",
            CompanyId::Serlim => "Serlim",
            CompanyId::Sumar => "Sumar",
            CompanyId::Ecovial => "Ecovial",
            CompanyId::Unknown => "Desconocida",
        }
    }

    /// Short code for keys and persistence
    pub fn code(&self) -> &str {
        match self {
            CompanyId::Tysa => "tysa",
            CompanyId::Serlim => "serlim",
            CompanyId::Sumar => "sumar",
            CompanyId::Ecovial => "ecovial",
            CompanyId::Unknown => "unknown",
        }
    }

    pub fn from_code(code: &str) -> CompanyId {
        match code {
            "tysa" => CompanyId::Tysa,
            "serlim" => CompanyId::Serlim,
            "sumar" => CompanyId::Sumar,
            "ecovial" => CompanyId::Ecovial,
            _ => CompanyId::Unknown,
        }
    }
}

/// Classification outcome. Never an error: no signal at all yields
/// `Unknown` with confidence 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub company: CompanyId,
    pub confidence: f64,
    pub matched_tokens: Vec<String>,
}

impl Classification {
    fn unknown() -> Self {
        Classification {
            company: CompanyId::Unknown,
            confidence: 0.0,
            matched_tokens: Vec::new(),
        }
    }
}

// ============================================================================
// TOKEN TABLES
// ============================================================================

/// Filename tokens per company, matched after separator stripping so that
/// "t.y.s.a" / "t_y_s_a" / "TYSA" all land on the same token.
const FILENAME_TOKENS: &[(CompanyId, &[&str])] = &[
    (CompanyId::Tysa, &["tysa", "tys"]),
    (CompanyId::Serlim, &["serlim", "slm"]),
    (CompanyId::Sumar, &["sumar"]),
    (CompanyId::Ecovial, &["ecovial", "ecv"]),
];

/// Fallback rules over document text: a phrase unique to one payer, plus an
/// optional phrase whose presence would point at a different payer instead.
struct TextRule {
    company: CompanyId,
    present: &'static str,
    absent: Option<&'static str>,
}

const TEXT_RULES: &[TextRule] = &[
    TextRule {
        company: CompanyId::Tysa,
        present: "transportes y servicios",
        absent: None,
    },
    TextRule {
        company: CompanyId::Serlim,
        present: "servicios de limpieza",
        // Sumar receipts quote the same line inside the CCT reference
        absent: Some("sumar servicios"),
    },
    TextRule {
        company: CompanyId::Sumar,
        present: "sumar servicios",
        absent: None,
    },
    TextRule {
        company: CompanyId::Ecovial,
        present: "ecovial s.a",
        absent: None,
    },
];

// ============================================================================
// CLASSIFIER
// ============================================================================

#[derive(Debug, Default)]
pub struct Classifier;

impl Classifier {
    pub fn new() -> Self {
        Classifier
    }

    /// Classify a receipt by filename, falling back to document text when
    /// the filename carries no known token.
    ///
    /// Scoring: tokens of 4+ chars score 0.95, shorter ones 0.8. The
    /// highest score wins; ties keep the first match found. Text-rule
    /// matches score 0.6 (coarser signal).
    pub fn classify(&self, filename: &str, document_text: Option<&str>) -> Classification {
        if let Some(result) = self.classify_filename(filename) {
            return result;
        }

        if let Some(text) = document_text {
            if let Some(result) = self.classify_text(text) {
                return result;
            }
        }

        Classification::unknown()
    }

    fn classify_filename(&self, filename: &str) -> Option<Classification> {
        let haystack = strip_separators(&normalize(filename)).to_lowercase();

        let mut best: Option<(CompanyId, f64, String)> = None;

        for (company, tokens) in FILENAME_TOKENS {
            for token in *tokens {
                if !haystack.contains(token) {
                    continue;
                }
                let score = if token.len() >= 4 { 0.95 } else { 0.8 };
                let better = match &best {
                    Some((_, best_score, _)) => score > *best_score,
                    None => true,
                };
                if better {
                    best = Some((*company, score, token.to_string()));
                }
            }
        }

        best.map(|(company, confidence, token)| Classification {
            company,
            confidence,
            matched_tokens: vec![token],
        })
    }

    fn classify_text(&self, text: &str) -> Option<Classification> {
        let haystack = normalize(text).to_lowercase();

        for rule in TEXT_RULES {
            if !haystack.contains(rule.present) {
                continue;
            }
            if let Some(veto) = rule.absent {
                if haystack.contains(veto) {
                    continue;
                }
            }
            return Some(Classification {
                company: rule.company,
                confidence: 0.6,
                matched_tokens: vec![rule.present.to_string()],
            });
        }

        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sumar_filename() {
        let classifier = Classifier::new();
        let result = classifier.classify("SUMAR_recibos sueldos 09.2025.pdf", None);

        assert_eq!(result.company, CompanyId::Sumar);
        assert!(result.confidence >= 0.8);
        assert_eq!(result.matched_tokens, vec!["sumar".to_string()]);
    }

    #[test]
    fn test_classify_tysa_dotted_variant() {
        let classifier = Classifier::new();

        for name in ["t.y.s.a recibos 03-2025.pdf", "t_y_s_a_marzo.pdf", "TYSA-2025.pdf"] {
            let result = classifier.classify(name, None);
            assert_eq!(result.company, CompanyId::Tysa, "failed for {}", name);
            assert_eq!(result.confidence, 0.95);
        }
    }

    #[test]
    fn test_short_token_scores_lower() {
        let classifier = Classifier::new();
        let result = classifier.classify("recibos_ecv_09.pdf", None);

        assert_eq!(result.company, CompanyId::Ecovial);
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn test_longer_token_wins() {
        // Both "ecv" and "ecovial" appear; the longer token's score wins.
        let classifier = Classifier::new();
        let result = classifier.classify("ecv_ecovial_09.pdf", None);

        assert_eq!(result.company, CompanyId::Ecovial);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.matched_tokens, vec!["ecovial".to_string()]);
    }

    #[test]
    fn test_text_fallback() {
        let classifier = Classifier::new();
        let text = "RECIBO DE HABERES\nSUMAR SERVICIOS S.A.\nLegajo 123";
        let result = classifier.classify("recibo_sin_marca.pdf", Some(text));

        assert_eq!(result.company, CompanyId::Sumar);
        assert_eq!(result.confidence, 0.6);
    }

    #[test]
    fn test_text_rule_veto() {
        // "servicios de limpieza" alone points at Serlim, but the presence
        // of "sumar servicios" vetoes that rule.
        let classifier = Classifier::new();
        let text = "SUMAR SERVICIOS S.A.\nservicios de limpieza integral";
        let result = classifier.classify("recibo.pdf", Some(text));

        assert_eq!(result.company, CompanyId::Sumar);
    }

    #[test]
    fn test_no_match_is_unknown() {
        let classifier = Classifier::new();
        let result = classifier.classify("recibo.pdf", Some("texto sin marcas"));

        assert_eq!(result.company, CompanyId::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert!(result.matched_tokens.is_empty());
    }

    #[test]
    fn test_classifier_is_deterministic() {
        let classifier = Classifier::new();
        let a = classifier.classify("SUMAR_recibos.pdf", Some("texto"));
        let b = classifier.classify("SUMAR_recibos.pdf", Some("texto"));

        assert_eq!(a.company, b.company);
        assert_eq!(a.confidence, b.confidence);
        assert_eq!(a.matched_tokens, b.matched_tokens);
    }

    #[test]
    fn test_company_code_round_trip() {
        for c in [CompanyId::Tysa, CompanyId::Serlim, CompanyId::Sumar, CompanyId::Ecovial] {
            assert_eq!(CompanyId::from_code(c.code()), c);
        }
        assert_eq!(CompanyId::from_code("otra"), CompanyId::Unknown);
    }
}
