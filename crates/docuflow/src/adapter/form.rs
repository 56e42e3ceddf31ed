//! Form parser — labeled `key: value` documents and single-record CSV
//! exports. The workhorse for financial statement forms.

use serde_json::Value;

use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

use super::{csv_pairs, decode_text, labeled_lines, parse_scalar, Extraction, ExtractionAdapter};

const LABELED_CONFIDENCE: f64 = 0.95;
const CSV_CONFIDENCE: f64 = 0.9;

pub struct FormParserAdapter;

impl FormParserAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FormParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionAdapter for FormParserAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::FormParser
    }

    fn extract(&self, bytes: &[u8], _doc_type: DocType) -> Result<Extraction, AdapterError> {
        let text = decode_text(bytes)?;
        let mut extraction = Extraction::new(ProcessorKind::FormParser);

        if let Some(pairs) = csv_pairs(&text) {
            for (key, raw) in pairs {
                extraction.insert(&key, parse_scalar(&raw), CSV_CONFIDENCE);
            }
            return Ok(extraction);
        }

        for (key, raw) in labeled_lines(&text) {
            let value = parse_scalar(&raw);
            // Numeric and date values on labeled lines are unambiguous;
            // free-text values are slightly less so.
            let confidence = match value {
                Value::String(ref s) if super::normalize_date(s).is_none() => {
                    LABELED_CONFIDENCE - 0.07
                }
                _ => LABELED_CONFIDENCE,
            };
            extraction.insert(&key, value, confidence);
        }

        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Extraction {
        FormParserAdapter::new()
            .extract(text.as_bytes(), DocType::MonthlyFinancials)
            .unwrap()
    }

    #[test]
    fn test_labeled_form() {
        let extraction = extract(
            "Period End Date: 2026-03-31\n\
             Revenue: $1,250,000\n\
             Gross Profit: $400,000\n\
             EBITDA: 150000\n",
        );
        assert_eq!(
            extraction.fields.get("period_end_date"),
            Some(&serde_json::json!("2026-03-31"))
        );
        assert_eq!(
            extraction.fields.get("revenue"),
            Some(&serde_json::json!(1_250_000.0))
        );
        assert_eq!(extraction.confidences["revenue"], 0.95);
        assert_eq!(extraction.processor, ProcessorKind::FormParser);
    }

    #[test]
    fn test_csv_record() {
        let extraction = extract("period_end_date,revenue\n2026-03-31,1000000\n");
        assert_eq!(
            extraction.fields.get("revenue"),
            Some(&serde_json::json!(1_000_000.0))
        );
        assert_eq!(extraction.confidences["revenue"], 0.9);
    }

    #[test]
    fn test_free_text_value_scores_lower() {
        let extraction = extract("Prepared By: Jane Smith\nRevenue: 1000\n");
        assert!(extraction.confidences["prepared_by"] < extraction.confidences["revenue"]);
    }

    #[test]
    fn test_prose_document_yields_empty_extraction() {
        let extraction = extract("This quarterly letter discusses portfolio performance.\n");
        assert!(extraction.is_empty());
    }

    #[test]
    fn test_empty_payload_is_permanent_failure() {
        let result = FormParserAdapter::new().extract(b"", DocType::MonthlyFinancials);
        assert!(matches!(result, Err(AdapterError::Permanent(_))));
    }
}
