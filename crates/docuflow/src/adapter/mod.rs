//! Extraction adapters — capability-typed extractors, each producing a
//! field map with per-field confidence.
//!
//! Adapters are stateless and side-effect-free; retry and timeout policy
//! lives in the processing router. "First adapter in the chain to clear the
//! confidence threshold wins" is implemented as an ordered list of trait
//! objects, not a hierarchy.

pub mod form;
pub mod invoice;
pub mod ocr;

#[cfg(feature = "llm")]
pub mod llm;

#[cfg(not(feature = "llm"))]
pub mod llm_stub;

#[cfg(feature = "llm")]
pub use llm::LlmAssistedAdapter;

#[cfg(not(feature = "llm"))]
pub use llm_stub::LlmAssistedAdapter;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::ProcessingConfig;
use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

/// Extracted field map with per-field confidence in [0, 1].
#[derive(Debug, Clone)]
pub struct Extraction {
    pub fields: Map<String, Value>,
    pub confidences: BTreeMap<String, f64>,
    pub processor: ProcessorKind,
}

impl Extraction {
    pub fn new(processor: ProcessorKind) -> Self {
        Self {
            fields: Map::new(),
            confidences: BTreeMap::new(),
            processor,
        }
    }

    pub fn insert(&mut self, field: &str, value: Value, confidence: f64) {
        self.fields.insert(field.to_string(), value);
        self.confidences
            .insert(field.to_string(), confidence.clamp(0.0, 1.0));
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

pub trait ExtractionAdapter: Send + Sync {
    fn kind(&self) -> ProcessorKind;
    fn extract(&self, bytes: &[u8], doc_type: DocType) -> Result<Extraction, AdapterError>;
}

/// Holds one instance of every extraction capability and selects the
/// ordered chain for a document type.
pub struct AdapterRegistry {
    form: Arc<dyn ExtractionAdapter>,
    invoice: Arc<dyn ExtractionAdapter>,
    ocr: Arc<dyn ExtractionAdapter>,
    llm: Arc<dyn ExtractionAdapter>,
}

impl AdapterRegistry {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            form: Arc::new(form::FormParserAdapter::new()),
            invoice: Arc::new(invoice::InvoiceParserAdapter::new()),
            ocr: Arc::new(ocr::GenericOcrAdapter::new()),
            llm: Arc::new(LlmAssistedAdapter::new(config.llm_endpoint.as_deref())),
        }
    }

    /// Explicit wiring, used for dependency injection in tests and
    /// specialized deployments.
    pub fn new(
        form: Arc<dyn ExtractionAdapter>,
        invoice: Arc<dyn ExtractionAdapter>,
        ocr: Arc<dyn ExtractionAdapter>,
        llm: Arc<dyn ExtractionAdapter>,
    ) -> Self {
        Self {
            form,
            invoice,
            ocr,
            llm,
        }
    }

    /// Ordered adapter chain for the resolved document type. The LLM
    /// fallback always terminates the chain.
    pub fn chain_for(&self, doc_type: DocType) -> Vec<Arc<dyn ExtractionAdapter>> {
        if doc_type.is_invoice_family() {
            vec![Arc::clone(&self.invoice), Arc::clone(&self.llm)]
        } else if matches!(doc_type, DocType::Unknown | DocType::Other) {
            vec![Arc::clone(&self.ocr), Arc::clone(&self.llm)]
        } else {
            vec![Arc::clone(&self.form), Arc::clone(&self.llm)]
        }
    }
}

/// Decodes the document payload as text. Extractor model internals are out
/// of scope; every adapter consumes the payload's textual content.
pub(crate) fn decode_text(bytes: &[u8]) -> Result<String, AdapterError> {
    if bytes.is_empty() {
        return Err(AdapterError::Permanent("empty document payload".to_string()));
    }
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Normalizes a label into a field key: lowercased, spaces collapsed to
/// underscores, punctuation stripped.
pub(crate) fn normalize_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    let mut last_underscore = true;
    for c in label.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
            last_underscore = false;
        } else if (c.is_whitespace() || c == '_' || c == '-' || c == '/') && !last_underscore {
            key.push('_');
            last_underscore = true;
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%m-%d-%Y",
    "%d-%m-%Y",
];

/// Tries to parse a raw value as a date, returning the normalized
/// `YYYY-MM-DD` form.
pub(crate) fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Coerces a raw textual value into a typed JSON value: numbers (currency
/// and percent markers stripped), normalized dates, or the trimmed string.
pub(crate) fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();

    let numeric: String = trimmed
        .trim_start_matches('$')
        .trim_end_matches('%')
        .replace(',', "");
    if !numeric.is_empty()
        && numeric
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
    {
        if let Ok(n) = numeric.parse::<f64>() {
            if let Some(number) = serde_json::Number::from_f64(n) {
                return Value::Number(number);
            }
        }
    }

    if let Some(date) = normalize_date(trimmed) {
        return Value::String(date);
    }

    Value::String(trimmed.to_string())
}

/// Splits labeled `key: value` / `key = value` lines into normalized
/// (key, raw value) pairs.
pub(crate) fn labeled_lines(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':').or_else(|| line.split_once('=')) else {
            continue;
        };
        let key = normalize_key(label);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        // Labels are short; anything longer is prose with a stray colon.
        if key.len() > 48 || key.split('_').count() > 6 {
            continue;
        }
        pairs.push((key, value.to_string()));
    }
    pairs
}

/// Interprets a two-line comma-separated payload as a header/value record
/// (single-row CSV export).
pub(crate) fn csv_pairs(text: &str) -> Option<Vec<(String, String)>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next()?;
    let values = lines.next()?;

    let headers: Vec<&str> = header.split(',').map(str::trim).collect();
    let cells: Vec<&str> = values.split(',').map(str::trim).collect();
    if headers.len() < 2 || headers.len() != cells.len() {
        return None;
    }
    // Header cells must look like labels, not data.
    if headers
        .iter()
        .any(|h| h.is_empty() || h.chars().next().is_some_and(|c| c.is_ascii_digit()))
    {
        return None;
    }

    Some(
        headers
            .iter()
            .zip(cells.iter())
            .filter(|(_, v)| !v.is_empty())
            .map(|(h, v)| (normalize_key(h), v.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Invoice Number"), "invoice_number");
        assert_eq!(normalize_key("  Period-End Date "), "period_end_date");
        assert_eq!(normalize_key("Total ($)"), "total");
        assert_eq!(normalize_key("A/R Aging"), "a_r_aging");
    }

    #[test]
    fn test_parse_scalar_numbers() {
        assert_eq!(parse_scalar("1200"), serde_json::json!(1200.0));
        assert_eq!(parse_scalar("$1,200.50"), serde_json::json!(1200.5));
        assert_eq!(parse_scalar("42%"), serde_json::json!(42.0));
        assert_eq!(parse_scalar("-3.5"), serde_json::json!(-3.5));
    }

    #[test]
    fn test_parse_scalar_dates() {
        assert_eq!(
            parse_scalar("2026-03-31"),
            Value::String("2026-03-31".to_string())
        );
        assert_eq!(
            parse_scalar("03/31/2026"),
            Value::String("2026-03-31".to_string())
        );
    }

    #[test]
    fn test_parse_scalar_strings() {
        assert_eq!(
            parse_scalar("Acme Holdings LLC"),
            Value::String("Acme Holdings LLC".to_string())
        );
    }

    #[test]
    fn test_labeled_lines() {
        let text = "Revenue: $1,000\nEBITDA = 250\nJust some prose without separators\n";
        let pairs = labeled_lines(text);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("revenue".to_string(), "$1,000".to_string()));
        assert_eq!(pairs[1], ("ebitda".to_string(), "250".to_string()));
    }

    #[test]
    fn test_csv_pairs() {
        let text = "period_end_date,revenue,gross_profit\n2026-03-31,1000,400\n";
        let pairs = csv_pairs(text).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[1], ("revenue".to_string(), "1000".to_string()));
    }

    #[test]
    fn test_csv_pairs_rejects_mismatched_rows() {
        assert!(csv_pairs("a,b,c\n1,2\n").is_none());
        assert!(csv_pairs("only one line\n").is_none());
    }

    #[test]
    fn test_decode_text_rejects_empty() {
        assert!(matches!(
            decode_text(b""),
            Err(AdapterError::Permanent(_))
        ));
        assert!(decode_text(b"hello").is_ok());
    }

    #[test]
    fn test_chain_selection() {
        let config = ProcessingConfig::for_inbox("/tmp");
        let registry = AdapterRegistry::from_config(&config);

        let chain = registry.chain_for(DocType::Invoice);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].kind(), ProcessorKind::InvoiceParser);
        assert_eq!(chain[1].kind(), ProcessorKind::LlmAssisted);

        let chain = registry.chain_for(DocType::MonthlyFinancials);
        assert_eq!(chain[0].kind(), ProcessorKind::FormParser);

        let chain = registry.chain_for(DocType::Unknown);
        assert_eq!(chain[0].kind(), ProcessorKind::GenericOcr);
    }
}
