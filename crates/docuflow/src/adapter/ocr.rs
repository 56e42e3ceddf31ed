//! Generic OCR adapter — token sweep over arbitrary text. Last-resort
//! extraction for unclassified documents; modest confidence by design so
//! the evaluator escalates to the LLM fallback when possible.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

use super::{decode_text, normalize_date, Extraction, ExtractionAdapter};

const SWEEP_CONFIDENCE: f64 = 0.5;

fn date_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"\b([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{4})\b")
            .expect("date pattern compiles")
    })
}

fn amount_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)").expect("amount pattern compiles")
    })
}

fn reference_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"\b([A-Z]{2,}-[0-9]{2,}|[0-9]{6,})\b").expect("reference pattern compiles")
    })
}

pub struct GenericOcrAdapter;

impl GenericOcrAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GenericOcrAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionAdapter for GenericOcrAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::GenericOcr
    }

    fn extract(&self, bytes: &[u8], _doc_type: DocType) -> Result<Extraction, AdapterError> {
        let text = decode_text(bytes)?;
        let mut extraction = Extraction::new(ProcessorKind::GenericOcr);

        for (i, capture) in date_regex().captures_iter(&text).take(5).enumerate() {
            let raw = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let value = normalize_date(raw).unwrap_or_else(|| raw.to_string());
            extraction.insert(&format!("date_{}", i + 1), Value::String(value), SWEEP_CONFIDENCE);
        }

        for (i, capture) in amount_regex().captures_iter(&text).take(5).enumerate() {
            let raw = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            let numeric = raw.replace(',', "");
            let value = numeric
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(raw.to_string()));
            extraction.insert(&format!("amount_{}", i + 1), value, SWEEP_CONFIDENCE);
        }

        for (i, capture) in reference_regex().captures_iter(&text).take(5).enumerate() {
            let raw = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            extraction.insert(
                &format!("reference_{}", i + 1),
                Value::String(raw.to_string()),
                SWEEP_CONFIDENCE,
            );
        }

        Ok(extraction)
    }
}
