//! Invoice parser — pattern extraction tuned for invoice-shaped notices
//! (invoices, capital calls, distribution notices).

use std::sync::OnceLock;

use regex::Regex;

use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

use super::{decode_text, labeled_lines, parse_scalar, Extraction, ExtractionAdapter};

struct FieldPattern {
    field: &'static str,
    pattern: &'static str,
    confidence: f64,
}

const COMMON_PATTERNS: &[FieldPattern] = &[
    FieldPattern {
        field: "invoice_number",
        pattern: r"(?i)invoice\s*(?:no\.?|number|#)\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9-]*)",
        confidence: 0.95,
    },
    FieldPattern {
        field: "invoice_date",
        pattern: r"(?i)invoice\s+date\s*:?\s*([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})",
        confidence: 0.92,
    },
    FieldPattern {
        field: "due_date",
        pattern: r"(?i)due\s*(?:date|by)?\s*:?\s*([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})",
        confidence: 0.92,
    },
    FieldPattern {
        field: "total_amount",
        pattern: r"(?i)(?:total|amount\s+due|balance\s+due)\s*:?\s*\$?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        confidence: 0.93,
    },
    FieldPattern {
        field: "vendor",
        pattern: r"(?i)(?:from|vendor|billed\s+by)\s*:\s*([^\r\n]+)",
        confidence: 0.8,
    },
];

const CAPITAL_CALL_PATTERNS: &[FieldPattern] = &[
    FieldPattern {
        field: "call_amount",
        pattern: r"(?i)(?:capital\s+)?call\s+amount\s*:?\s*\$?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        confidence: 0.93,
    },
    FieldPattern {
        field: "notice_date",
        pattern: r"(?i)notice\s+date\s*:?\s*([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})",
        confidence: 0.92,
    },
];

const DISTRIBUTION_PATTERNS: &[FieldPattern] = &[
    FieldPattern {
        field: "distribution_amount",
        pattern: r"(?i)distribution\s+amount\s*:?\s*\$?\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        confidence: 0.93,
    },
    FieldPattern {
        field: "payment_date",
        pattern: r"(?i)payment\s+date\s*:?\s*([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{1,2}/[0-9]{1,2}/[0-9]{2,4})",
        confidence: 0.92,
    },
];

const SWEEP_CONFIDENCE: f64 = 0.8;

fn compiled(patterns: &'static [FieldPattern], cell: &'static OnceLock<Vec<(String, Regex, f64)>>) -> &'static [(String, Regex, f64)] {
    cell.get_or_init(|| {
        patterns
            .iter()
            .map(|p| {
                (
                    p.field.to_string(),
                    Regex::new(p.pattern).expect("invoice pattern compiles"),
                    p.confidence,
                )
            })
            .collect()
    })
}

fn common_patterns() -> &'static [(String, Regex, f64)] {
    static CELL: OnceLock<Vec<(String, Regex, f64)>> = OnceLock::new();
    compiled(COMMON_PATTERNS, &CELL)
}

fn capital_call_patterns() -> &'static [(String, Regex, f64)] {
    static CELL: OnceLock<Vec<(String, Regex, f64)>> = OnceLock::new();
    compiled(CAPITAL_CALL_PATTERNS, &CELL)
}

fn distribution_patterns() -> &'static [(String, Regex, f64)] {
    static CELL: OnceLock<Vec<(String, Regex, f64)>> = OnceLock::new();
    compiled(DISTRIBUTION_PATTERNS, &CELL)
}

pub struct InvoiceParserAdapter;

impl InvoiceParserAdapter {
    pub fn new() -> Self {
        Self
    }

    fn apply_patterns(
        text: &str,
        patterns: &[(String, Regex, f64)],
        extraction: &mut Extraction,
    ) {
        for (field, regex, confidence) in patterns {
            if extraction.fields.contains_key(field) {
                continue;
            }
            if let Some(capture) = regex.captures(text).and_then(|c| c.get(1)) {
                extraction.insert(field, parse_scalar(capture.as_str()), *confidence);
            }
        }
    }
}

impl Default for InvoiceParserAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionAdapter for InvoiceParserAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::InvoiceParser
    }

    fn extract(&self, bytes: &[u8], doc_type: DocType) -> Result<Extraction, AdapterError> {
        let text = decode_text(bytes)?;
        let mut extraction = Extraction::new(ProcessorKind::InvoiceParser);

        match doc_type {
            DocType::CapitalCall => {
                Self::apply_patterns(&text, capital_call_patterns(), &mut extraction)
            }
            DocType::DistributionNotice => {
                Self::apply_patterns(&text, distribution_patterns(), &mut extraction)
            }
            _ => {}
        }
        Self::apply_patterns(&text, common_patterns(), &mut extraction);

        // Sweep remaining labeled lines at reduced confidence.
        for (key, raw) in labeled_lines(&text) {
            if extraction.fields.contains_key(&key) {
                continue;
            }
            extraction.insert(&key, parse_scalar(&raw), SWEEP_CONFIDENCE);
        }

        Ok(extraction)
    }
}
