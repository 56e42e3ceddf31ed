//! LLM-assisted fallback extractor, stub build.
//!
//! Compiled when the `llm` feature is disabled. Deterministic label-synonym
//! normalization over labeled lines — smarter than the form parser on messy
//! labels, with no network dependency. The remote variant lives in
//! `llm.rs`.

use crate::error::AdapterError;
use crate::model::{DocType, ProcessorKind};

use super::{decode_text, labeled_lines, parse_scalar, Extraction, ExtractionAdapter};

const SYNONYM_CONFIDENCE: f64 = 0.9;
const PASSTHROUGH_CONFIDENCE: f64 = 0.82;

/// Canonical field name and the normalized label variants that map to it.
const SYNONYMS: &[(&str, &[&str])] = &[
    (
        "period_end_date",
        &["period_ending", "period_end", "for_the_period_ended", "as_of"],
    ),
    ("revenue", &["total_revenue", "net_revenue", "net_sales", "sales"]),
    ("gross_profit", &["gross_margin_dollars"]),
    ("ebitda", &["adjusted_ebitda"]),
    (
        "account_number",
        &["acct_no", "acct_number", "account_no", "account"],
    ),
    (
        "eligible_ar",
        &["eligible_accounts_receivable", "eligible_a_r", "eligible_receivables"],
    ),
    (
        "gross_accounts_receivable",
        &["gross_ar", "total_accounts_receivable", "gross_a_r"],
    ),
    ("total_availability", &["availability", "net_availability"]),
    ("certificate_date", &["cert_date", "certification_date"]),
    ("reporting_period", &["report_period", "period"]),
    (
        "overall_compliance",
        &["in_compliance", "compliance_status", "compliant"],
    ),
    ("leverage_ratio", &["total_leverage", "debt_to_ebitda"]),
    (
        "interest_coverage_ratio",
        &["interest_coverage", "coverage_ratio"],
    ),
    ("notice_date", &["date_of_notice"]),
    ("due_date", &["payment_due", "due_by", "payable_by"]),
    ("call_amount", &["capital_call_amount", "amount_called", "drawdown_amount"]),
    ("invoice_number", &["invoice_no", "inv_no", "invoice_id"]),
    ("total_amount", &["total", "amount_due", "balance_due", "total_due"]),
];

fn canonical_field(key: &str) -> Option<&'static str> {
    for (canonical, variants) in SYNONYMS {
        if *canonical == key || variants.contains(&key) {
            return Some(canonical);
        }
    }
    None
}

pub struct LlmAssistedAdapter;

impl LlmAssistedAdapter {
    /// The endpoint is only meaningful for the remote (`llm` feature)
    /// build; the stub ignores it.
    pub fn new(_endpoint: Option<&str>) -> Self {
        Self
    }
}

impl ExtractionAdapter for LlmAssistedAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::LlmAssisted
    }

    fn extract(&self, bytes: &[u8], _doc_type: DocType) -> Result<Extraction, AdapterError> {
        let text = decode_text(bytes)?;
        let mut extraction = Extraction::new(ProcessorKind::LlmAssisted);

        for (key, raw) in labeled_lines(&text) {
            match canonical_field(&key) {
                Some(canonical) => {
                    extraction.insert(canonical, parse_scalar(&raw), SYNONYM_CONFIDENCE)
                }
                None => {
                    if !extraction.fields.contains_key(&key) {
                        extraction.insert(&key, parse_scalar(&raw), PASSTHROUGH_CONFIDENCE);
                    }
                }
            }
        }

        Ok(extraction)
    }
}
