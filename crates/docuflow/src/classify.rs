//! Lightweight document type classification from filename patterns, mime
//! hints and a content keyword sweep. Runs before extraction; failure
//! degrades the document to the generic OCR chain.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::DocType;

/// Filename patterns per type, checked in order. First match wins.
const FILENAME_PATTERNS: &[(DocType, &[&str])] = &[
    (
        DocType::MonthlyFinancials,
        &[r"monthly.*financial", r"financials.*\d{4}[-_]\d{2}"],
    ),
    (
        DocType::QuarterlyFinancials,
        &[r"quarterly.*financial", r"q[1-4].*financial"],
    ),
    (
        DocType::AnnualFinancials,
        &[r"annual.*financial", r"audited.*financial", r"fy\d{4}"],
    ),
    (
        DocType::CovenantCompliance,
        &[r"covenant", r"compliance.*cert"],
    ),
    (
        DocType::BorrowingBase,
        &[r"\bbbc\b", r"borrowing.*base", r"bb.*cert"],
    ),
    (DocType::ArAging, &[r"aging", r"ar.*schedule", r"receivables"]),
    (
        DocType::CapitalCall,
        &[r"capital.*call", r"call.*notice", r"drawdown"],
    ),
    (
        DocType::DistributionNotice,
        &[r"distribution", r"dist.*notice"],
    ),
    (DocType::NavStatement, &[r"\bnav\b", r"net.*asset"]),
    (
        DocType::BankStatement,
        &[r"bank.*statement", r"account.*statement"],
    ),
    (DocType::Invoice, &[r"invoice", r"\bbill\b"]),
];

/// Content keywords per type, checked against the head of the payload.
const CONTENT_KEYWORDS: &[(DocType, &[&str])] = &[
    (DocType::CapitalCall, &["capital call"]),
    (DocType::BorrowingBase, &["borrowing base"]),
    (DocType::CovenantCompliance, &["covenant"]),
    (DocType::DistributionNotice, &["distribution notice"]),
    (DocType::NavStatement, &["net asset value"]),
    (DocType::BankStatement, &["bank statement"]),
    (DocType::MonthlyFinancials, &["monthly financial"]),
    (DocType::Invoice, &["invoice"]),
];

/// How much of the payload the content sweep inspects.
const CONTENT_SNIFF_BYTES: usize = 4096;

fn compiled_patterns() -> &'static Vec<(DocType, Vec<Regex>)> {
    static CELL: OnceLock<Vec<(DocType, Vec<Regex>)>> = OnceLock::new();
    CELL.get_or_init(|| {
        FILENAME_PATTERNS
            .iter()
            .map(|(doc_type, patterns)| {
                let regexes = patterns
                    .iter()
                    .map(|p| Regex::new(p).expect("filename pattern compiles"))
                    .collect();
                (*doc_type, regexes)
            })
            .collect()
    })
}

/// Classifies a document. Returns `None` when no signal matches; the
/// caller records the document as `unknown`.
pub fn classify(filename: &str, mime_type: Option<&str>, content: &[u8]) -> Option<DocType> {
    let lowered = filename.to_lowercase();
    for (doc_type, regexes) in compiled_patterns() {
        if regexes.iter().any(|r| r.is_match(&lowered)) {
            return Some(*doc_type);
        }
    }

    // Spreadsheet uploads without a telling filename are usually
    // financial statement exports.
    if let Some(mime) = mime_type {
        if (mime.contains("spreadsheet") || mime == "application/vnd.ms-excel")
            && lowered.contains("financial")
        {
            return Some(DocType::MonthlyFinancials);
        }
    }

    let head = &content[..content.len().min(CONTENT_SNIFF_BYTES)];
    let text = String::from_utf8_lossy(head).to_lowercase();
    for (doc_type, keywords) in CONTENT_KEYWORDS {
        if keywords.iter().any(|k| text.contains(k)) {
            return Some(*doc_type);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_classification() {
        assert_eq!(
            classify("acme_monthly_financials_2026-03.pdf", None, b""),
            Some(DocType::MonthlyFinancials)
        );
        assert_eq!(
            classify("Q1-financials.xlsx", None, b""),
            Some(DocType::QuarterlyFinancials)
        );
        assert_eq!(
            classify("covenant-certificate.pdf", None, b""),
            Some(DocType::CovenantCompliance)
        );
        assert_eq!(
            classify("borrowing_base_march.csv", None, b""),
            Some(DocType::BorrowingBase)
        );
        assert_eq!(
            classify("capital_call_notice.pdf", None, b""),
            Some(DocType::CapitalCall)
        );
        assert_eq!(classify("invoice-441.pdf", None, b""), Some(DocType::Invoice));
    }

    #[test]
    fn test_content_sniff_classification() {
        let content = b"ACME FUND III\nCAPITAL CALL notice for LP distribution...";
        assert_eq!(
            classify("scan0001.pdf", None, content),
            Some(DocType::CapitalCall)
        );
    }

    #[test]
    fn test_filename_beats_content() {
        // Filename signal wins even when the body mentions other types.
        let content = b"this invoice mentions a borrowing base";
        assert_eq!(
            classify("covenant_cert.pdf", None, content),
            Some(DocType::CovenantCompliance)
        );
    }

    #[test]
    fn test_unclassifiable_returns_none() {
        assert_eq!(classify("scan0001.pdf", None, b"illegible noise"), None);
    }

    #[test]
    fn test_spreadsheet_mime_hint() {
        assert_eq!(
            classify(
                "financial-pack.xlsx",
                Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
                b"",
            ),
            Some(DocType::MonthlyFinancials)
        );
    }
}
