//! Document lifecycle and classification enums.
//!
//! Statuses are explicit tagged enums with a validated transition table so
//! illegal transitions are caught at construction time rather than as loose
//! status strings in the store.

use serde::{Deserialize, Serialize};

/// Processing lifecycle of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    NeedsReview,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Processed => "processed",
            DocumentStatus::NeedsReview => "needs_review",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "processed" => Some(DocumentStatus::Processed),
            "needs_review" => Some(DocumentStatus::NeedsReview),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states of a processing attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Processed | DocumentStatus::NeedsReview | DocumentStatus::Failed
        )
    }

    /// Validated transition table.
    ///
    /// `processing` is re-entrant from `failed` (queue retry). Terminal
    /// states are only left via an explicit reprocess request (back to
    /// `pending`), except `needs_review -> processed` which is driven by
    /// exception resolution or manual approval.
    pub fn can_transition(self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Failed, Processing)
                | (Processing, Processed)
                | (Processing, NeedsReview)
                | (Processing, Failed)
                | (Processed, Pending)
                | (NeedsReview, Pending)
                | (Failed, Pending)
                | (NeedsReview, Processed)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document type categories recognized by the classifier and rule sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    MonthlyFinancials,
    QuarterlyFinancials,
    AnnualFinancials,
    CovenantCompliance,
    BorrowingBase,
    ArAging,
    CapitalCall,
    DistributionNotice,
    NavStatement,
    BankStatement,
    Invoice,
    Other,
    Unknown,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::MonthlyFinancials => "monthly_financials",
            DocType::QuarterlyFinancials => "quarterly_financials",
            DocType::AnnualFinancials => "annual_financials",
            DocType::CovenantCompliance => "covenant_compliance",
            DocType::BorrowingBase => "borrowing_base",
            DocType::ArAging => "ar_aging",
            DocType::CapitalCall => "capital_call",
            DocType::DistributionNotice => "distribution_notice",
            DocType::NavStatement => "nav_statement",
            DocType::BankStatement => "bank_statement",
            DocType::Invoice => "invoice",
            DocType::Other => "other",
            DocType::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly_financials" => Some(DocType::MonthlyFinancials),
            "quarterly_financials" => Some(DocType::QuarterlyFinancials),
            "annual_financials" => Some(DocType::AnnualFinancials),
            "covenant_compliance" => Some(DocType::CovenantCompliance),
            "borrowing_base" => Some(DocType::BorrowingBase),
            "ar_aging" => Some(DocType::ArAging),
            "capital_call" => Some(DocType::CapitalCall),
            "distribution_notice" => Some(DocType::DistributionNotice),
            "nav_statement" => Some(DocType::NavStatement),
            "bank_statement" => Some(DocType::BankStatement),
            "invoice" => Some(DocType::Invoice),
            "other" => Some(DocType::Other),
            "unknown" => Some(DocType::Unknown),
            _ => None,
        }
    }

    /// Types extracted with invoice-shaped field patterns.
    pub fn is_invoice_family(&self) -> bool {
        matches!(
            self,
            DocType::Invoice | DocType::CapitalCall | DocType::DistributionNotice
        )
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the extraction capability that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    FormParser,
    InvoiceParser,
    GenericOcr,
    LlmAssisted,
    Manual,
}

impl ProcessorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::FormParser => "form_parser",
            ProcessorKind::InvoiceParser => "invoice_parser",
            ProcessorKind::GenericOcr => "generic_ocr",
            ProcessorKind::LlmAssisted => "llm_assisted",
            ProcessorKind::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "form_parser" => Some(ProcessorKind::FormParser),
            "invoice_parser" => Some(ProcessorKind::InvoiceParser),
            "generic_ocr" => Some(ProcessorKind::GenericOcr),
            "llm_assisted" => Some(ProcessorKind::LlmAssisted),
            "manual" => Some(ProcessorKind::Manual),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Processed,
            DocumentStatus::NeedsReview,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(DocumentStatus::Processed.is_terminal());
        assert!(DocumentStatus::NeedsReview.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_valid_transitions() {
        use DocumentStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Failed.can_transition(Processing));
        assert!(Processing.can_transition(Processed));
        assert!(Processing.can_transition(NeedsReview));
        assert!(Processing.can_transition(Failed));
        // Reprocess request.
        assert!(Processed.can_transition(Pending));
        assert!(NeedsReview.can_transition(Pending));
        assert!(Failed.can_transition(Pending));
        // Resolution / manual approval.
        assert!(NeedsReview.can_transition(Processed));
    }

    #[test]
    fn test_illegal_transitions() {
        use DocumentStatus::*;
        // Terminal states never re-enter processing without a reprocess.
        assert!(!Processed.can_transition(Processing));
        assert!(!NeedsReview.can_transition(Processing));
        assert!(!Pending.can_transition(Processed));
        assert!(!Pending.can_transition(NeedsReview));
        assert!(!Processed.can_transition(NeedsReview));
        assert!(!Failed.can_transition(Processed));
    }

    #[test]
    fn test_doc_type_roundtrip() {
        for s in [
            "monthly_financials",
            "covenant_compliance",
            "borrowing_base",
            "capital_call",
            "invoice",
            "unknown",
        ] {
            assert_eq!(DocType::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(DocType::parse("memo"), None);
    }

    #[test]
    fn test_invoice_family() {
        assert!(DocType::Invoice.is_invoice_family());
        assert!(DocType::CapitalCall.is_invoice_family());
        assert!(!DocType::MonthlyFinancials.is_invoice_family());
        assert!(!DocType::Unknown.is_invoice_family());
    }

    #[test]
    fn test_processor_kind_roundtrip() {
        for kind in [
            ProcessorKind::FormParser,
            ProcessorKind::InvoiceParser,
            ProcessorKind::GenericOcr,
            ProcessorKind::LlmAssisted,
            ProcessorKind::Manual,
        ] {
            assert_eq!(ProcessorKind::parse(kind.as_str()), Some(kind));
        }
    }
}
