//! Exception taxonomy: categories, priorities and resolution lifecycle.

use serde::{Deserialize, Serialize};

/// Resolution lifecycle of a recorded anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionStatus {
    Open,
    InReview,
    Resolved,
    Ignored,
}

impl ExceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionStatus::Open => "open",
            ExceptionStatus::InReview => "in_review",
            ExceptionStatus::Resolved => "resolved",
            ExceptionStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ExceptionStatus::Open),
            "in_review" => Some(ExceptionStatus::InReview),
            "resolved" => Some(ExceptionStatus::Resolved),
            "ignored" => Some(ExceptionStatus::Ignored),
            _ => None,
        }
    }

    /// Terminal states are immutable; revisiting requires a new exception.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExceptionStatus::Resolved | ExceptionStatus::Ignored)
    }

    pub fn can_transition(self, to: ExceptionStatus) -> bool {
        use ExceptionStatus::*;
        matches!(
            (self, to),
            (Open, InReview) | (Open, Resolved) | (Open, Ignored) | (InReview, Resolved) | (InReview, Ignored)
        )
    }
}

impl std::fmt::Display for ExceptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of anomaly was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionCategory {
    ValidationError,
    ExtractionError,
    LowConfidence,
    MissingField,
    InvalidFormat,
    BusinessRule,
    CrossField,
    UnknownDocType,
    ProcessingFailure,
    Other,
}

impl ExceptionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCategory::ValidationError => "validation_error",
            ExceptionCategory::ExtractionError => "extraction_error",
            ExceptionCategory::LowConfidence => "low_confidence",
            ExceptionCategory::MissingField => "missing_field",
            ExceptionCategory::InvalidFormat => "invalid_format",
            ExceptionCategory::BusinessRule => "business_rule",
            ExceptionCategory::CrossField => "cross_field",
            ExceptionCategory::UnknownDocType => "unknown_doc_type",
            ExceptionCategory::ProcessingFailure => "processing_failure",
            ExceptionCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "validation_error" => Some(ExceptionCategory::ValidationError),
            "extraction_error" => Some(ExceptionCategory::ExtractionError),
            "low_confidence" => Some(ExceptionCategory::LowConfidence),
            "missing_field" => Some(ExceptionCategory::MissingField),
            "invalid_format" => Some(ExceptionCategory::InvalidFormat),
            "business_rule" => Some(ExceptionCategory::BusinessRule),
            "cross_field" => Some(ExceptionCategory::CrossField),
            "unknown_doc_type" => Some(ExceptionCategory::UnknownDocType),
            "processing_failure" => Some(ExceptionCategory::ProcessingFailure),
            "other" => Some(ExceptionCategory::Other),
            _ => None,
        }
    }

    /// Whether an open exception of this category blocks the owning
    /// document from reaching `processed`. Data-quality categories block;
    /// informational ones (unclassified type, other) do not.
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            ExceptionCategory::UnknownDocType | ExceptionCategory::Other
        )
    }
}

impl std::fmt::Display for ExceptionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl ExceptionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionPriority::Low => "low",
            ExceptionPriority::Medium => "medium",
            ExceptionPriority::High => "high",
            ExceptionPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ExceptionPriority::Low),
            "medium" => Some(ExceptionPriority::Medium),
            "high" => Some(ExceptionPriority::High),
            "critical" => Some(ExceptionPriority::Critical),
            _ => None,
        }
    }

    /// Sort rank, most urgent first.
    pub fn rank(&self) -> u8 {
        match self {
            ExceptionPriority::Critical => 0,
            ExceptionPriority::High => 1,
            ExceptionPriority::Medium => 2,
            ExceptionPriority::Low => 3,
        }
    }
}

impl std::fmt::Display for ExceptionPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
