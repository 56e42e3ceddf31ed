//! Validation rule sets per document type: required fields, field format
//! checks, and cross-field business rules.

use serde_json::{Map, Value};

use crate::adapter::normalize_date;
use crate::model::{DocType, ExceptionCategory, ExceptionPriority};

#[derive(Debug, Clone, Copy)]
pub enum FieldCheck {
    PositiveNumber,
    NonNegative,
    Number,
    Percentage { min: f64, max: f64 },
    Date,
}

#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: &'static str,
    pub check: FieldCheck,
    pub priority: ExceptionPriority,
}

#[derive(Debug, Clone, Copy)]
pub enum CrossCheck {
    /// `lesser <= greater`, both numeric.
    FieldLe {
        lesser: &'static str,
        greater: &'static str,
    },
    /// `field >= 0`, numeric.
    NonNegative { field: &'static str },
    /// `later > earlier`, both dates.
    DateAfter {
        later: &'static str,
        earlier: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct CrossRule {
    pub check: CrossCheck,
    pub message: &'static str,
    pub priority: ExceptionPriority,
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub required: &'static [&'static str],
    pub field_rules: Vec<FieldRule>,
    pub cross_rules: Vec<CrossRule>,
}

/// A single rule violation, later materialized as an exception.
#[derive(Debug, Clone)]
pub struct RuleViolation {
    pub field: Option<String>,
    pub category: ExceptionCategory,
    pub priority: ExceptionPriority,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

const FINANCIALS_REQUIRED: &[&str] = &["period_end_date", "revenue"];
const COVENANT_REQUIRED: &[&str] = &["reporting_period", "overall_compliance"];
const BORROWING_BASE_REQUIRED: &[&str] = &["certificate_date", "eligible_ar", "total_availability"];
const CAPITAL_CALL_REQUIRED: &[&str] = &["notice_date", "due_date", "call_amount"];

fn financials_rules() -> RuleSet {
    RuleSet {
        required: FINANCIALS_REQUIRED,
        field_rules: vec![
            FieldRule {
                field: "revenue",
                check: FieldCheck::PositiveNumber,
                priority: ExceptionPriority::High,
            },
            FieldRule {
                field: "ebitda",
                check: FieldCheck::Number,
                priority: ExceptionPriority::Medium,
            },
            FieldRule {
                field: "gross_margin",
                check: FieldCheck::Percentage { min: 0.0, max: 100.0 },
                priority: ExceptionPriority::Medium,
            },
            FieldRule {
                field: "ebitda_margin",
                check: FieldCheck::Percentage {
                    min: -100.0,
                    max: 100.0,
                },
                priority: ExceptionPriority::Low,
            },
            FieldRule {
                field: "period_end_date",
                check: FieldCheck::Date,
                priority: ExceptionPriority::Medium,
            },
        ],
        cross_rules: vec![CrossRule {
            check: CrossCheck::FieldLe {
                lesser: "gross_profit",
                greater: "revenue",
            },
            message: "Gross profit cannot exceed revenue",
            priority: ExceptionPriority::High,
        }],
    }
}

fn covenant_rules() -> RuleSet {
    RuleSet {
        required: COVENANT_REQUIRED,
        field_rules: vec![
            FieldRule {
                field: "leverage_ratio",
                check: FieldCheck::PositiveNumber,
                priority: ExceptionPriority::High,
            },
            FieldRule {
                field: "interest_coverage_ratio",
                check: FieldCheck::PositiveNumber,
                priority: ExceptionPriority::High,
            },
            FieldRule {
                field: "reporting_period",
                check: FieldCheck::Date,
                priority: ExceptionPriority::Medium,
            },
        ],
        cross_rules: vec![],
    }
}

fn borrowing_base_rules() -> RuleSet {
    RuleSet {
        required: BORROWING_BASE_REQUIRED,
        field_rules: vec![
            FieldRule {
                field: "eligible_ar",
                check: FieldCheck::NonNegative,
                priority: ExceptionPriority::High,
            },
            FieldRule {
                field: "eligible_inventory",
                check: FieldCheck::NonNegative,
                priority: ExceptionPriority::Medium,
            },
            FieldRule {
                field: "ar_advance_rate",
                check: FieldCheck::Percentage { min: 0.0, max: 95.0 },
                priority: ExceptionPriority::Medium,
            },
            FieldRule {
                field: "inventory_advance_rate",
                check: FieldCheck::Percentage { min: 0.0, max: 70.0 },
                priority: ExceptionPriority::Medium,
            },
        ],
        cross_rules: vec![
            CrossRule {
                check: CrossCheck::FieldLe {
                    lesser: "eligible_ar",
                    greater: "gross_accounts_receivable",
                },
                message: "Eligible AR cannot exceed gross AR",
                priority: ExceptionPriority::High,
            },
            CrossRule {
                check: CrossCheck::NonNegative {
                    field: "total_availability",
                },
                message: "Total availability cannot be negative",
                priority: ExceptionPriority::Critical,
            },
        ],
    }
}

fn capital_call_rules() -> RuleSet {
    RuleSet {
        required: CAPITAL_CALL_REQUIRED,
        field_rules: vec![FieldRule {
            field: "call_amount",
            check: FieldCheck::PositiveNumber,
            priority: ExceptionPriority::High,
        }],
        cross_rules: vec![CrossRule {
            check: CrossCheck::DateAfter {
                later: "due_date",
                earlier: "notice_date",
            },
            message: "Due date must be after notice date",
            priority: ExceptionPriority::High,
        }],
    }
}

/// Rule set for a document type. Types without dedicated rules are
/// validated generically (empty extraction check only).
pub fn rules_for(doc_type: DocType) -> Option<RuleSet> {
    match doc_type {
        DocType::MonthlyFinancials | DocType::QuarterlyFinancials | DocType::AnnualFinancials => {
            Some(financials_rules())
        }
        DocType::CovenantCompliance => Some(covenant_rules()),
        DocType::BorrowingBase => Some(borrowing_base_rules()),
        DocType::CapitalCall => Some(capital_call_rules()),
        _ => None,
    }
}

/// Required fields for a document type; empty when no rule set applies.
pub fn required_fields(doc_type: DocType) -> &'static [&'static str] {
    match doc_type {
        DocType::MonthlyFinancials | DocType::QuarterlyFinancials | DocType::AnnualFinancials => {
            FINANCIALS_REQUIRED
        }
        DocType::CovenantCompliance => COVENANT_REQUIRED,
        DocType::BorrowingBase => BORROWING_BASE_REQUIRED,
        DocType::CapitalCall => CAPITAL_CALL_REQUIRED,
        _ => &[],
    }
}

fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

fn as_date(value: &Value) -> Option<String> {
    value.as_str().and_then(normalize_date)
}

/// Applies a single field rule. Absent fields are skipped; the required
/// check covers those.
pub fn apply_field_rule(fields: &Map<String, Value>, rule: &FieldRule) -> Option<RuleViolation> {
    let value = fields.get(rule.field)?;
    if value.is_null() {
        return None;
    }

    let violation = |category: ExceptionCategory, message: String, expected: &str| RuleViolation {
        field: Some(rule.field.to_string()),
        category,
        priority: rule.priority,
        message,
        expected: Some(expected.to_string()),
        actual: Some(value_display(value)),
    };

    match rule.check {
        FieldCheck::PositiveNumber => match as_number(value) {
            Some(n) if n > 0.0 => None,
            _ => Some(violation(
                ExceptionCategory::ValidationError,
                format!("Field '{}' must be a positive number", rule.field),
                "positive number",
            )),
        },
        FieldCheck::NonNegative => match as_number(value) {
            Some(n) if n >= 0.0 => None,
            _ => Some(violation(
                ExceptionCategory::ValidationError,
                format!("Field '{}' cannot be negative", rule.field),
                "non-negative number",
            )),
        },
        FieldCheck::Number => match as_number(value) {
            Some(_) => None,
            None => Some(violation(
                ExceptionCategory::InvalidFormat,
                format!("Field '{}' must be a number", rule.field),
                "number",
            )),
        },
        FieldCheck::Percentage { min, max } => match as_number(value) {
            None => Some(violation(
                ExceptionCategory::InvalidFormat,
                format!("Field '{}' must be a percentage", rule.field),
                "percentage",
            )),
            Some(n) if n < min || n > max => Some(violation(
                ExceptionCategory::ValidationError,
                format!("Field '{}' must be between {}% and {}%", rule.field, min, max),
                &format!("{}-{}", min, max),
            )),
            Some(_) => None,
        },
        FieldCheck::Date => match as_date(value) {
            Some(_) => None,
            None => Some(violation(
                ExceptionCategory::InvalidFormat,
                format!("Field '{}' is not a valid date", rule.field),
                "date (YYYY-MM-DD)",
            )),
        },
    }
}

/// Applies a cross-field rule. Rules over absent or unparseable fields are
/// skipped; the field-level checks report those separately.
pub fn apply_cross_rule(fields: &Map<String, Value>, rule: &CrossRule) -> Option<RuleViolation> {
    let fired = match rule.check {
        CrossCheck::FieldLe { lesser, greater } => {
            let lesser = fields.get(lesser).and_then(as_number)?;
            let greater = fields.get(greater).and_then(as_number)?;
            lesser > greater
        }
        CrossCheck::NonNegative { field } => {
            let value = fields.get(field).and_then(as_number)?;
            value < 0.0
        }
        CrossCheck::DateAfter { later, earlier } => {
            let later = fields.get(later).and_then(as_date)?;
            let earlier = fields.get(earlier).and_then(as_date)?;
            later <= earlier
        }
    };

    fired.then(|| RuleViolation {
        field: None,
        category: ExceptionCategory::CrossField,
        priority: rule.priority,
        message: rule.message.to_string(),
        expected: None,
        actual: None,
    })
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_positive_number_rule() {
        let rule = FieldRule {
            field: "revenue",
            check: FieldCheck::PositiveNumber,
            priority: ExceptionPriority::High,
        };
        assert!(apply_field_rule(&fields(&[("revenue", json!(100.0))]), &rule).is_none());

        let violation =
            apply_field_rule(&fields(&[("revenue", json!(-5.0))]), &rule).unwrap();
        assert_eq!(violation.category, ExceptionCategory::ValidationError);
        assert_eq!(violation.priority, ExceptionPriority::High);
        assert_eq!(violation.actual.as_deref(), Some("-5.0"));

        // Non-numeric value also fires.
        assert!(apply_field_rule(&fields(&[("revenue", json!("lots"))]), &rule).is_some());
        // Absent field is the required check's concern.
        assert!(apply_field_rule(&fields(&[]), &rule).is_none());
    }

    #[test]
    fn test_percentage_bounds() {
        let rule = FieldRule {
            field: "ar_advance_rate",
            check: FieldCheck::Percentage { min: 0.0, max: 95.0 },
            priority: ExceptionPriority::Medium,
        };
        assert!(apply_field_rule(&fields(&[("ar_advance_rate", json!(85.0))]), &rule).is_none());
        assert!(apply_field_rule(&fields(&[("ar_advance_rate", json!(99.0))]), &rule).is_some());
    }

    #[test]
    fn test_date_rule() {
        let rule = FieldRule {
            field: "period_end_date",
            check: FieldCheck::Date,
            priority: ExceptionPriority::Medium,
        };
        assert!(
            apply_field_rule(&fields(&[("period_end_date", json!("2026-03-31"))]), &rule)
                .is_none()
        );
        let violation =
            apply_field_rule(&fields(&[("period_end_date", json!("soon"))]), &rule).unwrap();
        assert_eq!(violation.category, ExceptionCategory::InvalidFormat);
    }

    #[test]
    fn test_cross_field_le() {
        let rule = CrossRule {
            check: CrossCheck::FieldLe {
                lesser: "gross_profit",
                greater: "revenue",
            },
            message: "Gross profit cannot exceed revenue",
            priority: ExceptionPriority::High,
        };
        assert!(apply_cross_rule(
            &fields(&[("gross_profit", json!(400.0)), ("revenue", json!(1000.0))]),
            &rule
        )
        .is_none());

        let violation = apply_cross_rule(
            &fields(&[("gross_profit", json!(1400.0)), ("revenue", json!(1000.0))]),
            &rule,
        )
        .unwrap();
        assert_eq!(violation.category, ExceptionCategory::CrossField);
        assert!(violation.field.is_none());

        // Missing operand skips the rule.
        assert!(apply_cross_rule(&fields(&[("revenue", json!(1000.0))]), &rule).is_none());
    }

    #[test]
    fn test_cross_field_date_after() {
        let rule = CrossRule {
            check: CrossCheck::DateAfter {
                later: "due_date",
                earlier: "notice_date",
            },
            message: "Due date must be after notice date",
            priority: ExceptionPriority::High,
        };
        assert!(apply_cross_rule(
            &fields(&[
                ("due_date", json!("2026-01-24")),
                ("notice_date", json!("2026-01-10"))
            ]),
            &rule
        )
        .is_none());
        assert!(apply_cross_rule(
            &fields(&[
                ("due_date", json!("2026-01-05")),
                ("notice_date", json!("2026-01-10"))
            ]),
            &rule
        )
        .is_some());
    }

    #[test]
    fn test_cross_field_non_negative() {
        let rule = CrossRule {
            check: CrossCheck::NonNegative {
                field: "total_availability",
            },
            message: "Total availability cannot be negative",
            priority: ExceptionPriority::Critical,
        };
        assert!(
            apply_cross_rule(&fields(&[("total_availability", json!(0.0))]), &rule).is_none()
        );
        let violation =
            apply_cross_rule(&fields(&[("total_availability", json!(-10.0))]), &rule).unwrap();
        assert_eq!(violation.priority, ExceptionPriority::Critical);
    }

    #[test]
    fn test_rule_sets_per_type() {
        assert_eq!(
            required_fields(DocType::MonthlyFinancials),
            &["period_end_date", "revenue"]
        );
        assert_eq!(
            required_fields(DocType::BorrowingBase),
            &["certificate_date", "eligible_ar", "total_availability"]
        );
        assert_eq!(
            required_fields(DocType::CapitalCall),
            &["notice_date", "due_date", "call_amount"]
        );
        assert!(required_fields(DocType::Unknown).is_empty());
        assert!(rules_for(DocType::Other).is_none());
        assert!(rules_for(DocType::QuarterlyFinancials).is_some());
    }
}
