//! Confidence evaluator — decides `processed` vs `needs_review`, drives
//! chain escalation, and turns shortfalls into exception findings.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::adapter::Extraction;
use crate::model::{DocType, ExceptionCategory, ExceptionPriority};
use crate::rules::{self, RuleViolation};

/// Shortfall at or beyond this distance below the threshold raises a
/// low-confidence finding from `low` to `medium`.
const MEDIUM_SHORTFALL: f64 = 0.2;

/// Whether to stop the adapter chain at the current extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDecision {
    Finalize,
    Continue,
}

/// One detected anomaly, persisted as an exception at finalization.
#[derive(Debug, Clone)]
pub struct Finding {
    pub category: ExceptionCategory,
    pub priority: ExceptionPriority,
    pub reason: String,
    pub field_name: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl From<RuleViolation> for Finding {
    fn from(v: RuleViolation) -> Self {
        Finding {
            category: v.category,
            priority: v.priority,
            reason: v.message,
            field_name: v.field,
            expected: v.expected,
            actual: v.actual,
        }
    }
}

/// Outcome of assessing a finalized extraction.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub aggregate: f64,
    /// Empty means the document is `processed`; otherwise `needs_review`
    /// with one exception per finding.
    pub findings: Vec<Finding>,
}

/// Aggregate confidence: the minimum confidence among required fields
/// present; 0 when any required field is absent. Types without required
/// fields fall back to the minimum over all extracted fields (0 when the
/// extraction is empty).
pub fn aggregate_confidence(
    fields: &Map<String, Value>,
    confidences: &BTreeMap<String, f64>,
    required: &[&str],
) -> f64 {
    if required.is_empty() {
        if fields.is_empty() {
            return 0.0;
        }
        return fields
            .keys()
            .map(|k| confidences.get(k).copied().unwrap_or(0.0))
            .fold(1.0, f64::min);
    }

    let mut aggregate = 1.0f64;
    for field in required {
        match fields.get(*field) {
            None | Some(Value::Null) => return 0.0,
            Some(_) => {
                aggregate = aggregate.min(confidences.get(*field).copied().unwrap_or(0.0));
            }
        }
    }
    aggregate
}

pub struct ConfidenceEvaluator {
    threshold: f64,
    strict: bool,
}

impl ConfidenceEvaluator {
    pub fn new(threshold: f64, strict: bool) -> Self {
        Self { threshold, strict }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Chain escalation: a below-threshold extraction continues to the
    /// next adapter while one remains; only the final extraction is
    /// assessed for exceptions.
    pub fn decide(&self, aggregate: f64, adapters_remaining: bool) -> ChainDecision {
        if aggregate >= self.threshold || !adapters_remaining {
            ChainDecision::Finalize
        } else {
            ChainDecision::Continue
        }
    }

    /// Full assessment of the finalized extraction: aggregate score plus
    /// one finding per distinct failure.
    pub fn assess(&self, doc_type: DocType, extraction: &Extraction) -> Assessment {
        let fields = &extraction.fields;
        let confidences = &extraction.confidences;
        let ruleset = rules::rules_for(doc_type);
        let required = rules::required_fields(doc_type);
        let aggregate = aggregate_confidence(fields, confidences, required);

        let mut rule_findings: Vec<Finding> = Vec::new();
        match &ruleset {
            Some(ruleset) => {
                for rule in &ruleset.field_rules {
                    if let Some(violation) = rules::apply_field_rule(fields, rule) {
                        // Lenient mode drops low-priority violations.
                        if violation.priority == ExceptionPriority::Low && !self.strict {
                            tracing::debug!(
                                field = %rule.field,
                                "Dropping low-priority rule violation (lenient mode)"
                            );
                            continue;
                        }
                        rule_findings.push(violation.into());
                    }
                }
                for rule in &ruleset.cross_rules {
                    if let Some(violation) = rules::apply_cross_rule(fields, rule) {
                        rule_findings.push(violation.into());
                    }
                }
            }
            None => {
                if fields.is_empty() || fields.values().all(Value::is_null) {
                    rule_findings.push(Finding {
                        category: ExceptionCategory::ExtractionError,
                        priority: ExceptionPriority::Critical,
                        reason: "No data could be extracted from the document".to_string(),
                        field_name: None,
                        expected: None,
                        actual: None,
                    });
                }
            }
        }

        // Confident extraction with clean rules: no findings, processed.
        if aggregate >= self.threshold && rule_findings.is_empty() {
            return Assessment {
                aggregate,
                findings: Vec::new(),
            };
        }

        let mut findings = rule_findings;

        for field in required {
            let missing = matches!(fields.get(*field), None | Some(Value::Null));
            if missing {
                findings.push(Finding {
                    category: ExceptionCategory::MissingField,
                    priority: ExceptionPriority::High,
                    reason: format!("Required field '{}' is missing", field),
                    field_name: Some(field.to_string()),
                    expected: None,
                    actual: None,
                });
            }
        }

        for (field, value) in fields {
            if value.is_null() {
                continue;
            }
            let confidence = confidences.get(field).copied().unwrap_or(0.0);
            if confidence < self.threshold {
                let shortfall = self.threshold - confidence;
                let priority = if shortfall >= MEDIUM_SHORTFALL {
                    ExceptionPriority::Medium
                } else {
                    ExceptionPriority::Low
                };
                findings.push(Finding {
                    category: ExceptionCategory::LowConfidence,
                    priority,
                    reason: format!(
                        "Field '{}' confidence {:.2} is below threshold {:.2}",
                        field, confidence, self.threshold
                    ),
                    field_name: Some(field.clone()),
                    expected: Some(format!(">= {:.2}", self.threshold)),
                    actual: Some(format!("{:.2}", confidence)),
                });
            }
        }

        Assessment {
            aggregate,
            findings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProcessorKind;
    use serde_json::json;

    fn extraction(pairs: &[(&str, Value, f64)]) -> Extraction {
        let mut extraction = Extraction::new(ProcessorKind::FormParser);
        for (field, value, confidence) in pairs {
            extraction.insert(field, value.clone(), *confidence);
        }
        extraction
    }

    #[test]
    fn test_aggregate_is_min_over_required() {
        let e = extraction(&[
            ("period_end_date", json!("2026-03-31"), 0.95),
            ("revenue", json!(1000.0), 0.9),
            ("notes", json!("fine"), 0.2),
        ]);
        // Optional low-confidence fields do not drag the aggregate down.
        let aggregate =
            aggregate_confidence(&e.fields, &e.confidences, &["period_end_date", "revenue"]);
        assert!((aggregate - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_zero_when_required_absent() {
        let e = extraction(&[("revenue", json!(1000.0), 0.99)]);
        let aggregate =
            aggregate_confidence(&e.fields, &e.confidences, &["period_end_date", "revenue"]);
        assert_eq!(aggregate, 0.0);
    }

    #[test]
    fn test_aggregate_without_required_set() {
        let e = extraction(&[("a", json!(1.0), 0.7), ("b", json!(2.0), 0.6)]);
        let aggregate = aggregate_confidence(&e.fields, &e.confidences, &[]);
        assert!((aggregate - 0.6).abs() < f64::EPSILON);

        let empty = Extraction::new(ProcessorKind::GenericOcr);
        assert_eq!(aggregate_confidence(&empty.fields, &empty.confidences, &[]), 0.0);
    }

    #[test]
    fn test_threshold_boundary() {
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        // Exactly at the threshold finalizes as processed.
        let e = extraction(&[
            ("period_end_date", json!("2026-03-31"), 0.85),
            ("revenue", json!(1000.0), 0.85),
        ]);
        let assessment = evaluator.assess(DocType::MonthlyFinancials, &e);
        assert!((assessment.aggregate - 0.85).abs() < f64::EPSILON);
        assert!(assessment.findings.is_empty());

        // One unit below routes to review.
        let e = extraction(&[
            ("period_end_date", json!("2026-03-31"), 0.85),
            ("revenue", json!(1000.0), 0.84),
        ]);
        let assessment = evaluator.assess(DocType::MonthlyFinancials, &e);
        assert!(!assessment.findings.is_empty());
    }

    #[test]
    fn test_escalation_decision() {
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        assert_eq!(evaluator.decide(0.5, true), ChainDecision::Continue);
        assert_eq!(evaluator.decide(0.5, false), ChainDecision::Finalize);
        assert_eq!(evaluator.decide(0.85, true), ChainDecision::Finalize);
        assert_eq!(evaluator.decide(0.99, true), ChainDecision::Finalize);
    }

    #[test]
    fn test_missing_required_field_example() {
        // All other fields at 0.95, required account-equivalent missing:
        // aggregate 0, exactly one missing_field finding at high priority.
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        let e = extraction(&[
            ("notice_date", json!("2026-01-10"), 0.95),
            ("due_date", json!("2026-01-24"), 0.95),
        ]);
        let assessment = evaluator.assess(DocType::CapitalCall, &e);
        assert_eq!(assessment.aggregate, 0.0);

        let missing: Vec<&Finding> = assessment
            .findings
            .iter()
            .filter(|f| f.category == ExceptionCategory::MissingField)
            .collect();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].priority, ExceptionPriority::High);
        assert_eq!(missing[0].field_name.as_deref(), Some("call_amount"));
        // Confident fields raise no low-confidence noise.
        assert!(!assessment
            .findings
            .iter()
            .any(|f| f.category == ExceptionCategory::LowConfidence));
    }

    #[test]
    fn test_low_confidence_priority_scales_with_shortfall() {
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        let e = extraction(&[
            ("period_end_date", json!("2026-03-31"), 0.8),
            ("revenue", json!(1000.0), 0.5),
        ]);
        let assessment = evaluator.assess(DocType::MonthlyFinancials, &e);

        let by_field = |name: &str| {
            assessment
                .findings
                .iter()
                .find(|f| {
                    f.category == ExceptionCategory::LowConfidence
                        && f.field_name.as_deref() == Some(name)
                })
                .unwrap()
        };
        // 0.05 below threshold: low. 0.35 below: medium.
        assert_eq!(by_field("period_end_date").priority, ExceptionPriority::Low);
        assert_eq!(by_field("revenue").priority, ExceptionPriority::Medium);
    }

    #[test]
    fn test_cross_field_violation_forces_review() {
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        let e = extraction(&[
            ("period_end_date", json!("2026-03-31"), 0.95),
            ("revenue", json!(1000.0), 0.95),
            ("gross_profit", json!(1500.0), 0.95),
        ]);
        let assessment = evaluator.assess(DocType::MonthlyFinancials, &e);
        // Confidence cleared the bar but the business rule fired.
        assert!(assessment.aggregate >= 0.85);
        assert_eq!(assessment.findings.len(), 1);
        assert_eq!(assessment.findings[0].category, ExceptionCategory::CrossField);
        assert_eq!(assessment.findings[0].priority, ExceptionPriority::High);
    }

    #[test]
    fn test_strict_mode_keeps_low_priority_violations() {
        let fields = &[
            ("period_end_date", json!("2026-03-31"), 0.95),
            ("revenue", json!(1000.0), 0.95),
            ("ebitda_margin", json!(150.0), 0.95),
        ];
        let lenient = ConfidenceEvaluator::new(0.85, false)
            .assess(DocType::MonthlyFinancials, &extraction(fields));
        assert!(lenient.findings.is_empty());

        let strict = ConfidenceEvaluator::new(0.85, true)
            .assess(DocType::MonthlyFinancials, &extraction(fields));
        assert_eq!(strict.findings.len(), 1);
        assert_eq!(
            strict.findings[0].category,
            ExceptionCategory::ValidationError
        );
    }

    #[test]
    fn test_empty_extraction_on_unvalidated_type() {
        let evaluator = ConfidenceEvaluator::new(0.85, false);
        let assessment = evaluator.assess(
            DocType::Unknown,
            &Extraction::new(ProcessorKind::GenericOcr),
        );
        assert_eq!(assessment.aggregate, 0.0);
        assert_eq!(assessment.findings.len(), 1);
        assert_eq!(
            assessment.findings[0].category,
            ExceptionCategory::ExtractionError
        );
        assert_eq!(assessment.findings[0].priority, ExceptionPriority::Critical);
    }
}
