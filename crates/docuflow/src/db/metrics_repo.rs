//! Metrics repository — read-only aggregates for the dashboard and trend
//! endpoints, computed straight from the document/exception store.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Aggregate dashboard counters for a trailing window of days.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    pub period_days: u32,
    pub total_documents: i64,
    pub documents_by_status: BTreeMap<String, i64>,
    pub documents_by_type: BTreeMap<String, i64>,
    pub processor_usage: BTreeMap<String, i64>,
    /// Share of terminal extractions that needed no review, in percent.
    pub automation_rate: f64,
    pub avg_confidence: f64,
    pub avg_processing_time_ms: f64,
    pub open_exceptions: i64,
    pub exceptions_by_status: BTreeMap<String, i64>,
    pub exceptions_by_category: BTreeMap<String, i64>,
    pub exceptions_by_priority: BTreeMap<String, i64>,
    pub avg_resolution_hours: f64,
}

/// One day of document activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentTrendPoint {
    pub period: String,
    pub total: i64,
    pub processed: i64,
    pub needs_review: i64,
    pub failed: i64,
    pub avg_confidence: f64,
}

/// One day of exception activity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionTrendPoint {
    pub period: String,
    pub created: i64,
    pub resolved: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetrics {
    pub period_days: u32,
    pub document_trends: Vec<DocumentTrendPoint>,
    pub exception_trends: Vec<ExceptionTrendPoint>,
}

fn cutoff_for(days: u32) -> String {
    (chrono::Utc::now() - chrono::Duration::days(i64::from(days))).to_rfc3339()
}

fn group_counts(
    conn: &Connection,
    sql: &str,
    cutoff: &str,
) -> Result<BTreeMap<String, i64>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![cutoff], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

/// Computes the dashboard snapshot for the trailing `days` window.
pub fn dashboard(db: &Database, days: u32) -> Result<DashboardMetrics, DatabaseError> {
    let cutoff = cutoff_for(days);
    db.with_conn(|conn| {
        let total_documents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE created_at >= ?1",
            params![cutoff],
            |r| r.get(0),
        )?;

        let documents_by_status = group_counts(
            conn,
            "SELECT status, COUNT(*) FROM documents WHERE created_at >= ?1 GROUP BY status",
            &cutoff,
        )?;
        let documents_by_type = group_counts(
            conn,
            "SELECT COALESCE(doc_type, 'unknown'), COUNT(*) FROM documents
             WHERE created_at >= ?1 GROUP BY COALESCE(doc_type, 'unknown')",
            &cutoff,
        )?;
        let processor_usage = group_counts(
            conn,
            "SELECT processor_used, COUNT(*) FROM documents
             WHERE created_at >= ?1 AND processor_used IS NOT NULL GROUP BY processor_used",
            &cutoff,
        )?;

        let processed = documents_by_status.get("processed").copied().unwrap_or(0);
        let needs_review = documents_by_status
            .get("needs_review")
            .copied()
            .unwrap_or(0);
        let terminal = processed + needs_review;
        let automation_rate = if terminal > 0 {
            processed as f64 / terminal as f64 * 100.0
        } else {
            0.0
        };

        let avg_confidence: f64 = conn.query_row(
            "SELECT COALESCE(AVG(confidence), 0) FROM documents
             WHERE created_at >= ?1 AND confidence IS NOT NULL",
            params![cutoff],
            |r| r.get(0),
        )?;
        let avg_processing_time_ms: f64 = conn.query_row(
            "SELECT COALESCE(AVG(processing_time_ms), 0) FROM documents
             WHERE created_at >= ?1 AND processing_time_ms IS NOT NULL",
            params![cutoff],
            |r| r.get(0),
        )?;

        let open_exceptions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM exceptions WHERE status = 'open'",
            [],
            |r| r.get(0),
        )?;
        let exceptions_by_status = group_counts(
            conn,
            "SELECT status, COUNT(*) FROM exceptions WHERE created_at >= ?1 GROUP BY status",
            &cutoff,
        )?;
        let exceptions_by_category = group_counts(
            conn,
            "SELECT category, COUNT(*) FROM exceptions WHERE created_at >= ?1 GROUP BY category",
            &cutoff,
        )?;
        let exceptions_by_priority = group_counts(
            conn,
            "SELECT priority, COUNT(*) FROM exceptions WHERE created_at >= ?1 GROUP BY priority",
            &cutoff,
        )?;

        let avg_resolution_hours: f64 = conn.query_row(
            "SELECT COALESCE(AVG((julianday(resolved_at) - julianday(created_at)) * 24), 0)
             FROM exceptions WHERE status = 'resolved' AND resolved_at IS NOT NULL",
            [],
            |r| r.get(0),
        )?;

        Ok(DashboardMetrics {
            period_days: days,
            total_documents,
            documents_by_status,
            documents_by_type,
            processor_usage,
            automation_rate,
            avg_confidence,
            avg_processing_time_ms,
            open_exceptions,
            exceptions_by_status,
            exceptions_by_category,
            exceptions_by_priority,
            avg_resolution_hours,
        })
    })
}

/// Computes per-day trend series for the trailing `days` window.
pub fn trends(db: &Database, days: u32) -> Result<TrendMetrics, DatabaseError> {
    let cutoff = cutoff_for(days);
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS period,
                    COUNT(*),
                    SUM(CASE WHEN status = 'processed' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'needs_review' THEN 1 ELSE 0 END),
                    SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END),
                    COALESCE(AVG(confidence), 0)
             FROM documents WHERE created_at >= ?1
             GROUP BY period ORDER BY period",
        )?;
        let document_trends: Vec<DocumentTrendPoint> = stmt
            .query_map(params![cutoff], |row| {
                Ok(DocumentTrendPoint {
                    period: row.get(0)?,
                    total: row.get(1)?,
                    processed: row.get(2)?,
                    needs_review: row.get(3)?,
                    failed: row.get(4)?,
                    avg_confidence: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT substr(created_at, 1, 10) AS period,
                    COUNT(*),
                    SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END)
             FROM exceptions WHERE created_at >= ?1
             GROUP BY period ORDER BY period",
        )?;
        let exception_trends: Vec<ExceptionTrendPoint> = stmt
            .query_map(params![cutoff], |row| {
                Ok(ExceptionTrendPoint {
                    period: row.get(0)?,
                    created: row.get(1)?,
                    resolved: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TrendMetrics {
            period_days: days,
            document_trends,
            exception_trends,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo::{self, DocumentRow};
    use crate::db::exception_repo::{self, ExceptionRow};
    use crate::model::{ExceptionCategory, ExceptionPriority};

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn recent(offset_hours: i64) -> String {
        (chrono::Utc::now() - chrono::Duration::hours(offset_hours)).to_rfc3339()
    }

    fn doc_with_status(path: &str, status: &str, confidence: Option<f64>) -> DocumentRow {
        let now = recent(1);
        let mut doc = DocumentRow::new_pending(path, "doc.pdf", None, None, 1, None, &now);
        doc.status = status.to_string();
        doc.confidence = confidence;
        if status != "pending" {
            doc.processing_time_ms = Some(1200);
            doc.processor_used = Some("form_parser".to_string());
        }
        doc
    }

    #[test]
    fn test_dashboard_counts_and_automation_rate() {
        let db = test_db();
        document_repo::insert(&db, &doc_with_status("/i/a.pdf", "processed", Some(0.95))).unwrap();
        document_repo::insert(&db, &doc_with_status("/i/b.pdf", "processed", Some(0.91))).unwrap();
        document_repo::insert(&db, &doc_with_status("/i/c.pdf", "needs_review", Some(0.5)))
            .unwrap();
        document_repo::insert(&db, &doc_with_status("/i/d.pdf", "pending", None)).unwrap();

        let metrics = dashboard(&db, 30).unwrap();
        assert_eq!(metrics.total_documents, 4);
        assert_eq!(metrics.documents_by_status.get("processed"), Some(&2));
        assert_eq!(metrics.documents_by_status.get("needs_review"), Some(&1));
        // 2 of 3 terminal extractions were untouched by review.
        assert!((metrics.automation_rate - 66.666).abs() < 0.1);
        assert!(metrics.avg_confidence > 0.0);
        assert_eq!(metrics.processor_usage.get("form_parser"), Some(&3));
    }

    #[test]
    fn test_dashboard_exception_counters() {
        let db = test_db();
        let doc = doc_with_status("/i/a.pdf", "needs_review", Some(0.4));
        let doc_id = doc.id.clone();
        document_repo::insert(&db, &doc).unwrap();

        let now = recent(2);
        exception_repo::insert(
            &db,
            &ExceptionRow::new_open(
                &doc_id,
                ExceptionCategory::MissingField,
                ExceptionPriority::High,
                "missing",
                Some("revenue"),
                None,
                None,
                &now,
            ),
        )
        .unwrap();
        let resolved = ExceptionRow::new_open(
            &doc_id,
            ExceptionCategory::LowConfidence,
            ExceptionPriority::Medium,
            "low",
            Some("ebitda"),
            None,
            None,
            &now,
        );
        exception_repo::insert(&db, &resolved).unwrap();
        exception_repo::mark_resolved(&db, &resolved.id, None, None, "reviewer", &recent(1))
            .unwrap();

        let metrics = dashboard(&db, 30).unwrap();
        assert_eq!(metrics.open_exceptions, 1);
        assert_eq!(metrics.exceptions_by_status.get("open"), Some(&1));
        assert_eq!(metrics.exceptions_by_status.get("resolved"), Some(&1));
        assert_eq!(metrics.exceptions_by_category.get("missing_field"), Some(&1));
        assert!(metrics.avg_resolution_hours > 0.0);
    }

    #[test]
    fn test_dashboard_empty_store() {
        let db = test_db();
        let metrics = dashboard(&db, 7).unwrap();
        assert_eq!(metrics.total_documents, 0);
        assert_eq!(metrics.automation_rate, 0.0);
        assert_eq!(metrics.open_exceptions, 0);
    }

    #[test]
    fn test_trends_grouped_by_day() {
        let db = test_db();
        document_repo::insert(&db, &doc_with_status("/i/a.pdf", "processed", Some(0.9))).unwrap();
        document_repo::insert(&db, &doc_with_status("/i/b.pdf", "failed", None)).unwrap();

        let metrics = trends(&db, 30).unwrap();
        assert!(!metrics.document_trends.is_empty());
        let total: i64 = metrics.document_trends.iter().map(|p| p.total).sum();
        assert_eq!(total, 2);
        let failed: i64 = metrics.document_trends.iter().map(|p| p.failed).sum();
        assert_eq!(failed, 1);
    }
}
