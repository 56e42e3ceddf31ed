//! Exception repository — CRUD and resolution updates for the
//! `exceptions` table. Rows are never deleted (audit trail); terminal
//! states are only written once.

use rusqlite::{params, Row};

use crate::model::{ExceptionCategory, ExceptionPriority};

use super::{Database, DatabaseError};

/// A raw exception row from the database.
#[derive(Debug, Clone)]
pub struct ExceptionRow {
    pub id: String,
    pub document_id: String,
    pub category: String,
    pub reason: String,
    pub field_name: Option<String>,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub priority: String,
    pub status: String,
    pub auto_resolvable: bool,
    pub suggested_resolution: Option<String>,
    pub corrected_value: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ExceptionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            category: row.get("category")?,
            reason: row.get("reason")?,
            field_name: row.get("field_name")?,
            expected_value: row.get("expected_value")?,
            actual_value: row.get("actual_value")?,
            priority: row.get("priority")?,
            status: row.get("status")?,
            auto_resolvable: row.get::<_, i64>("auto_resolvable")? != 0,
            suggested_resolution: row.get("suggested_resolution")?,
            corrected_value: row.get("corrected_value")?,
            resolution_notes: row.get("resolution_notes")?,
            resolved_by: row.get("resolved_by")?,
            resolved_at: row.get("resolved_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// A fresh `open` exception for a detected anomaly.
    #[allow(clippy::too_many_arguments)]
    pub fn new_open(
        document_id: &str,
        category: ExceptionCategory,
        priority: ExceptionPriority,
        reason: &str,
        field_name: Option<&str>,
        expected_value: Option<&str>,
        actual_value: Option<&str>,
        now: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            category: category.as_str().to_string(),
            reason: reason.to_string(),
            field_name: field_name.map(str::to_string),
            expected_value: expected_value.map(str::to_string),
            actual_value: actual_value.map(str::to_string),
            priority: priority.as_str().to_string(),
            status: "open".to_string(),
            auto_resolvable: false,
            suggested_resolution: None,
            corrected_value: None,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// Query filter parameters for exception listing.
#[derive(Debug, Default, Clone)]
pub struct ExceptionFilter {
    pub status: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub document_id: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new exception row.
pub fn insert(db: &Database, exc: &ExceptionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO exceptions (id, document_id, category, reason, field_name,
             expected_value, actual_value, priority, status, auto_resolvable,
             suggested_resolution, corrected_value, resolution_notes, resolved_by,
             resolved_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                exc.id,
                exc.document_id,
                exc.category,
                exc.reason,
                exc.field_name,
                exc.expected_value,
                exc.actual_value,
                exc.priority,
                exc.status,
                exc.auto_resolvable as i64,
                exc.suggested_resolution,
                exc.corrected_value,
                exc.resolution_notes,
                exc.resolved_by,
                exc.resolved_at,
                exc.created_at,
                exc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds an exception by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<ExceptionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM exceptions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ExceptionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries exceptions with filters, returning (rows, total_count).
/// Ordered most urgent first, then newest.
pub fn query(
    db: &Database,
    filter: &ExceptionFilter,
) -> Result<(Vec<ExceptionRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.clone()));
        }
        if let Some(ref category) = filter.category {
            conditions.push(format!("category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(category.clone()));
        }
        if let Some(ref priority) = filter.priority {
            conditions.push(format!("priority = ?{}", param_values.len() + 1));
            param_values.push(Box::new(priority.clone()));
        }
        if let Some(ref document_id) = filter.document_id {
            conditions.push(format!("document_id = ?{}", param_values.len() + 1));
            param_values.push(Box::new(document_id.clone()));
        }
        if let Some(ref from_date) = filter.from_date {
            conditions.push(format!("created_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from_date.clone()));
        }
        if let Some(ref to_date) = filter.to_date {
            conditions.push(format!("created_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to_date.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM exceptions {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM exceptions {}
             ORDER BY CASE priority
                 WHEN 'critical' THEN 0
                 WHEN 'high' THEN 1
                 WHEN 'medium' THEN 2
                 ELSE 3 END,
             created_at DESC
             LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<ExceptionRow> = stmt
            .query_map(params_ref.as_slice(), ExceptionRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

/// Counts unresolved blocking exceptions for a document. Non-blocking
/// categories (unknown_doc_type, other) are excluded.
pub fn count_open_blocking(db: &Database, document_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM exceptions
             WHERE document_id = ?1
               AND status IN ('open', 'in_review')
               AND category NOT IN ('unknown_doc_type', 'other')",
            params![document_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Writes the resolved terminal state with its resolution record.
pub fn mark_resolved(
    db: &Database,
    id: &str,
    corrected_value: Option<&str>,
    notes: Option<&str>,
    resolver: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE exceptions SET status = 'resolved', corrected_value = ?2,
             resolution_notes = ?3, resolved_by = ?4, resolved_at = ?5, updated_at = ?5
             WHERE id = ?1 AND status IN ('open', 'in_review')",
            params![id, corrected_value, notes, resolver, now],
        )?;
        Ok(())
    })
}

/// Writes the ignored terminal state with the reason in notes.
pub fn mark_ignored(
    db: &Database,
    id: &str,
    reason: &str,
    resolver: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE exceptions SET status = 'ignored', resolution_notes = ?2,
             resolved_by = ?3, resolved_at = ?4, updated_at = ?4
             WHERE id = ?1 AND status IN ('open', 'in_review')",
            params![id, reason, resolver, now],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo::{self, DocumentRow};

    const NOW: &str = "2026-01-01T00:00:00+00:00";

    fn test_db_with_doc() -> (Database, String) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let doc = DocumentRow::new_pending("/inbox/doc.pdf", "doc.pdf", None, None, 1, None, NOW);
        let id = doc.id.clone();
        document_repo::insert(&db, &doc).unwrap();
        (db, id)
    }

    fn sample_exception(document_id: &str) -> ExceptionRow {
        ExceptionRow::new_open(
            document_id,
            ExceptionCategory::MissingField,
            ExceptionPriority::High,
            "Required field 'account_number' is missing",
            Some("account_number"),
            None,
            None,
            NOW,
        )
    }

    #[test]
    fn test_insert_and_find() {
        let (db, doc_id) = test_db_with_doc();
        let exc = sample_exception(&doc_id);
        insert(&db, &exc).unwrap();

        let found = find_by_id(&db, &exc.id).unwrap().unwrap();
        assert_eq!(found.category, "missing_field");
        assert_eq!(found.priority, "high");
        assert_eq!(found.status, "open");
        assert_eq!(found.field_name.as_deref(), Some("account_number"));
        assert!(found.resolved_at.is_none());
        assert!(found.corrected_value.is_none());
    }

    #[test]
    fn test_query_ordered_by_priority() {
        let (db, doc_id) = test_db_with_doc();
        let mut low = sample_exception(&doc_id);
        low.priority = "low".to_string();
        insert(&db, &low).unwrap();
        let mut critical = sample_exception(&doc_id);
        critical.priority = "critical".to_string();
        insert(&db, &critical).unwrap();
        let mut medium = sample_exception(&doc_id);
        medium.priority = "medium".to_string();
        insert(&db, &medium).unwrap();

        let (rows, total) = query(&db, &ExceptionFilter::default()).unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows[0].priority, "critical");
        assert_eq!(rows[1].priority, "medium");
        assert_eq!(rows[2].priority, "low");
    }

    #[test]
    fn test_query_with_filters() {
        let (db, doc_id) = test_db_with_doc();
        insert(&db, &sample_exception(&doc_id)).unwrap();
        let mut resolved = sample_exception(&doc_id);
        resolved.status = "resolved".to_string();
        insert(&db, &resolved).unwrap();

        let (rows, total) = query(
            &db,
            &ExceptionFilter {
                status: Some("open".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].status, "open");

        let (_, total) = query(
            &db,
            &ExceptionFilter {
                document_id: Some(doc_id),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_mark_resolved_sets_resolution_record() {
        let (db, doc_id) = test_db_with_doc();
        let exc = sample_exception(&doc_id);
        insert(&db, &exc).unwrap();

        mark_resolved(&db, &exc.id, Some("ACC-1234"), Some("fixed"), "reviewer", NOW).unwrap();

        let found = find_by_id(&db, &exc.id).unwrap().unwrap();
        assert_eq!(found.status, "resolved");
        assert_eq!(found.corrected_value.as_deref(), Some("ACC-1234"));
        assert_eq!(found.resolution_notes.as_deref(), Some("fixed"));
        assert_eq!(found.resolved_by.as_deref(), Some("reviewer"));
        assert!(found.resolved_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_immutable() {
        let (db, doc_id) = test_db_with_doc();
        let exc = sample_exception(&doc_id);
        insert(&db, &exc).unwrap();
        mark_ignored(&db, &exc.id, "not relevant", "reviewer", NOW).unwrap();

        // A later resolve must not touch the ignored row.
        mark_resolved(&db, &exc.id, Some("x"), None, "someone", NOW).unwrap();
        let found = find_by_id(&db, &exc.id).unwrap().unwrap();
        assert_eq!(found.status, "ignored");
        assert!(found.corrected_value.is_none());
    }

    #[test]
    fn test_count_open_blocking_excludes_nonblocking() {
        let (db, doc_id) = test_db_with_doc();
        insert(&db, &sample_exception(&doc_id)).unwrap();
        let mut info = sample_exception(&doc_id);
        info.category = "unknown_doc_type".to_string();
        insert(&db, &info).unwrap();

        assert_eq!(count_open_blocking(&db, &doc_id).unwrap(), 1);
    }

    #[test]
    fn test_count_open_blocking_after_resolution() {
        let (db, doc_id) = test_db_with_doc();
        let exc = sample_exception(&doc_id);
        insert(&db, &exc).unwrap();
        assert_eq!(count_open_blocking(&db, &doc_id).unwrap(), 1);

        mark_resolved(&db, &exc.id, None, None, "reviewer", NOW).unwrap();
        assert_eq!(count_open_blocking(&db, &doc_id).unwrap(), 0);
    }
}
