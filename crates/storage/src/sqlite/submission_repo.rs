use exam_core::model::{AttemptId, SubmissionSnapshot, ViolationEvent};

use super::SqliteRepository;
use super::mapping::{map_submission_row, map_violation_row, ser, violation_id_to_i64};
use crate::repository::{StorageError, SubmissionRecord, SubmissionRepository};

fn write_err(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Conflict,
        _ => StorageError::Connection(e.to_string()),
    }
}

#[async_trait::async_trait]
impl SubmissionRepository for SqliteRepository {
    async fn append_submission(&self, snapshot: &SubmissionSnapshot) -> Result<i64, StorageError> {
        let payload = serde_json::to_string(snapshot).map_err(ser)?;
        let attempt = snapshot.attempt_id.to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let res = sqlx::query(
            r"
                INSERT INTO submissions (
                    attempt_id, candidate_id, exam_title, started_at, submitted_at,
                    reason, terminated, final_marks, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(attempt.as_str())
        .bind(&snapshot.candidate_id)
        .bind(&snapshot.exam_title)
        .bind(snapshot.started_at)
        .bind(snapshot.submitted_at)
        .bind(snapshot.reason.as_str())
        .bind(i64::from(snapshot.terminated))
        .bind(snapshot.score.final_marks)
        .bind(payload)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        for event in &snapshot.violations {
            sqlx::query(
                r"
                    INSERT INTO violation_events (
                        attempt_id, violation_id, category, severity, message, recorded_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(attempt.as_str())
            .bind(violation_id_to_i64(event.id)?)
            .bind(event.category.as_str())
            .bind(event.severity.as_str())
            .bind(&event.message)
            .bind(event.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, attempt_id, candidate_id, reason, terminated,
                       submitted_at, final_marks, payload
                FROM submissions
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_submission_row(&row)
    }

    async fn find_by_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<SubmissionRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, attempt_id, candidate_id, reason, terminated,
                       submitted_at, final_marks, payload
                FROM submissions
                WHERE attempt_id = ?1
            ",
        )
        .bind(attempt_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_submission_row).transpose()
    }

    async fn list_violations(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<ViolationEvent>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT violation_id, category, severity, message, recorded_at
                FROM violation_events
                WHERE attempt_id = ?1
                ORDER BY violation_id ASC
            ",
        )
        .bind(attempt_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_violation_row(&row)?);
        }
        Ok(out)
    }
}
