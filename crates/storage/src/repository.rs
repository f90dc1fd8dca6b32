use async_trait::async_trait;
use chrono::{DateTime, Utc};
use exam_core::model::{AttemptId, SubmissionSnapshot, SubmitReason, ViolationEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for a delivered submission.
///
/// The full snapshot travels as a JSON payload; the flat columns exist so
/// attempts can be listed without decoding every payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub id: i64,
    pub attempt_id: AttemptId,
    pub candidate_id: String,
    pub reason: SubmitReason,
    pub terminated: bool,
    pub submitted_at: DateTime<Utc>,
    pub final_marks: i64,
    pub snapshot: SubmissionSnapshot,
}

/// Repository contract for submitted attempts and their violation history.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Persist a submission together with its violation events.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt was already stored.
    async fn append_submission(&self, snapshot: &SubmissionSnapshot) -> Result<i64, StorageError>;

    /// Fetch a stored submission by row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no row matches.
    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError>;

    /// Look up the submission for an attempt, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_by_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<SubmissionRecord>, StorageError>;

    /// Violation events recorded for an attempt, in ledger order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_violations(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<ViolationEvent>, StorageError>;
}

impl SubmissionRecord {
    fn from_snapshot(id: i64, snapshot: &SubmissionSnapshot) -> Self {
        Self {
            id,
            attempt_id: snapshot.attempt_id,
            candidate_id: snapshot.candidate_id.clone(),
            reason: snapshot.reason,
            terminated: snapshot.terminated,
            submitted_at: snapshot.submitted_at,
            final_marks: snapshot.score.final_marks,
            snapshot: snapshot.clone(),
        }
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    submissions: Arc<Mutex<Vec<SubmissionRecord>>>,
    by_attempt: Arc<Mutex<HashMap<AttemptId, i64>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionRepository for InMemoryRepository {
    async fn append_submission(&self, snapshot: &SubmissionSnapshot) -> Result<i64, StorageError> {
        let mut index = self
            .by_attempt
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if index.contains_key(&snapshot.attempt_id) {
            return Err(StorageError::Conflict);
        }
        let mut rows = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(rows.len() + 1)
            .map_err(|_| StorageError::Serialization("submission id overflow".into()))?;
        rows.push(SubmissionRecord::from_snapshot(id, snapshot));
        index.insert(snapshot.attempt_id, id);
        Ok(id)
    }

    async fn get_submission(&self, id: i64) -> Result<SubmissionRecord, StorageError> {
        let rows = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        rows.iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn find_by_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Option<SubmissionRecord>, StorageError> {
        let rows = self
            .submissions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(rows.iter().find(|r| r.attempt_id == attempt_id).cloned())
    }

    async fn list_violations(
        &self,
        attempt_id: AttemptId,
    ) -> Result<Vec<ViolationEvent>, StorageError> {
        Ok(self
            .find_by_attempt(attempt_id)
            .await?
            .map(|r| r.snapshot.violations)
            .unwrap_or_default())
    }
}

/// Aggregates repository implementations behind trait objects.
#[derive(Clone)]
pub struct Storage {
    pub submissions: Arc<dyn SubmissionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo: Arc<dyn SubmissionRepository> = Arc::new(InMemoryRepository::new());
        Self { submissions: repo }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{
        ExamPaper, ExamSession, PaperSection, ProctoringSettings, Question, Severity,
        ViolationCandidate, ViolationCategory,
    };
    use exam_core::model::{Choice, QuestionId};
    use exam_core::proctoring::ViolationAggregator;
    use exam_core::time::fixed_now;

    fn build_snapshot(reason: SubmitReason) -> SubmissionSnapshot {
        let paper = ExamPaper {
            title: "Mock".into(),
            duration_secs: 600,
            marking: Default::default(),
            sections: vec![PaperSection {
                name: "Only".into(),
                questions: vec![Question {
                    id: QuestionId::new(1),
                    number: 1,
                    text: "2 + 2".into(),
                    options: ["4".into(), "3".into(), "5".into(), "22".into()],
                    correct: Choice::A,
                }],
            }],
        };
        let mut session = ExamSession::start(&paper, AttemptId::generate(), fixed_now()).unwrap();
        let mut aggregator = ViolationAggregator::new(&ProctoringSettings::default());
        aggregator.ingest(ViolationCandidate::new(
            ViolationCategory::Noise,
            Severity::Medium,
            "noise",
            fixed_now(),
        ));
        session.select(Choice::A);
        session.save_and_next();
        session.submit(reason, fixed_now());
        SubmissionSnapshot::capture("APP-7", &paper, &session, &aggregator).unwrap()
    }

    #[tokio::test]
    async fn appends_and_finds_by_attempt() {
        let repo = InMemoryRepository::new();
        let snapshot = build_snapshot(SubmitReason::Candidate);

        let id = repo.append_submission(&snapshot).await.unwrap();
        let record = repo.get_submission(id).await.unwrap();
        assert_eq!(record.final_marks, 4);
        assert!(!record.terminated);

        let found = repo.find_by_attempt(snapshot.attempt_id).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(id));

        let violations = repo.list_violations(snapshot.attempt_id).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].category, ViolationCategory::Noise);
    }

    #[tokio::test]
    async fn duplicate_attempt_is_conflict() {
        let repo = InMemoryRepository::new();
        let snapshot = build_snapshot(SubmitReason::TimeExpired);
        repo.append_submission(&snapshot).await.unwrap();

        let err = repo.append_submission(&snapshot).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn missing_submission_is_not_found() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.get_submission(42).await,
            Err(StorageError::NotFound)
        ));
        assert!(
            repo.list_violations(AttemptId::generate())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
