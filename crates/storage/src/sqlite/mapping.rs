use exam_core::model::{
    AttemptId, Severity, SubmissionSnapshot, SubmitReason, ViolationCategory, ViolationEvent,
    ViolationId,
};
use sqlx::Row;

use crate::repository::{StorageError, SubmissionRecord};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn violation_id_to_i64(id: ViolationId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("violation_id overflow".into()))
}

pub(crate) fn violation_id_from_i64(v: i64) -> Result<ViolationId, StorageError> {
    Ok(ViolationId::new(i64_to_u64("violation_id", v)?))
}

pub(crate) fn attempt_id_from_str(s: &str) -> Result<AttemptId, StorageError> {
    s.parse::<AttemptId>().map_err(ser)
}

pub(crate) fn parse_reason(s: &str) -> Result<SubmitReason, StorageError> {
    match s {
        "candidate" => Ok(SubmitReason::Candidate),
        "time_expired" => Ok(SubmitReason::TimeExpired),
        "violation_limit" => Ok(SubmitReason::ViolationLimit),
        _ => Err(StorageError::Serialization(format!("invalid reason: {s}"))),
    }
}

pub(crate) fn map_submission_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SubmissionRecord, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    let snapshot: SubmissionSnapshot = serde_json::from_str(&payload).map_err(ser)?;

    let attempt_str: String = row.try_get("attempt_id").map_err(ser)?;
    let reason_str: String = row.try_get("reason").map_err(ser)?;
    let terminated: i64 = row.try_get("terminated").map_err(ser)?;

    Ok(SubmissionRecord {
        id: row.try_get("id").map_err(ser)?,
        attempt_id: attempt_id_from_str(&attempt_str)?,
        candidate_id: row.try_get("candidate_id").map_err(ser)?,
        reason: parse_reason(&reason_str)?,
        terminated: terminated != 0,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        final_marks: row.try_get("final_marks").map_err(ser)?,
        snapshot,
    })
}

pub(crate) fn map_violation_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ViolationEvent, StorageError> {
    let category_str: String = row.try_get("category").map_err(ser)?;
    let severity_str: String = row.try_get("severity").map_err(ser)?;

    Ok(ViolationEvent {
        id: violation_id_from_i64(row.try_get::<i64, _>("violation_id").map_err(ser)?)?,
        category: ViolationCategory::parse(&category_str).ok_or_else(|| {
            StorageError::Serialization(format!("invalid category: {category_str}"))
        })?,
        severity: Severity::parse(&severity_str).ok_or_else(|| {
            StorageError::Serialization(format!("invalid severity: {severity_str}"))
        })?,
        message: row.try_get("message").map_err(ser)?,
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_match_serde_names() {
        for reason in [
            SubmitReason::Candidate,
            SubmitReason::TimeExpired,
            SubmitReason::ViolationLimit,
        ] {
            assert_eq!(parse_reason(reason.as_str()).unwrap(), reason);
        }
        assert!(parse_reason("quit").is_err());
    }

    #[test]
    fn negative_violation_id_is_rejected() {
        assert!(violation_id_from_i64(-1).is_err());
        assert_eq!(violation_id_from_i64(3).unwrap(), ViolationId::new(3));
    }
}
