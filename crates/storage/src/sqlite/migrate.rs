use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Ordered schema versions. Each entry is applied once, in one transaction.
const MIGRATIONS: &[(i64, &[&str])] = &[(
    1,
    &[
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            attempt_id TEXT NOT NULL UNIQUE,
            candidate_id TEXT NOT NULL,
            exam_title TEXT NOT NULL,
            started_at TEXT NOT NULL,
            submitted_at TEXT NOT NULL,
            reason TEXT NOT NULL
                CHECK (reason IN ('candidate', 'time_expired', 'violation_limit')),
            terminated INTEGER NOT NULL CHECK (terminated IN (0, 1)),
            final_marks INTEGER NOT NULL,
            payload TEXT NOT NULL
        );
        ",
        r"
        CREATE TABLE IF NOT EXISTS violation_events (
            attempt_id TEXT NOT NULL,
            violation_id INTEGER NOT NULL CHECK (violation_id > 0),
            category TEXT NOT NULL,
            severity TEXT NOT NULL,
            message TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (attempt_id, violation_id),
            FOREIGN KEY (attempt_id) REFERENCES submissions(attempt_id) ON DELETE CASCADE
        );
        ",
        r"
        CREATE INDEX IF NOT EXISTS idx_submissions_candidate_submitted
            ON submissions (candidate_id, submitted_at);
        ",
    ],
)];

async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
        .bind(version)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Brings the schema up to the latest version. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );
        ",
    )
    .execute(pool)
    .await?;

    for (version, statements) in MIGRATIONS {
        if is_applied(pool, *version).await? {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in *statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)
             ON CONFLICT(version) DO NOTHING",
        )
        .bind(*version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
    }

    Ok(())
}
