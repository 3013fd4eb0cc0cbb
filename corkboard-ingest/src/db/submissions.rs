//! Submission database operations

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use corkboard_common::Result;

use crate::models::{Submission, SubmissionStatus};

/// Insert or update a submission
pub async fn save_submission(pool: &SqlitePool, submission: &Submission) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO submissions (
            submission_id, status, source_label, error_message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(submission_id) DO UPDATE SET
            status = excluded.status,
            error_message = excluded.error_message,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(submission.submission_id.to_string())
    .bind(submission.status.as_str())
    .bind(&submission.source_label)
    .bind(&submission.error_message)
    .bind(submission.created_at.to_rfc3339())
    .bind(submission.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load one submission by id
pub async fn load_submission(pool: &SqlitePool, submission_id: Uuid) -> Result<Option<Submission>> {
    let row = sqlx::query(
        r#"
        SELECT submission_id, status, source_label, error_message, created_at, updated_at
        FROM submissions
        WHERE submission_id = ?
        "#,
    )
    .bind(submission_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| submission_from_row(&row)).transpose()
}

/// Submission counts grouped by lifecycle status
pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT status, COUNT(*) AS n
        FROM submissions
        GROUP BY status
        ORDER BY status
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("n")))
        .collect())
}

fn submission_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Submission> {
    let id_str: String = row.get("submission_id");
    let submission_id = Uuid::parse_str(&id_str)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse submission_id: {}", e)))?;

    let status_str: String = row.get("status");
    let status = SubmissionStatus::parse(&status_str).ok_or_else(|| {
        corkboard_common::Error::Internal(format!("Unknown submission status: {}", status_str))
    })?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| corkboard_common::Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(Submission {
        submission_id,
        status,
        source_label: row.get("source_label"),
        error_message: row.get("error_message"),
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory database");
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_load_submission() {
        let pool = test_pool().await;

        let mut submission = Submission::new(Some("board.jpg".to_string()));
        save_submission(&pool, &submission).await.unwrap();

        let loaded = load_submission(&pool, submission.submission_id)
            .await
            .unwrap()
            .expect("Submission not found");
        assert_eq!(loaded.status, SubmissionStatus::Uploaded);
        assert_eq!(loaded.source_label.as_deref(), Some("board.jpg"));

        // Transition persists in place, no second row
        submission.transition_to(SubmissionStatus::Processing);
        save_submission(&pool, &submission).await.unwrap();

        let loaded = load_submission(&pool, submission.submission_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Processing);

        let counts = count_by_status(&pool).await.unwrap();
        assert_eq!(counts, vec![("processing".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_error_message_round_trip() {
        let pool = test_pool().await;

        let mut submission = Submission::new(None);
        submission.fail("extraction produced no JSON");
        save_submission(&pool, &submission).await.unwrap();

        let loaded = load_submission(&pool, submission.submission_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, SubmissionStatus::Error);
        assert_eq!(
            loaded.error_message.as_deref(),
            Some("extraction produced no JSON")
        );
        assert!(loaded.is_terminal());
    }
}
