use async_trait::async_trait;
use prep_core::model::SubjectScore;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::SqliteRepository;
use super::mapping::{conn, parse_mode, ser, u32_from_i64};
use crate::repository::{
    ExamResultRecord, ExamResultRepository, ExamResultRow, StorageError, SubjectAccuracy,
};

fn map_result_row(row: &SqliteRow, subjects: Vec<SubjectScore>) -> Result<ExamResultRecord, StorageError> {
    let mode: String = row.try_get("mode").map_err(ser)?;
    Ok(ExamResultRecord {
        mode: parse_mode(&mode)?,
        subject_filter: row.try_get("subject_filter").map_err(ser)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        finished_at: row.try_get("finished_at").map_err(ser)?,
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        answered: u32_from_i64("answered", row.try_get::<i64, _>("answered").map_err(ser)?)?,
        total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
        remaining_seconds: u32_from_i64(
            "remaining_seconds",
            row.try_get::<i64, _>("remaining_seconds").map_err(ser)?,
        )?,
        subjects,
    })
}

fn map_subject_row(row: &SqliteRow) -> Result<SubjectScore, StorageError> {
    Ok(SubjectScore {
        subject: row.try_get("subject").map_err(ser)?,
        correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
        total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
    })
}

impl SqliteRepository {
    async fn subjects_for(&self, result_id: i64) -> Result<Vec<SubjectScore>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT subject, correct, total
                FROM exam_result_subjects
                WHERE result_id = ?1
                ORDER BY subject
            ",
        )
        .bind(result_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_subject_row).collect()
    }
}

#[async_trait]
impl ExamResultRepository for SqliteRepository {
    async fn append_result(&self, record: &ExamResultRecord) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                INSERT INTO exam_results (
                    mode, subject_filter, started_at, finished_at,
                    correct, answered, total, remaining_seconds
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(record.mode.key())
        .bind(record.subject_filter.as_deref())
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(i64::from(record.correct))
        .bind(i64::from(record.answered))
        .bind(i64::from(record.total))
        .bind(i64::from(record.remaining_seconds))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;
        let id = res.last_insert_rowid();

        for subject in &record.subjects {
            sqlx::query(
                r"
                    INSERT INTO exam_result_subjects (result_id, subject, correct, total)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id)
            .bind(subject.subject.as_str())
            .bind(i64::from(subject.correct))
            .bind(i64::from(subject.total))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(id, mode = %record.mode, "exam result stored");
        Ok(id)
    }

    async fn get_result(&self, id: i64) -> Result<ExamResultRecord, StorageError> {
        let row = sqlx::query(
            r"
                SELECT mode, subject_filter, started_at, finished_at,
                       correct, answered, total, remaining_seconds
                FROM exam_results
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let subjects = self.subjects_for(id).await?;
        map_result_row(&row, subjects)
    }

    async fn list_results(&self, limit: u32) -> Result<Vec<ExamResultRow>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, mode, subject_filter, started_at, finished_at,
                       correct, answered, total, remaining_seconds
                FROM exam_results
                ORDER BY finished_at DESC, id DESC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let subjects = self.subjects_for(id).await?;
            out.push(ExamResultRow {
                id,
                record: map_result_row(row, subjects)?,
            });
        }
        Ok(out)
    }

    async fn subject_accuracy(&self) -> Result<Vec<SubjectAccuracy>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT subject,
                       SUM(correct) AS correct,
                       SUM(total) AS total
                FROM exam_result_subjects
                GROUP BY subject
                ORDER BY subject
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                Ok(SubjectAccuracy {
                    subject: row.try_get("subject").map_err(ser)?,
                    correct: u32_from_i64("correct", row.try_get::<i64, _>("correct").map_err(ser)?)?,
                    total: u32_from_i64("total", row.try_get::<i64, _>("total").map_err(ser)?)?,
                })
            })
            .collect()
    }
}
