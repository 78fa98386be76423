use crate::error::{AppError, Result};
use crate::models::TrustScore;
use sqlx::PgPool;
use uuid::Uuid;

pub struct TrustScoreRepository {
    pool: PgPool,
}

impl TrustScoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, score: &TrustScore) -> Result<TrustScore> {
        let row = sqlx::query_as::<_, TrustScore>(
            r#"
            INSERT INTO trust_scores (
                id, subject_ref, score, confidence, model_version, decision,
                reason_codes, signals_snapshot, explanation, processing_time_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, subject_ref, score, confidence, model_version, decision,
                reason_codes, signals_snapshot, explanation, processing_time_ms, created_at
            "#,
        )
        .bind(score.id)
        .bind(score.subject_ref)
        .bind(score.score)
        .bind(score.confidence)
        .bind(&score.model_version)
        .bind(score.decision)
        .bind(&score.reason_codes)
        .bind(&score.signals_snapshot)
        .bind(&score.explanation)
        .bind(score.processing_time_ms)
        .bind(score.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Most recent score for a subject; callers use this to cache the
    /// decision across retries within the same evaluation window.
    pub async fn find_latest(&self, subject_ref: Uuid) -> Result<Option<TrustScore>> {
        let row = sqlx::query_as::<_, TrustScore>(
            r#"
            SELECT id, subject_ref, score, confidence, model_version, decision,
                reason_codes, signals_snapshot, explanation, processing_time_ms, created_at
            FROM trust_scores
            WHERE subject_ref = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(subject_ref)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_history(&self, subject_ref: Uuid, limit: i64) -> Result<Vec<TrustScore>> {
        let rows = sqlx::query_as::<_, TrustScore>(
            r#"
            SELECT id, subject_ref, score, confidence, model_version, decision,
                reason_codes, signals_snapshot, explanation, processing_time_ms, created_at
            FROM trust_scores
            WHERE subject_ref = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(subject_ref)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
