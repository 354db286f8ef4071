//! AI usage ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cerberus_core::{Result, UsageRecord, UsageSink};

/// Aggregated spend for a program over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub calls: i64,
    pub failed_calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
}

/// Writes usage records to the `ai_usage` table.
pub struct PgUsageRepository {
    pool: Pool<Postgres>,
}

impl PgUsageRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Totals for one program since `since`.
    pub async fn totals_since(&self, program_id: Uuid, since: DateTime<Utc>) -> Result<UsageTotals> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS calls,
                    COUNT(*) FILTER (WHERE NOT success) AS failed_calls,
                    COALESCE(SUM(tokens_input), 0)::BIGINT AS input_tokens,
                    COALESCE(SUM(tokens_output), 0)::BIGINT AS output_tokens,
                    COALESCE(SUM(cost_usd), 0)::DOUBLE PRECISION AS cost_usd
             FROM ai_usage
             WHERE program_id = $1 AND created_at >= $2",
        )
        .bind(program_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(UsageTotals {
            calls: row.try_get("calls")?,
            failed_calls: row.try_get("failed_calls")?,
            input_tokens: row.try_get("input_tokens")?,
            output_tokens: row.try_get("output_tokens")?,
            cost_usd: row.try_get("cost_usd")?,
        })
    }
}

#[async_trait]
impl UsageSink for PgUsageRepository {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO ai_usage (program_id, module, job_type, model, tokens_input,
                                   tokens_output, tokens_cached, cost_usd, duration_ms,
                                   success, error_kind, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(record.program_id)
        .bind(&record.module)
        .bind(&record.operation)
        .bind(&record.model)
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.cached_tokens as i64)
        .bind(record.cost_usd)
        .bind(record.duration_ms as i64)
        .bind(record.success)
        .bind(&record.error_kind)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
