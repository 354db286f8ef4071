//! Artifact repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use cerberus_core::{
    AnalysisResult, Artifact, ArtifactRepository, Fact, Insight, Person, ProcessingStatus, Result,
    Summary, Topic,
};

const ARTIFACT_COLUMNS: &str = "artifact_id, program_id, filename, mime_type, file_size_bytes, \
     storage_path, raw_content, processing_status, artifact_category, ai_model_version, \
     ai_processing_time_ms, processing_error, uploaded_at, processed_at";

/// PostgreSQL implementation of ArtifactRepository.
pub struct PgArtifactRepository {
    pool: Pool<Postgres>,
}

impl PgArtifactRepository {
    /// Create a new PgArtifactRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a new artifact row.
    ///
    /// Uploads normally arrive through the API service; this exists for
    /// seeding and tests.
    pub async fn insert(&self, artifact: &Artifact) -> Result<()> {
        sqlx::query(
            "INSERT INTO artifacts (artifact_id, program_id, filename, mime_type, file_size_bytes,
                                    storage_path, raw_content, processing_status, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(artifact.artifact_id)
        .bind(artifact.program_id)
        .bind(&artifact.filename)
        .bind(&artifact.mime_type)
        .bind(artifact.file_size_bytes)
        .bind(&artifact.storage_path)
        .bind(&artifact.raw_content)
        .bind(artifact.processing_status.as_str())
        .bind(artifact.uploaded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_analysis_tx(
        tx: &mut Transaction<'_, Postgres>,
        artifact_id: Uuid,
    ) -> Result<()> {
        for table in [
            "artifact_summaries",
            "artifact_topics",
            "artifact_persons",
            "artifact_facts",
            "artifact_insights",
        ] {
            sqlx::query(&format!("DELETE FROM {} WHERE artifact_id = $1", table))
                .bind(artifact_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn insert_analysis_tx(
        tx: &mut Transaction<'_, Postgres>,
        artifact_id: Uuid,
        result: &AnalysisResult,
    ) -> Result<()> {
        let summary = &result.summary;
        sqlx::query(
            "INSERT INTO artifact_summaries
                 (artifact_id, executive_summary, key_takeaways, sentiment, priority, confidence)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(artifact_id)
        .bind(&summary.executive_summary)
        .bind(&summary.key_takeaways)
        .bind(&summary.sentiment)
        .bind(summary.priority)
        .bind(summary.confidence)
        .execute(&mut **tx)
        .await?;

        for topic in &result.topics {
            sqlx::query(
                "INSERT INTO artifact_topics (artifact_id, name, confidence) VALUES ($1, $2, $3)",
            )
            .bind(artifact_id)
            .bind(&topic.name)
            .bind(topic.confidence)
            .execute(&mut **tx)
            .await?;
        }

        for person in &result.persons {
            sqlx::query(
                "INSERT INTO artifact_persons
                     (artifact_id, name, role, organization, context, confidence)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(artifact_id)
            .bind(&person.name)
            .bind(&person.role)
            .bind(&person.organization)
            .bind(&person.context)
            .bind(person.confidence)
            .execute(&mut **tx)
            .await?;
        }

        for fact in &result.facts {
            sqlx::query(
                "INSERT INTO artifact_facts
                     (artifact_id, fact_type, key, value, numeric_value, date_value, unit, confidence)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(artifact_id)
            .bind(&fact.fact_type)
            .bind(&fact.key)
            .bind(&fact.value)
            .bind(fact.numeric_value)
            .bind(fact.date_value)
            .bind(&fact.unit)
            .bind(fact.confidence)
            .execute(&mut **tx)
            .await?;
        }

        for insight in &result.insights {
            sqlx::query(
                "INSERT INTO artifact_insights
                     (artifact_id, insight_type, title, description, severity,
                      suggested_action, impacted_modules, confidence)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(artifact_id)
            .bind(&insight.insight_type)
            .bind(&insight.title)
            .bind(&insight.description)
            .bind(&insight.severity)
            .bind(&insight.suggested_action)
            .bind(&insight.impacted_modules)
            .bind(insight.confidence)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

fn artifact_from_row(row: &PgRow) -> Result<Artifact> {
    let status: String = row.try_get("processing_status")?;
    Ok(Artifact {
        artifact_id: row.try_get("artifact_id")?,
        program_id: row.try_get("program_id")?,
        filename: row.try_get("filename")?,
        mime_type: row.try_get("mime_type")?,
        file_size_bytes: row.try_get("file_size_bytes")?,
        storage_path: row.try_get("storage_path")?,
        raw_content: row.try_get("raw_content")?,
        processing_status: status.parse::<ProcessingStatus>()?,
        artifact_category: row.try_get("artifact_category")?,
        ai_model_version: row.try_get("ai_model_version")?,
        ai_processing_time_ms: row.try_get("ai_processing_time_ms")?,
        processing_error: row.try_get("processing_error")?,
        uploaded_at: row.try_get::<DateTime<Utc>, _>("uploaded_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

#[async_trait]
impl ArtifactRepository for PgArtifactRepository {
    async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM artifacts WHERE artifact_id = $1 AND deleted_at IS NULL",
            ARTIFACT_COLUMNS
        ))
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(artifact_from_row).transpose()
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Artifact>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM artifacts
             WHERE processing_status = 'pending' AND deleted_at IS NULL
             ORDER BY uploaded_at ASC
             LIMIT $1",
            ARTIFACT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(artifact_from_row).collect()
    }

    async fn claim(&self, artifact_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE artifacts SET processing_status = 'processing', processing_error = NULL
             WHERE artifact_id = $1 AND processing_status = 'pending' AND deleted_at IS NULL",
        )
        .bind(artifact_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn store_extracted_text(&self, artifact_id: Uuid, text: &str) -> Result<()> {
        sqlx::query("UPDATE artifacts SET raw_content = $2 WHERE artifact_id = $1")
            .bind(artifact_id)
            .bind(text)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn replace_analysis(&self, artifact_id: Uuid, result: &AnalysisResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        Self::delete_analysis_tx(&mut tx, artifact_id).await?;
        Self::insert_analysis_tx(&mut tx, artifact_id, result).await?;

        sqlx::query(
            "UPDATE artifacts
             SET artifact_category = COALESCE($2, artifact_category),
                 category_confidence = COALESCE($3, category_confidence)
             WHERE artifact_id = $1",
        )
        .bind(artifact_id)
        .bind(&result.document_type)
        .bind(result.document_type_confidence)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            artifact_id = %artifact_id,
            topics = result.topics.len(),
            persons = result.persons.len(),
            facts = result.facts.len(),
            insights = result.insights.len(),
            "Analysis rows replaced"
        );
        Ok(())
    }

    async fn get_analysis(&self, artifact_id: Uuid) -> Result<Option<AnalysisResult>> {
        let summary_row = sqlx::query(
            "SELECT executive_summary, key_takeaways, sentiment, priority, confidence
             FROM artifact_summaries WHERE artifact_id = $1",
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(summary_row) = summary_row else {
            return Ok(None);
        };

        let summary = Summary {
            executive_summary: summary_row.try_get("executive_summary")?,
            key_takeaways: summary_row.try_get("key_takeaways")?,
            sentiment: summary_row.try_get("sentiment")?,
            priority: summary_row.try_get("priority")?,
            confidence: summary_row.try_get("confidence")?,
        };

        let topics = sqlx::query(
            "SELECT name, confidence FROM artifact_topics WHERE artifact_id = $1 ORDER BY id",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(Topic {
                name: row.try_get("name")?,
                confidence: row.try_get("confidence")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let persons = sqlx::query(
            "SELECT name, role, organization, context, confidence
             FROM artifact_persons WHERE artifact_id = $1 ORDER BY id",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(Person {
                name: row.try_get("name")?,
                role: row.try_get("role")?,
                organization: row.try_get("organization")?,
                context: row.try_get("context")?,
                confidence: row.try_get("confidence")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let facts = sqlx::query(
            "SELECT fact_type, key, value, numeric_value, date_value, unit, confidence
             FROM artifact_facts WHERE artifact_id = $1 ORDER BY id",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(Fact {
                fact_type: row.try_get("fact_type")?,
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                numeric_value: row.try_get("numeric_value")?,
                date_value: row.try_get::<Option<NaiveDate>, _>("date_value")?,
                unit: row.try_get("unit")?,
                confidence: row.try_get("confidence")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let insights = sqlx::query(
            "SELECT insight_type, title, description, severity, suggested_action,
                    impacted_modules, confidence
             FROM artifact_insights WHERE artifact_id = $1 ORDER BY id",
        )
        .bind(artifact_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|row| {
            Ok(Insight {
                insight_type: row.try_get("insight_type")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                severity: row.try_get("severity")?,
                suggested_action: row.try_get("suggested_action")?,
                impacted_modules: row.try_get("impacted_modules")?,
                confidence: row.try_get("confidence")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let category = sqlx::query(
            "SELECT artifact_category, category_confidence FROM artifacts WHERE artifact_id = $1",
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;
        let (document_type, document_type_confidence) = match category {
            Some(row) => (
                row.try_get("artifact_category")?,
                row.try_get("category_confidence")?,
            ),
            None => (None, None),
        };

        Ok(Some(AnalysisResult {
            summary,
            topics,
            persons,
            facts,
            insights,
            document_type,
            document_type_confidence,
        }))
    }

    async fn mark_completed(
        &self,
        artifact_id: Uuid,
        model: &str,
        processing_time_ms: i32,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE artifacts
             SET processing_status = 'completed',
                 processed_at = NOW(),
                 ai_model_version = $2,
                 ai_processing_time_ms = $3,
                 processing_error = NULL
             WHERE artifact_id = $1 AND processing_status = 'processing'",
        )
        .bind(artifact_id)
        .bind(model)
        .bind(processing_time_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                artifact_id = %artifact_id,
                "mark_completed skipped: artifact no longer processing"
            );
        }
        Ok(())
    }

    async fn mark_failed(&self, artifact_id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE artifacts
             SET processing_status = 'failed',
                 processed_at = NOW(),
                 processing_error = $2
             WHERE artifact_id = $1 AND processing_status = 'processing'",
        )
        .bind(artifact_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(
                artifact_id = %artifact_id,
                "mark_failed skipped: artifact no longer processing"
            );
        }
        Ok(())
    }

    async fn reset_for_reanalysis(&self, artifact_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE artifacts
             SET processing_status = 'pending',
                 processing_error = NULL,
                 processed_at = NULL
             WHERE artifact_id = $1
               AND processing_status IN ('completed', 'failed')
               AND deleted_at IS NULL",
        )
        .bind(artifact_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM artifact_embeddings WHERE artifact_id = $1")
            .bind(artifact_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
