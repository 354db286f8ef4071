//! Integration tests for the PostgreSQL artifact and embedding repositories.
//!
//! **IMPORTANT**: These tests require a PostgreSQL database with the
//! pgvector extension available. They are ignored by default; run with
//! `DATABASE_URL=... cargo test -p cerberus-db -- --ignored`.

use chrono::{NaiveDate, Utc};
use pgvector::Vector;
use uuid::Uuid;

use cerberus_db::test_fixtures::{seed_pending_artifact, test_database_url};
use cerberus_db::{
    AnalysisResult, ArtifactEmbedding, ArtifactRepository, Database, EmbeddingRepository,
    ProcessingStatus, UsageRecord, UsageSink,
};
use cerberus_core::{Fact, Insight, Person, Summary, Topic};

async fn setup_test_db() -> Database {
    let _ = dotenvy::dotenv();
    let db = Database::connect(&test_database_url())
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to run migrations");
    db
}

fn sample_result(summary: &str) -> AnalysisResult {
    AnalysisResult {
        summary: Summary {
            executive_summary: summary.to_string(),
            key_takeaways: vec!["Budget approved".into()],
            sentiment: Some("positive".into()),
            priority: Some(2),
            confidence: Some(0.9),
        },
        topics: vec![Topic {
            name: "Budget".into(),
            confidence: 0.8,
        }],
        persons: vec![Person {
            name: "Dana Ortiz".into(),
            role: Some("CFO".into()),
            organization: Some("Acme".into()),
            context: None,
            confidence: Some(0.7),
        }],
        facts: vec![Fact {
            fact_type: "budget".into(),
            key: "total".into(),
            value: "$1.2M".into(),
            numeric_value: Some(1_200_000.0),
            date_value: NaiveDate::from_ymd_opt(2026, 3, 31),
            unit: Some("USD".into()),
            confidence: Some(0.95),
        }],
        insights: vec![Insight {
            insight_type: "risk".into(),
            title: "Overrun".into(),
            description: "Q3 spend trending high".into(),
            severity: Some("medium".into()),
            suggested_action: None,
            impacted_modules: vec!["finance".into()],
            confidence: None,
        }],
        document_type: Some("budget_report".into()),
        document_type_confidence: Some(0.88),
    }
}

#[tokio::test]
#[ignore]
async fn test_claim_is_exclusive() {
    let db = setup_test_db().await;
    let artifact = seed_pending_artifact(&db, Uuid::new_v4(), "notes.txt", "text/plain")
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        db.artifacts.claim(artifact.artifact_id),
        db.artifacts.claim(artifact.artifact_id)
    );
    let wins = [a.unwrap(), b.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    let stored = db.artifacts.get(artifact.artifact_id).await.unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Processing);
}

#[tokio::test]
#[ignore]
async fn test_status_lifecycle_and_reanalysis() {
    let db = setup_test_db().await;
    let artifact = seed_pending_artifact(&db, Uuid::new_v4(), "notes.txt", "text/plain")
        .await
        .unwrap();
    let id = artifact.artifact_id;

    // Terminal transitions require `processing`.
    db.artifacts.mark_completed(id, "model", 10).await.unwrap();
    let stored = db.artifacts.get(id).await.unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Pending);

    assert!(db.artifacts.claim(id).await.unwrap());
    db.artifacts.mark_failed(id, "Empty content: blank").await.unwrap();
    let stored = db.artifacts.get(id).await.unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Failed);
    assert_eq!(stored.processing_error.as_deref(), Some("Empty content: blank"));

    assert!(db.artifacts.reset_for_reanalysis(id).await.unwrap());
    assert!(!db.artifacts.reset_for_reanalysis(id).await.unwrap());
    let stored = db.artifacts.get(id).await.unwrap().unwrap();
    assert_eq!(stored.processing_status, ProcessingStatus::Pending);
    assert!(stored.processing_error.is_none());
}

#[tokio::test]
#[ignore]
async fn test_replace_analysis_overwrites_previous() {
    let db = setup_test_db().await;
    let artifact = seed_pending_artifact(&db, Uuid::new_v4(), "report.txt", "text/plain")
        .await
        .unwrap();
    let id = artifact.artifact_id;

    db.artifacts
        .replace_analysis(id, &sample_result("first"))
        .await
        .unwrap();
    let second = sample_result("second");
    db.artifacts.replace_analysis(id, &second).await.unwrap();

    let stored = db.artifacts.get_analysis(id).await.unwrap().unwrap();
    assert_eq!(stored, second);

    let artifact = db.artifacts.get(id).await.unwrap().unwrap();
    assert_eq!(artifact.artifact_category.as_deref(), Some("budget_report"));
}

#[tokio::test]
#[ignore]
async fn test_embedding_upsert_keeps_single_row() {
    let db = setup_test_db().await;
    let artifact = seed_pending_artifact(&db, Uuid::new_v4(), "a.txt", "text/plain")
        .await
        .unwrap();
    let id = artifact.artifact_id;

    for value in [0.1f32, 0.2f32] {
        db.embeddings
            .upsert(&ArtifactEmbedding {
                artifact_id: id,
                vector: Vector::from(vec![value; 1536]),
                model: "text-embedding-3-small".into(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    assert_eq!(db.embeddings.count_for(id).await.unwrap(), 1);
    let stored = db.embeddings.get(id).await.unwrap().unwrap();
    assert!((stored.vector.as_slice()[0] - 0.2).abs() < f32::EPSILON);

    db.embeddings.delete(id).await.unwrap();
    assert_eq!(db.embeddings.count_for(id).await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_usage_totals() {
    let db = setup_test_db().await;
    let program_id = Uuid::new_v4();
    let since = Utc::now() - chrono::Duration::minutes(1);

    for success in [true, false] {
        db.usage
            .record(&UsageRecord {
                program_id: Some(program_id),
                module: "artifacts".into(),
                operation: "analyze".into(),
                model: "claude-sonnet-4-5-20250929".into(),
                input_tokens: 1000,
                output_tokens: 200,
                cached_tokens: 0,
                cost_usd: 0.006,
                duration_ms: 1500,
                success,
                error_kind: (!success).then(|| "ai_provider".to_string()),
                recorded_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    let totals = db.usage.totals_since(program_id, since).await.unwrap();
    assert_eq!(totals.calls, 2);
    assert_eq!(totals.failed_calls, 1);
    assert_eq!(totals.input_tokens, 2000);
    assert!((totals.cost_usd - 0.012).abs() < 1e-9);
}
