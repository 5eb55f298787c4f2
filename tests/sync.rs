//! Applying pipeline outcomes: commits, checkpoints, dry runs and failures.

use std::sync::Arc;

use chrono::Utc;

use trailsync::llm::{Extraction, LlmStats, ModelId, TokenUsage};
use trailsync::models::{
    AreaName, CandidateRecord, GenerationConfig, Provenance, Source, StatusType, StoredRecord,
};
use trailsync::repository::{MemoryGateway, PersistenceGateway};
use trailsync::services::{
    ExtractedSource, Outcome, ReconcileConfig, RecordReconciler, SourceStatus, SyncRunner,
};

const OLD_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
const NEW_HASH: &str = "1111111111111111111111111111111111111111111111111111111111111111";

fn source() -> Source {
    let mut source = Source::new(
        1,
        "奥多摩ビジターセンター".to_string(),
        "okutama_vc".to_string(),
        "https://example.jp/okutama".to_string(),
    );
    source.content_hash = Some(OLD_HASH.to_string());
    source
}

fn candidate(trail: &str, title: &str, status: StatusType) -> CandidateRecord {
    CandidateRecord {
        trail_name: trail.to_string(),
        mountain_name_raw: "雲取山".to_string(),
        title: title.to_string(),
        description: String::new(),
        reported_at: None,
        resolved_at: None,
        status,
        area: AreaName::Okutama,
        reference_url: String::new(),
        comment: String::new(),
    }
}

/// Gateway holding the source and one stored closure on 鴨沢ルート.
async fn seeded_gateway() -> Arc<MemoryGateway> {
    let gateway = Arc::new(MemoryGateway::new());
    gateway.add_source(&source()).await.unwrap();
    let provenance = Provenance {
        ai_model: "gemini-2.5-flash".to_string(),
        prompt_file: "001_okutama_vc.yaml".to_string(),
        config: GenerationConfig::default(),
    };
    gateway
        .seed_records(vec![StoredRecord::from_candidate(
            &source(),
            &candidate("鴨沢ルート", "通行止め", StatusType::Closure),
            &provenance,
            Utc::now(),
        )])
        .unwrap();
    gateway
}

fn extracted(records: Vec<CandidateRecord>, content_changed: bool) -> Outcome {
    let mut stats = LlmStats::new("gemini-2.5-flash");
    stats.tokens.record(
        &TokenUsage {
            input_tokens: 2000,
            thinking_tokens: 300,
            output_tokens: 400,
        },
        8000,
        1200,
    );
    stats.validation_success = true;
    stats.extraction_count = records.len();

    Outcome::Extracted(Box::new(ExtractedSource {
        extraction: Extraction {
            records,
            stats,
            config: GenerationConfig::default(),
            model: ModelId::Gemini25Flash,
            prompt_filename: "001_okutama_vc.yaml".to_string(),
        },
        content_hash: NEW_HASH.to_string(),
        content_changed,
        page_chars: 8000,
    }))
}

/// One update (status change) and one new record.
fn update_and_create() -> Vec<CandidateRecord> {
    vec![
        candidate("鴨沢ルート", "通行止め", StatusType::Hazard),
        candidate("三条の湯ルート", "倒木あり", StatusType::Hazard),
    ]
}

fn runner(gateway: Arc<MemoryGateway>) -> SyncRunner {
    SyncRunner::new(gateway, RecordReconciler::new(ReconcileConfig::default()))
}

#[tokio::test]
async fn commit_writes_records_usage_and_checkpoint() {
    let gateway = seeded_gateway().await;

    let report = runner(gateway.clone())
        .apply(vec![(source(), extracted(update_and_create(), true))])
        .await;

    let totals = report.summary.totals();
    assert_eq!(totals.success, 1);
    assert_eq!(totals.extracted, 2);
    assert_eq!(totals.updated, 1);
    assert_eq!(totals.created, 1);
    assert!(totals.cost_usd > 0.0);
    assert!(report.previews.is_empty());

    let records = gateway.all_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.status == StatusType::Hazard));

    let usage = gateway.list_usage(Some(1), 10).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].conditions_extracted, 2);
    assert!(usage[0].success);
    assert_eq!(usage[0].model, "gemini-2.5-flash");

    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(NEW_HASH));
    assert!(stored.last_scraped_at.is_some());
    assert!(stored.last_checked_at.is_some());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let gateway = seeded_gateway().await;
    let before = gateway.all_records();

    let report = runner(gateway.clone())
        .with_dry_run(true)
        .apply(vec![(source(), extracted(update_and_create(), true))])
        .await;

    assert_eq!(report.previews.len(), 1);
    let preview = &report.previews[0].reconciliation;
    assert_eq!(preview.to_update.len(), 1);
    assert_eq!(preview.to_create.len(), 1);
    assert_eq!(report.summary.totals().updated, 1);

    assert_eq!(gateway.all_records(), before);
    assert!(gateway.list_usage(None, 10).await.unwrap().is_empty());
    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(OLD_HASH));
    assert!(stored.last_checked_at.is_none());
}

#[tokio::test]
async fn failed_commit_leaves_checkpoint_alone() {
    let gateway = seeded_gateway().await;
    let before = gateway.all_records();
    gateway.fail_next_commit();

    let report = runner(gateway.clone())
        .apply(vec![(source(), extracted(update_and_create(), true))])
        .await;

    assert!(report.summary.has_errors());
    match &report.summary.reports()[0].status {
        SourceStatus::Error { message } => assert!(message.contains("commit failed")),
        other => panic!("expected error, got {:?}", other),
    }

    assert_eq!(gateway.all_records(), before);
    assert!(gateway.list_usage(None, 10).await.unwrap().is_empty());
    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(OLD_HASH));
    assert!(stored.last_checked_at.is_none());
}

#[tokio::test]
async fn unchanged_source_only_records_the_visit() {
    let gateway = seeded_gateway().await;

    let report = runner(gateway.clone())
        .apply(vec![(
            source(),
            Outcome::Unchanged {
                content_hash: OLD_HASH.to_string(),
            },
        )])
        .await;

    assert_eq!(report.summary.totals().skipped, 1);
    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(OLD_HASH));
    assert!(stored.last_checked_at.is_some());
    assert!(stored.last_scraped_at.is_none());
    assert!(gateway.list_usage(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn forced_run_over_same_content_keeps_hash() {
    let gateway = seeded_gateway().await;

    let report = runner(gateway.clone())
        .apply(vec![(source(), extracted(update_and_create(), false))])
        .await;

    assert_eq!(report.summary.totals().success, 1);
    assert_eq!(gateway.all_records().len(), 2);
    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert_eq!(stored.content_hash.as_deref(), Some(OLD_HASH));
    assert!(stored.last_scraped_at.is_none());
    assert!(stored.last_checked_at.is_some());
}

#[tokio::test]
async fn failed_extraction_is_reported_and_not_persisted() {
    let gateway = seeded_gateway().await;
    let mut stats = LlmStats::new("deepseek-reasoner");
    stats.tokens.record(
        &TokenUsage {
            input_tokens: 500,
            thinking_tokens: 0,
            output_tokens: 50,
        },
        2000,
        100,
    );

    let report = runner(gateway.clone())
        .apply(vec![(
            source(),
            Outcome::Failed {
                reason: "extraction failed: response is not valid JSON".to_string(),
                stats: Some(stats),
            },
        )])
        .await;

    let totals = report.summary.totals();
    assert_eq!(totals.errors, 1);
    assert_eq!(totals.cost_usd, 0.0);
    assert!(gateway.list_usage(None, 10).await.unwrap().is_empty());
    let stored = gateway.get_source(1).await.unwrap().unwrap();
    assert!(stored.last_checked_at.is_none());
}

#[tokio::test]
async fn one_failing_source_does_not_block_the_next() {
    let gateway = seeded_gateway().await;
    let mut other = Source::new(
        2,
        "丹沢ビジターセンター".to_string(),
        "tanzawa_vc".to_string(),
        "https://example.jp/tanzawa".to_string(),
    );
    other.area = Some(AreaName::Tanzawa);
    gateway.add_source(&other).await.unwrap();

    let report = runner(gateway.clone())
        .apply(vec![
            (
                source(),
                Outcome::Failed {
                    reason: "fetch failed: HTTP 503".to_string(),
                    stats: None,
                },
            ),
            (other, extracted(update_and_create(), true)),
        ])
        .await;

    let totals = report.summary.totals();
    assert_eq!(totals.errors, 1);
    assert_eq!(totals.success, 1);
    // Source 2 had no stored records, so both candidates are new
    assert_eq!(totals.created, 2);
    assert_eq!(gateway.list_usage(Some(2), 10).await.unwrap().len(), 1);
}
