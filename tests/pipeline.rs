//! Source pipeline behaviour with stubbed fetching and LLM backends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::mpsc;

use trailsync::http_client::{content_hash, FetchError, FetchedPage, PageFetcher};
use trailsync::llm::providers::{Completion, CompletionRequest};
use trailsync::llm::{
    BackendFactory, LlmBackend, LlmConfig, LlmError, LlmProvider, ModelId, PromptStore, TokenUsage,
};
use trailsync::models::Source;
use trailsync::rate_limit::RetryPolicy;
use trailsync::services::{Outcome, PipelineEvent, SourcePipeline};

const VALID: &str = r#"{"trail_condition_records": [{
    "trail_name": "鴨沢ルート", "mountain_name_raw": "雲取山", "title": "通行止め",
    "status": "CLOSURE", "area": "OKUTAMA"}]}"#;

/// Serves canned HTML per URL; unknown URLs answer 404.
struct StubFetcher {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    completed: Mutex<Vec<String>>,
}

impl StubFetcher {
    fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
            delays: HashMap::new(),
            completed: Mutex::new(Vec::new()),
        })
    }

    /// Each page answers after its own delay in milliseconds.
    fn delayed(pages: &[(&str, &str, u64)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(url, html, _)| (url.to_string(), html.to_string()))
                .collect(),
            delays: pages
                .iter()
                .map(|(url, _, ms)| (url.to_string(), Duration::from_millis(*ms)))
                .collect(),
            completed: Mutex::new(Vec::new()),
        })
    }

    fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.completed.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(html) => Ok(FetchedPage::from_html(url, html)),
            None => Err(FetchError::Status {
                status: 404,
                url: url.to_string(),
                retry_after: None,
            }),
        }
    }
}

/// Answers with valid JSON unless the page text contains "BROKEN".
struct StubBackend {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LlmBackend for StubBackend {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Gemini
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.lock().unwrap().push(request.model.clone());
        let text = if request.data.contains("BROKEN") {
            "not json at all".to_string()
        } else {
            VALID.to_string()
        };
        Ok(Completion {
            text,
            usage: TokenUsage {
                input_tokens: 1000,
                thinking_tokens: 100,
                output_tokens: 200,
            },
            prompt_chars: request.prompt.chars().count() + request.data.chars().count(),
        })
    }
}

#[derive(Default)]
struct StubFactory {
    calls: Arc<Mutex<Vec<String>>>,
}

impl StubFactory {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl BackendFactory for StubFactory {
    fn backend(&self, _model: ModelId) -> Result<Arc<dyn LlmBackend>, LlmError> {
        Ok(Arc::new(StubBackend {
            calls: self.calls.clone(),
        }))
    }
}

fn source(id: i32, key: &str) -> Source {
    Source::new(
        id,
        format!("source {}", id),
        key.to_string(),
        format!("https://example.jp/{}", key),
    )
}

fn write_prompts(dir: &Path, sources: &[&Source]) {
    std::fs::write(dir.join("template.yaml"), "prompt: 登山道の情報を抽出してください\n").unwrap();
    for source in sources {
        std::fs::write(
            dir.join(source.prompt_filename()),
            "prompt: サイト固有の指示\nconfig:\n  model: gemini-2.5-flash\n",
        )
        .unwrap();
    }
}

fn pipeline(fetcher: Arc<StubFetcher>, factory: Arc<StubFactory>, dir: &Path) -> SourcePipeline {
    let llm: LlmConfig = toml::from_str("").unwrap();
    SourcePipeline::new(fetcher, factory, PromptStore::new(dir), llm)
        .with_retry_delays(RetryPolicy::immediate(3), Duration::ZERO)
        .with_invalid_output_dir(None)
}

#[tokio::test]
async fn failures_stay_with_their_source() {
    let dir = tempdir().unwrap();
    let ok = source(1, "ok");
    let missing = source(2, "missing");
    let broken = source(3, "broken");
    write_prompts(dir.path(), &[&ok, &missing, &broken]);

    let fetcher = StubFetcher::new(&[
        ("https://example.jp/ok", "<main><p>鴨沢ルート 通行止め</p></main>"),
        ("https://example.jp/broken", "<main><p>BROKEN page</p></main>"),
    ]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .run(vec![ok, missing, broken], None)
        .await;

    let ids: Vec<i32> = results.iter().map(|(s, _)| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    match &results[0].1 {
        Outcome::Extracted(extracted) => {
            assert_eq!(extracted.extraction.records.len(), 1);
            assert!(extracted.content_changed);
            assert_eq!(extracted.extraction.model, ModelId::Gemini25Flash);
            assert_eq!(extracted.extraction.prompt_filename, "001_ok.yaml");
        }
        other => panic!("expected extraction, got {:?}", other),
    }
    match &results[1].1 {
        Outcome::Failed { reason, stats } => {
            assert!(reason.contains("404"), "{}", reason);
            assert!(stats.is_none());
        }
        other => panic!("expected fetch failure, got {:?}", other),
    }
    match &results[2].1 {
        Outcome::Failed { stats, .. } => {
            let stats = stats.as_ref().expect("failed extraction keeps its usage");
            assert!(!stats.validation_success);
            assert!(stats.cost_usd() > 0.0);
        }
        other => panic!("expected extraction failure, got {:?}", other),
    }

    // One call for the good page, three for the broken one
    assert_eq!(factory.calls().len(), 4);
}

#[tokio::test]
async fn results_keep_submission_order_when_later_sources_finish_first() {
    let dir = tempdir().unwrap();
    let sources: Vec<Source> = (1..=4).map(|id| source(id, &format!("s{}", id))).collect();
    write_prompts(dir.path(), &sources.iter().collect::<Vec<_>>());

    // Earlier sources answer later
    let fetcher = StubFetcher::delayed(&[
        ("https://example.jp/s1", "<p>鴨沢ルート 通行止め</p>", 300),
        ("https://example.jp/s2", "<p>BROKEN page</p>", 200),
        ("https://example.jp/s3", "<p>三条の湯ルート 倒木</p>", 100),
        ("https://example.jp/s4", "<p>石尾根 積雪</p>", 0),
    ]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher.clone(), factory, dir.path())
        .run(sources, None)
        .await;

    assert_eq!(
        fetcher.completed(),
        vec![
            "https://example.jp/s4",
            "https://example.jp/s3",
            "https://example.jp/s2",
            "https://example.jp/s1",
        ]
    );

    let ids: Vec<i32> = results.iter().map(|(s, _)| s.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
    for (source, outcome) in &results {
        match outcome {
            Outcome::Extracted(extracted) => {
                assert_ne!(source.id, 2);
                assert_eq!(
                    extracted.extraction.prompt_filename,
                    source.prompt_filename()
                );
            }
            Outcome::Failed { .. } => assert_eq!(source.id, 2),
            other => panic!("unexpected outcome for {}: {:?}", source.id, other),
        }
    }
}

#[tokio::test]
async fn unchanged_content_skips_extraction() {
    let dir = tempdir().unwrap();
    let html = "<main><p>鴨沢ルート 通行止め</p><a href=\"/news\">お知らせ</a></main>";
    let mut seen = source(1, "seen");
    seen.content_hash = Some(content_hash(html));
    write_prompts(dir.path(), &[&seen]);

    let fetcher = StubFetcher::new(&[("https://example.jp/seen", html)]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .run(vec![seen.clone()], None)
        .await;

    match &results[0].1 {
        Outcome::Unchanged { content_hash: hash } => {
            assert_eq!(Some(hash.as_str()), seen.content_hash.as_deref());
        }
        other => panic!("expected unchanged, got {:?}", other),
    }
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn link_churn_does_not_count_as_change() {
    let dir = tempdir().unwrap();
    let before = "<main><p>鴨沢ルート 通行止め</p><a href=\"/news?v=1\">お知らせ</a></main>";
    let after = "<main><p>鴨沢ルート 通行止め</p><a href=\"/news?v=2\">お知らせ</a></main>";
    let mut seen = source(1, "seen");
    seen.content_hash = Some(content_hash(before));
    write_prompts(dir.path(), &[&seen]);

    let fetcher = StubFetcher::new(&[("https://example.jp/seen", after)]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .run(vec![seen], None)
        .await;
    assert!(matches!(results[0].1, Outcome::Unchanged { .. }));
}

#[tokio::test]
async fn force_extracts_unchanged_content() {
    let dir = tempdir().unwrap();
    let html = "<main><p>鴨沢ルート 通行止め</p></main>";
    let mut seen = source(1, "seen");
    seen.content_hash = Some(content_hash(html));
    write_prompts(dir.path(), &[&seen]);

    let fetcher = StubFetcher::new(&[("https://example.jp/seen", html)]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .with_force(true)
        .run(vec![seen], None)
        .await;

    match &results[0].1 {
        Outcome::Extracted(extracted) => assert!(!extracted.content_changed),
        other => panic!("expected forced extraction, got {:?}", other),
    }
    assert_eq!(factory.calls().len(), 1);
}

#[tokio::test]
async fn model_override_beats_prompt_file() {
    let dir = tempdir().unwrap();
    let fresh = source(1, "fresh");
    write_prompts(dir.path(), &[&fresh]);

    let fetcher = StubFetcher::new(&[("https://example.jp/fresh", "<p>鴨沢ルート</p>")]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .run(vec![fresh], Some(ModelId::DeepseekChat))
        .await;

    match &results[0].1 {
        Outcome::Extracted(extracted) => {
            assert_eq!(extracted.extraction.model, ModelId::DeepseekChat);
            assert_eq!(extracted.extraction.stats.tokens.model, "deepseek-chat");
        }
        other => panic!("expected extraction, got {:?}", other),
    }
    assert_eq!(factory.calls(), vec!["deepseek-chat".to_string()]);
}

#[tokio::test]
async fn missing_prompt_file_fails_before_llm() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("template.yaml"), "prompt: 共通\n").unwrap();

    let fetcher = StubFetcher::new(&[("https://example.jp/orphan", "<p>本文</p>")]);
    let factory = Arc::new(StubFactory::default());

    let results = pipeline(fetcher, factory.clone(), dir.path())
        .run(vec![source(7, "orphan")], None)
        .await;

    match &results[0].1 {
        Outcome::Failed { reason, stats } => {
            assert!(reason.contains("007_orphan.yaml"), "{}", reason);
            assert!(stats.is_none());
        }
        other => panic!("expected prompt failure, got {:?}", other),
    }
    assert!(factory.calls().is_empty());
}

#[tokio::test]
async fn events_cover_every_source() {
    let dir = tempdir().unwrap();
    let a = source(1, "a");
    let b = source(2, "b");
    write_prompts(dir.path(), &[&a, &b]);

    let fetcher = StubFetcher::new(&[("https://example.jp/a", "<p>鴨沢ルート</p>")]);
    let factory = Arc::new(StubFactory::default());
    let (tx, mut rx) = mpsc::channel(16);

    let results = pipeline(fetcher, factory, dir.path())
        .with_events(tx)
        .run(vec![a, b], None)
        .await;
    assert_eq!(results.len(), 2);

    let mut started = Vec::new();
    let mut finished = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Started { source_id, .. } => started.push(source_id),
            PipelineEvent::Finished { source_id, ok } => finished.push((source_id, ok)),
            PipelineEvent::Fetched { .. } => {}
        }
    }
    started.sort();
    finished.sort();
    assert_eq!(started, vec![1, 2]);
    assert_eq!(finished, vec![(1, true), (2, false)]);
}
