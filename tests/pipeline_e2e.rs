// tests/pipeline_e2e.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::fs;

use news_sentiment::analyze::{AnalyzerSettings, MockLoader, ScorePolicy};
use news_sentiment::ingest::providers::RssSource;
use news_sentiment::ingest::types::{ArticleSource, RawArticle};
use news_sentiment::persist::{AnalysisSink, JsonlSink, MemorySink, PersistedRecord};
use news_sentiment::pipeline::{run_once, PipelineReport};
use news_sentiment::{BatchComparisonEngine, ModelRegistry};

fn mock_engine() -> BatchComparisonEngine {
    BatchComparisonEngine::load(
        &["finbert".to_string(), "twitter-roberta".to_string()],
        &["bert-base-ner".to_string()],
        ScorePolicy::Signed,
        ModelRegistry::builtin(),
        &MockLoader::default(),
        &AnalyzerSettings::default(),
    )
    .expect("engine")
}

fn fixture_source() -> Box<dyn ArticleSource> {
    let xml = fs::read_to_string("tests/fixtures/markets_rss.xml").expect("fixture");
    Box::new(RssSource::from_fixture("markets", &xml))
}

struct BrokenSource;

#[async_trait]
impl ArticleSource for BrokenSource {
    async fn fetch_latest(&self) -> Result<Vec<RawArticle>> {
        Err(anyhow!("connection reset"))
    }
    fn name(&self) -> &str {
        "broken"
    }
}

/// Rejects records whose url ends with the given suffix.
struct PickySink {
    inner: MemorySink,
    reject_suffix: &'static str,
}

#[async_trait]
impl AnalysisSink for PickySink {
    async fn persist(&self, record: &PersistedRecord) -> Result<()> {
        if record.url.ends_with(self.reject_suffix) {
            return Err(anyhow!("disk full"));
        }
        self.inner.persist(record).await
    }
}

#[tokio::test]
async fn fixture_feed_is_analyzed_and_persisted() {
    let sources = vec![fixture_source(), Box::new(BrokenSource) as Box<dyn ArticleSource>];
    let engine = mock_engine();
    let sink = MemorySink::new();

    // Batch size 2 forces two engine calls over the three unique articles.
    let report = run_once(&sources, &engine, &sink, 2).await;
    assert_eq!(
        report,
        PipelineReport {
            fetched: 3,
            analyzed: 3,
            persisted: 3,
            persist_errors: 0,
        }
    );

    let records = sink.snapshot();
    let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://example.test/markets/apple-record",
            "https://example.test/markets/tesla-miss",
            "https://example.test/markets/fed-hold",
        ]
    );

    let apple = &records[0];
    assert_eq!(apple.sentiments["finbert"], Some(0.95));
    assert_eq!(apple.companies, vec!["Apple".to_string()]);
    assert_eq!(apple.published_at.as_deref(), Some("2025-10-14T13:30:00Z"));

    let tesla = &records[1];
    assert!(tesla.sentiments["twitter-roberta"].unwrap() < 0.0);
    assert_eq!(tesla.companies, vec!["Tesla".to_string()]);

    let fed = &records[2];
    assert!(fed.published_at.is_none());
    assert!(fed.errors.is_empty());
}

#[tokio::test]
async fn persist_errors_do_not_stop_the_run() {
    let sources = vec![fixture_source()];
    let engine = mock_engine();
    let sink = PickySink {
        inner: MemorySink::new(),
        reject_suffix: "tesla-miss",
    };
    let report = run_once(&sources, &engine, &sink, 16).await;
    assert_eq!(report.analyzed, 3);
    assert_eq!(report.persisted, 2);
    assert_eq!(report.persist_errors, 1);
    assert_eq!(sink.inner.snapshot().len(), 2);
}

#[tokio::test]
async fn jsonl_output_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let sink = JsonlSink::new(tmp.path().join("data/analyses.jsonl"));
    let report = run_once(&[fixture_source()], &mock_engine(), &sink, 16).await;
    assert_eq!(report.persisted, 3);

    let body = fs::read_to_string(sink.path()).unwrap();
    let first: PersistedRecord = serde_json::from_str(body.lines().next().unwrap()).unwrap();
    assert_eq!(first.title, "Apple shares soar after record iPhone sales");
}

#[tokio::test]
async fn no_sources_means_empty_report() {
    let report = run_once(&[], &mock_engine(), &MemorySink::new(), 16).await;
    assert_eq!(report, PipelineReport::default());
}
