//! Single-article comparison across every loaded model.
//!
//! Diagnostic path (CLI `compare`, `POST /compare`), not the batch path.
//! Analyzers run one after another with a pacing delay between calls so remote
//! endpoints are not hammered; one analyzer failing never hides the others.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::info;

use crate::analyze::{Analysis, Analyzer, AnalyzerSet, Outcome, SentimentLabel};
use crate::engine::BatchComparisonEngine;

pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

/// Characters of the source text echoed back in a report.
pub const TEXT_SAMPLE_CHARS: usize = 100;

pub type ModelOutcomes = BTreeMap<String, Outcome<Analysis>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    /// Most common label among successful sentiment models (ties: neutral, then negative).
    pub majority_label: Option<SentimentLabel>,
    /// Share of successful sentiment models agreeing with the majority label.
    pub agreement: f32,
    pub successful_sentiment_models: usize,
    pub failed_models: usize,
    /// Companies reported by every successful entity model.
    pub common_companies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub title: Option<String>,
    pub text_sample: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment_results: ModelOutcomes,
    pub entity_results: ModelOutcomes,
    pub summary: ComparisonSummary,
}

pub struct ComparisonManager {
    analyzers: AnalyzerSet,
    pacing: Duration,
}

impl ComparisonManager {
    pub fn new(analyzers: AnalyzerSet, pacing: Duration) -> Self {
        Self { analyzers, pacing }
    }

    /// Shares the engine's loaded backends; nothing is reloaded.
    pub fn from_engine(engine: &BatchComparisonEngine, pacing: Duration) -> Self {
        Self::new(engine.analyzers().clone(), pacing)
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub async fn compare_sentiment(&self, text: &str) -> ModelOutcomes {
        self.run_each(&self.analyzers.sentiment, text).await
    }

    pub async fn compare_entities(&self, text: &str) -> ModelOutcomes {
        self.run_each(&self.analyzers.entity, text).await
    }

    pub async fn comprehensive(&self, text: &str, title: Option<&str>) -> ComparisonReport {
        let sentiment_results = self.compare_sentiment(text).await;
        if !self.analyzers.entity.is_empty() && !sentiment_results.is_empty() {
            tokio::time::sleep(self.pacing).await;
        }
        let entity_results = self.compare_entities(text).await;
        let summary = summarize(&sentiment_results, &entity_results);

        info!(
            target: "compare",
            sentiment = sentiment_results.len(),
            entity = entity_results.len(),
            majority = ?summary.majority_label,
            "comparison finished"
        );

        ComparisonReport {
            title: title.map(str::to_string),
            text_sample: text_sample(text),
            timestamp: Utc::now(),
            sentiment_results,
            entity_results,
            summary,
        }
    }

    async fn run_each(&self, analyzers: &[Analyzer], text: &str) -> ModelOutcomes {
        let mut out = BTreeMap::new();
        for (i, analyzer) in analyzers.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            let outcome = analyzer.analyze(text).await;
            out.insert(analyzer.alias().to_string(), outcome);
        }
        out
    }
}

/// First 100 chars, with `...` appended when the text was longer.
pub fn text_sample(text: &str) -> String {
    match text.char_indices().nth(TEXT_SAMPLE_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn summarize(sentiment: &ModelOutcomes, entities: &ModelOutcomes) -> ComparisonSummary {
    let labels: Vec<SentimentLabel> = sentiment
        .values()
        .filter_map(|o| match o.success() {
            Some(Analysis::Sentiment(ls)) => Some(SentimentLabel::from_model_label(&ls.label)),
            _ => None,
        })
        .collect();

    // Ties resolve toward neutral, then negative.
    let majority = [SentimentLabel::Neutral, SentimentLabel::Negative, SentimentLabel::Positive]
        .into_iter()
        .map(|l| (l, labels.iter().filter(|x| **x == l).count()))
        .filter(|(_, n)| *n > 0)
        .fold(None::<(SentimentLabel, usize)>, |best, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        });

    let agreement = match majority {
        Some((_, n)) if !labels.is_empty() => n as f32 / labels.len() as f32,
        _ => 0.0,
    };

    let mut common: Option<BTreeSet<String>> = None;
    for o in entities.values() {
        if let Some(Analysis::Entities(set)) = o.success() {
            common = Some(match common {
                None => set.companies.clone(),
                Some(acc) => acc.intersection(&set.companies).cloned().collect(),
            });
        }
    }

    let failed = sentiment
        .values()
        .chain(entities.values())
        .filter(|o| !o.is_success())
        .count();

    ComparisonSummary {
        majority_label: majority.map(|(l, _)| l),
        agreement,
        successful_sentiment_models: labels.len(),
        failed_models: failed,
        common_companies: common.map(|s| s.into_iter().collect()).unwrap_or_default(),
    }
}
