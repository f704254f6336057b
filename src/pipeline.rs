// src/pipeline.rs
//! One ingest → analyze → persist pass.
//!
//! Articles are analyzed in chunks of `batch_size`; each chunk is one batched
//! call per model. A record the sink rejects is counted and logged, the run
//! continues with the next one.

use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::BatchComparisonEngine;
use crate::ingest::fetch_all;
use crate::ingest::types::ArticleSource;
use crate::persist::{AnalysisSink, PersistedRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub fetched: usize,
    pub analyzed: usize,
    pub persisted: usize,
    pub persist_errors: usize,
}

pub async fn run_once(
    sources: &[Box<dyn ArticleSource>],
    engine: &BatchComparisonEngine,
    sink: &dyn AnalysisSink,
    batch_size: usize,
) -> PipelineReport {
    let articles = fetch_all(sources).await;
    let mut report = PipelineReport {
        fetched: articles.len(),
        ..Default::default()
    };
    info!(target: "pipeline", fetched = report.fetched, batch_size, "pipeline run started");

    for chunk in articles.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = chunk.iter().map(|a| a.content.as_str()).collect();
        let analyses = engine.analyze_batch(&texts).await;
        report.analyzed += analyses.len();
        counter!("pipeline_articles_total").increment(analyses.len() as u64);

        for (article, analysis) in chunk.iter().zip(analyses.iter()) {
            let record = PersistedRecord::from_analysis(article, analysis);
            match sink.persist(&record).await {
                Ok(()) => report.persisted += 1,
                Err(e) => {
                    report.persist_errors += 1;
                    counter!("pipeline_persist_errors_total").increment(1);
                    warn!(target: "pipeline", article = %article.short_id(), error = ?e, "persist failed");
                }
            }
        }
    }

    info!(
        target: "pipeline",
        analyzed = report.analyzed,
        persisted = report.persisted,
        persist_errors = report.persist_errors,
        "pipeline run finished"
    );
    report
}
