//! # Batch Comparison Engine
//! Runs every configured model over a batch of article texts and assembles one
//! [`ArticleAnalysis`] per input.
//!
//! Policy:
//! - each model is invoked once for the whole (truncated) batch;
//! - a model whose batch call fails (or returns the wrong number of results)
//!   gets a failure marker in every article's slot, the other models are
//!   unaffected;
//! - an item the model answered but that could not be decoded fails only its
//!   own article's slot;
//! - output is index-aligned with input, always the same length.
//!
//! Models are loaded once in the constructor and held for the engine lifetime.

use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{info, warn};

use crate::analyze::{
    truncate_chars, Analysis, Analyzer, AnalyzerSet, AnalyzerSettings, EntitySet, ModelLoader,
    Outcome, ScorePolicy, SentimentResult, MAX_INPUT_CHARS,
};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, ModelError};
use crate::metrics::ensure_metrics_described;
use crate::registry::{ModelDescriptor, ModelRegistry};

/// Per-article comparison: one slot per active model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArticleAnalysis {
    pub sentiments_by_model: BTreeMap<String, Outcome<SentimentResult>>,
    pub entities_by_model: BTreeMap<String, Outcome<EntitySet>>,
}

impl ArticleAnalysis {
    /// Union of companies across successful entity models.
    pub fn merged_companies(&self) -> BTreeSet<String> {
        self.entities_by_model
            .values()
            .filter_map(Outcome::success)
            .flat_map(|set| set.companies.iter().cloned())
            .collect()
    }

    /// Normalized score of one model, `None` if absent or failed.
    pub fn sentiment_score(&self, alias: &str) -> Option<f32> {
        self.sentiments_by_model
            .get(alias)
            .and_then(Outcome::success)
            .map(|r| r.score)
    }

    /// Error messages of failed slots, keyed by alias (both families).
    pub fn errors(&self) -> BTreeMap<String, String> {
        let sentiment = self
            .sentiments_by_model
            .iter()
            .filter_map(|(k, o)| o.error().map(|e| (k.clone(), e.to_string())));
        let entity = self
            .entities_by_model
            .iter()
            .filter_map(|(k, o)| o.error().map(|e| (k.clone(), e.to_string())));
        sentiment.chain(entity).collect()
    }
}

pub struct BatchComparisonEngine {
    analyzers: AnalyzerSet,
    policy: ScorePolicy,
}

impl BatchComparisonEngine {
    pub fn new(analyzers: AnalyzerSet, policy: ScorePolicy) -> Self {
        ensure_metrics_described();
        Self { analyzers, policy }
    }

    /// Resolve aliases (fail fast on unknown ones) and load each model once.
    pub fn load(
        sentiment_models: &[String],
        entity_models: &[String],
        policy: ScorePolicy,
        registry: &ModelRegistry,
        loader: &dyn ModelLoader,
        settings: &AnalyzerSettings,
    ) -> Result<Self, AnalysisError> {
        let analyzers =
            AnalyzerSet::load(sentiment_models, entity_models, registry, loader, settings)?;
        info!(
            target: "engine",
            sentiment = analyzers.sentiment.len(),
            entity = analyzers.entity.len(),
            ?policy,
            "batch engine ready"
        );
        Ok(Self::new(analyzers, policy))
    }

    /// Construct from the loaded configuration file.
    pub fn from_config(
        cfg: &AnalyzerConfig,
        registry: &ModelRegistry,
        loader: &dyn ModelLoader,
    ) -> anyhow::Result<Self> {
        let settings = cfg.analyzer_settings()?;
        let engine = Self::load(
            &cfg.sentiment_models,
            &cfg.entity_models,
            cfg.policy(),
            registry,
            loader,
            &settings,
        )?;
        Ok(engine)
    }

    pub fn policy(&self) -> ScorePolicy {
        self.policy
    }

    pub fn analyzers(&self) -> &AnalyzerSet {
        &self.analyzers
    }

    /// Active models, sentiment first.
    pub fn describe(&self) -> Vec<&ModelDescriptor> {
        self.analyzers.descriptors()
    }

    pub async fn analyze_batch<S>(&self, texts: &[S]) -> Vec<ArticleAnalysis>
    where
        S: AsRef<str> + Sync,
    {
        let n = texts.len();
        if n == 0 {
            return Vec::new();
        }
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| truncate_chars(t.as_ref(), MAX_INPUT_CHARS))
            .collect();
        let mut out: Vec<ArticleAnalysis> = vec![ArticleAnalysis::default(); n];

        for analyzer in &self.analyzers.sentiment {
            let alias = analyzer.alias().to_string();
            match invoke(analyzer, &inputs).await {
                Ok(results) => {
                    for (slot, item) in out.iter_mut().zip(results) {
                        let outcome = match item {
                            Outcome::Success(Analysis::Sentiment(raw)) => {
                                Outcome::Success(SentimentResult::normalize(&raw, self.policy))
                            }
                            Outcome::Success(Analysis::Entities(_)) => {
                                Outcome::failure("unexpected entity payload")
                            }
                            Outcome::Failure { error } => Outcome::Failure { error },
                        };
                        slot.sentiments_by_model.insert(alias.clone(), outcome);
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    for slot in out.iter_mut() {
                        slot.sentiments_by_model
                            .insert(alias.clone(), Outcome::failure(msg.clone()));
                    }
                }
            }
        }

        for analyzer in &self.analyzers.entity {
            let alias = analyzer.alias().to_string();
            match invoke(analyzer, &inputs).await {
                Ok(results) => {
                    for (slot, item) in out.iter_mut().zip(results) {
                        let outcome = match item {
                            Outcome::Success(Analysis::Entities(set)) => Outcome::Success(set),
                            Outcome::Success(Analysis::Sentiment(_)) => {
                                Outcome::failure("unexpected sentiment payload")
                            }
                            Outcome::Failure { error } => Outcome::Failure { error },
                        };
                        slot.entities_by_model.insert(alias.clone(), outcome);
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    for slot in out.iter_mut() {
                        slot.entities_by_model
                            .insert(alias.clone(), Outcome::failure(msg.clone()));
                    }
                }
            }
        }

        out
    }
}

/// One batched call with telemetry. Errors are returned for the caller to spread.
async fn invoke(
    analyzer: &Analyzer,
    inputs: &[&str],
) -> Result<Vec<Outcome<Analysis>>, ModelError> {
    let alias = analyzer.alias().to_string();
    let t0 = Instant::now();
    counter!("model_invocations_total", "model" => alias.clone()).increment(1);

    let res = analyzer.analyze_batch(inputs).await;

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("model_batch_ms", "model" => alias.clone()).record(ms);
    match &res {
        Ok(items) => {
            let failed = items.iter().filter(|o| !o.is_success()).count();
            if failed > 0 {
                warn!(target: "engine", model = %alias, failed, "some items could not be decoded");
            }
            info!(target: "engine", model = %alias, batch = inputs.len(), ms, "batch analyzed");
        }
        Err(e) => {
            counter!("model_failures_total", "model" => alias.clone()).increment(1);
            warn!(
                target: "engine",
                model = %alias,
                batch = inputs.len(),
                error = %e,
                "batch invocation failed; marking every article"
            );
        }
    }
    res
}
