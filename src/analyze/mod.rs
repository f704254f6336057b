// src/analyze/mod.rs
//! Analyzers: one closed enum over the three model strategies.
//!
//! Every analyzer truncates its input to [`MAX_INPUT_CHARS`] characters, calls its
//! backend once for the whole batch, and returns one [`Outcome`] per input. A
//! failed call or a wrong result count is an error for the whole batch; a single
//! undecodable item only fails its own slot.
//! [`Analyzer::analyze`] is the single-text form: backend failures come back as
//! [`Outcome::Failure`] instead of an error.

pub mod backend;
pub mod cache;
pub mod hf;
pub mod ner;
pub mod sentiment;

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{AnalysisError, ModelError};
use crate::registry::{ModelDescriptor, ModelFamily, ModelRegistry, ModelStrategy};

pub use crate::analyze::backend::{
    DynBackend, EntitySpan, InferenceBackend, LabelScore, MockBackend, MockLoader, ModelLoader,
};
pub use crate::analyze::ner::{EntityFilter, EntitySet};
pub use crate::analyze::sentiment::{parse_generated, ScorePolicy, SentimentLabel, SentimentResult};

/// Hard input window shared by all models, in characters.
pub const MAX_INPUT_CHARS: usize = 512;

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Analyze the sentiment of this financial news: {text}\nSentiment:";

pub const DEFAULT_MAX_NEW_TOKENS: u32 = 50;

/// Longest prefix of `text` with at most `max` characters (never splits a char).
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ------------------------------------------------------------
// Outcomes
// ------------------------------------------------------------

/// Success payload or structured failure. Serialized as
/// `{"success": true, ...payload}` or `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure { error: String },
}

impl<T> Outcome<T> {
    pub fn failure(error: impl Into<String>) -> Self {
        Outcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(v) => Some(v),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure { error } => Some(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::Failure { error } => Outcome::Failure { error },
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a, T> {
            success: bool,
            #[serde(flatten)]
            value: Option<&'a T>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a str>,
        }
        let wire = match self {
            Outcome::Success(v) => Wire {
                success: true,
                value: Some(v),
                error: None,
            },
            Outcome::Failure { error } => Wire {
                success: false,
                value: None,
                error: Some(error.as_str()),
            },
        };
        wire.serialize(serializer)
    }
}

/// Family-specific success payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Analysis {
    /// Top label and confidence, not yet normalized.
    Sentiment(LabelScore),
    Entities(EntitySet),
}

// ------------------------------------------------------------
// Analyzer variants
// ------------------------------------------------------------

#[derive(Clone)]
pub struct ClassificationAnalyzer {
    descriptor: ModelDescriptor,
    backend: DynBackend,
}

impl ClassificationAnalyzer {
    async fn run(&self, inputs: &[String]) -> Result<Vec<Outcome<Analysis>>, ModelError> {
        let raw = self.backend.classify(inputs).await?;
        ensure_len(inputs.len(), raw.len())?;
        Ok(raw
            .into_iter()
            .map(|candidates| match top_label(candidates) {
                Ok(top) => Outcome::Success(Analysis::Sentiment(top)),
                Err(e) => Outcome::failure(e.to_string()),
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct GenerativeAnalyzer {
    descriptor: ModelDescriptor,
    backend: DynBackend,
    prompt_template: String,
    max_new_tokens: u32,
}

impl GenerativeAnalyzer {
    pub fn prompt_for(&self, text: &str) -> String {
        self.prompt_template.replace("{text}", text)
    }

    async fn run(&self, inputs: &[String]) -> Result<Vec<Outcome<Analysis>>, ModelError> {
        let prompts: Vec<String> = inputs.iter().map(|t| self.prompt_for(t)).collect();
        let raw = self.backend.generate(&prompts, self.max_new_tokens).await?;
        ensure_len(inputs.len(), raw.len())?;
        Ok(raw
            .iter()
            .map(|text| match text {
                Some(text) => Outcome::Success(Analysis::Sentiment(parse_generated(text))),
                None => Outcome::failure(
                    ModelError::Decode("model returned no generated text".to_string()).to_string(),
                ),
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct EntityAnalyzer {
    descriptor: ModelDescriptor,
    backend: DynBackend,
    filter: Arc<EntityFilter>,
}

impl EntityAnalyzer {
    async fn run(&self, inputs: &[String]) -> Result<Vec<Outcome<Analysis>>, ModelError> {
        let raw = self.backend.extract(inputs).await?;
        ensure_len(inputs.len(), raw.len())?;
        Ok(raw
            .into_iter()
            .map(|spans| {
                let orgs: BTreeSet<String> = spans
                    .into_iter()
                    .filter(|s| s.entity_group == "ORG")
                    .map(|s| s.word)
                    .collect();
                Outcome::Success(Analysis::Entities(self.filter.filter(orgs)))
            })
            .collect())
    }
}

fn ensure_len(expected: usize, got: usize) -> Result<(), ModelError> {
    if expected == got {
        Ok(())
    } else {
        Err(ModelError::LengthMismatch { expected, got })
    }
}

fn top_label(candidates: Vec<LabelScore>) -> Result<LabelScore, ModelError> {
    candidates
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or_else(|| ModelError::Decode("classifier returned no labels".to_string()))
}

/// Per-variant construction settings.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub prompt_template: String,
    pub max_new_tokens: u32,
    pub entity_filter: Arc<EntityFilter>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            entity_filter: Arc::new(EntityFilter::default()),
        }
    }
}

#[derive(Clone)]
pub enum Analyzer {
    Classification(ClassificationAnalyzer),
    Generative(GenerativeAnalyzer),
    Entity(EntityAnalyzer),
}

impl Analyzer {
    /// Pick the variant matching the descriptor's family/strategy.
    pub fn build(
        descriptor: &ModelDescriptor,
        backend: DynBackend,
        settings: &AnalyzerSettings,
    ) -> Result<Self, AnalysisError> {
        let descriptor = descriptor.clone();
        match (descriptor.family, descriptor.strategy) {
            (ModelFamily::Sentiment, ModelStrategy::Classification) => {
                Ok(Analyzer::Classification(ClassificationAnalyzer {
                    descriptor,
                    backend,
                }))
            }
            (ModelFamily::Sentiment, ModelStrategy::Generative) => {
                Ok(Analyzer::Generative(GenerativeAnalyzer {
                    descriptor,
                    backend,
                    prompt_template: settings.prompt_template.clone(),
                    max_new_tokens: settings.max_new_tokens,
                }))
            }
            (ModelFamily::Entity, ModelStrategy::Classification) => {
                Ok(Analyzer::Entity(EntityAnalyzer {
                    descriptor,
                    backend,
                    filter: settings.entity_filter.clone(),
                }))
            }
            (ModelFamily::Entity, ModelStrategy::Generative) => Err(AnalysisError::ModelLoad {
                alias: descriptor.alias,
                message: "generative entity extraction is not supported".to_string(),
            }),
        }
    }

    /// Model metadata.
    pub fn describe(&self) -> &ModelDescriptor {
        match self {
            Analyzer::Classification(a) => &a.descriptor,
            Analyzer::Generative(a) => &a.descriptor,
            Analyzer::Entity(a) => &a.descriptor,
        }
    }

    pub fn alias(&self) -> &str {
        &self.describe().alias
    }

    pub fn family(&self) -> ModelFamily {
        self.describe().family
    }

    /// One backend call for the whole batch; exactly one outcome per input on success.
    pub async fn analyze_batch<S>(&self, texts: &[S]) -> Result<Vec<Outcome<Analysis>>, ModelError>
    where
        S: AsRef<str> + Sync,
    {
        let inputs: Vec<String> = texts
            .iter()
            .map(|t| truncate_chars(t.as_ref(), MAX_INPUT_CHARS).to_string())
            .collect();
        match self {
            Analyzer::Classification(a) => a.run(&inputs).await,
            Analyzer::Generative(a) => a.run(&inputs).await,
            Analyzer::Entity(a) => a.run(&inputs).await,
        }
    }

    /// Single text; failures are returned as data.
    pub async fn analyze(&self, text: &str) -> Outcome<Analysis> {
        match self.analyze_batch(&[text]).await {
            Ok(mut v) => match v.pop() {
                Some(outcome) => outcome,
                None => Outcome::failure(ModelError::LengthMismatch { expected: 1, got: 0 }.to_string()),
            },
            Err(e) => {
                warn!(target: "engine", model = self.alias(), error = %e, "model invocation failed");
                Outcome::failure(e.to_string())
            }
        }
    }
}

/// Loaded analyzers for both families, in configuration order.
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    pub sentiment: Vec<Analyzer>,
    pub entity: Vec<Analyzer>,
}

impl AnalyzerSet {
    /// Validate every alias first (fail fast), then load each model exactly once.
    /// Repeated aliases are loaded once.
    pub fn load(
        sentiment_aliases: &[String],
        entity_aliases: &[String],
        registry: &ModelRegistry,
        loader: &dyn ModelLoader,
        settings: &AnalyzerSettings,
    ) -> Result<Self, AnalysisError> {
        let sentiment = resolve_unique(sentiment_aliases, ModelFamily::Sentiment, registry)?;
        let entity = resolve_unique(entity_aliases, ModelFamily::Entity, registry)?;

        let mut set = AnalyzerSet::default();
        for d in sentiment {
            set.sentiment.push(load_one(d, loader, settings)?);
        }
        for d in entity {
            set.entity.push(load_one(d, loader, settings)?);
        }
        Ok(set)
    }

    pub fn descriptors(&self) -> Vec<&ModelDescriptor> {
        self.sentiment
            .iter()
            .chain(self.entity.iter())
            .map(Analyzer::describe)
            .collect()
    }
}

fn resolve_unique<'r>(
    aliases: &[String],
    family: ModelFamily,
    registry: &'r ModelRegistry,
) -> Result<Vec<&'r ModelDescriptor>, AnalysisError> {
    let mut out: Vec<&ModelDescriptor> = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let d = registry.resolve(alias.trim(), family)?;
        if out.iter().any(|e| e.alias == d.alias) {
            warn!(target: "engine", alias = %d.alias, %family, "alias listed twice; loading once");
            continue;
        }
        out.push(d);
    }
    Ok(out)
}

fn load_one(
    descriptor: &ModelDescriptor,
    loader: &dyn ModelLoader,
    settings: &AnalyzerSettings,
) -> Result<Analyzer, AnalysisError> {
    let backend = loader.load(descriptor)?;
    info!(
        target: "engine",
        alias = %descriptor.alias,
        model = %descriptor.backing_identifier,
        backend = backend.name(),
        "model loaded"
    );
    Analyzer::build(descriptor, backend, settings)
}
