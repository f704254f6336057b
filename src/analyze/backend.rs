//! Inference backends: the "loaded model handle" behind every analyzer.
//!
//! A backend performs one of three pipeline calls over a whole batch of inputs.
//! Backends are built once per model by a [`ModelLoader`] and are only invoked
//! through `&self` afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ModelError};
use crate::registry::ModelDescriptor;

/// Raw classifier output: label + confidence, verbatim from the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// One aggregated entity span from a token-classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub entity_group: String,
    pub word: String,
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Text classification: all candidate labels per input.
    async fn classify(&self, _inputs: &[String]) -> Result<Vec<Vec<LabelScore>>, ModelError> {
        Err(ModelError::Unsupported("text-classification"))
    }

    /// Text generation: only the newly generated text per prompt, `None` when the
    /// endpoint produced no generation for that prompt.
    async fn generate(
        &self,
        _prompts: &[String],
        _max_new_tokens: u32,
    ) -> Result<Vec<Option<String>>, ModelError> {
        Err(ModelError::Unsupported("text-generation"))
    }

    /// Token classification with sub-word fragments merged into whole spans.
    async fn extract(&self, _inputs: &[String]) -> Result<Vec<Vec<EntitySpan>>, ModelError> {
        Err(ModelError::Unsupported("token-classification"))
    }

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

pub type DynBackend = Arc<dyn InferenceBackend>;

/// Builds one backend handle per model descriptor.
pub trait ModelLoader: Send + Sync {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<DynBackend, AnalysisError>;
}

// ------------------------------------------------------------
// Deterministic mock backend
// ------------------------------------------------------------

/// Keyword-driven mock used by tests and `INFERENCE_MODE=mock`.
///
/// - `classify`: first rule whose keyword occurs in the (lowercased) input wins,
///   otherwise the default label.
/// - `generate`: fixed text if configured, else `"Sentiment: <label>"` using the
///   same rules on the prompt.
/// - `extract`: one span per configured entity whose word occurs in the input.
#[derive(Debug, Clone)]
pub struct MockBackend {
    rules: Vec<(String, LabelScore)>,
    default_label: LabelScore,
    entities: Vec<EntitySpan>,
    generation: Option<String>,
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default_label: LabelScore::new("neutral", 0.5),
            entities: Vec::new(),
            generation: None,
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Demo setup for running the binary without a remote endpoint.
    pub fn financial_demo() -> Self {
        let mut m = Self::new();
        for kw in ["soar", "surge", "record", "beat", "gain", "rall"] {
            m = m.with_rule(kw, "positive", 0.95);
        }
        for kw in ["drop", "fall", "plunge", "slump", "investigation", "antitrust", "miss"] {
            m = m.with_rule(kw, "negative", 0.9);
        }
        for org in [
            "Apple",
            "Microsoft",
            "Tesla",
            "Amazon",
            "Nvidia",
            "Alphabet",
            "Federal Reserve",
            "Reuters",
        ] {
            m = m.with_org(org);
        }
        m
    }

    pub fn with_rule(mut self, keyword: &str, label: &str, score: f32) -> Self {
        self.rules
            .push((keyword.to_lowercase(), LabelScore::new(label, score)));
        self
    }

    pub fn with_default_label(mut self, label: &str, score: f32) -> Self {
        self.default_label = LabelScore::new(label, score);
        self
    }

    pub fn with_org(self, word: &str) -> Self {
        self.with_entity("ORG", word)
    }

    /// Emitted when the input contains `word` with `#` markers removed.
    pub fn with_entity(mut self, group: &str, word: &str) -> Self {
        self.entities.push(EntitySpan {
            entity_group: group.to_string(),
            word: word.to_string(),
            score: 0.99,
        });
        self
    }

    pub fn with_generation(mut self, text: &str) -> Self {
        self.generation = Some(text.to_string());
        self
    }

    /// Every call fails with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Number of backend invocations (one per batch call).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(msg) => Err(ModelError::Other(msg.clone())),
            None => Ok(()),
        }
    }

    fn label_for(&self, text: &str) -> LabelScore {
        let lower = text.to_lowercase();
        self.rules
            .iter()
            .find(|(kw, _)| lower.contains(kw.as_str()))
            .map(|(_, ls)| ls.clone())
            .unwrap_or_else(|| self.default_label.clone())
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn classify(&self, inputs: &[String]) -> Result<Vec<Vec<LabelScore>>, ModelError> {
        self.enter()?;
        Ok(inputs.iter().map(|t| vec![self.label_for(t)]).collect())
    }

    async fn generate(
        &self,
        prompts: &[String],
        _max_new_tokens: u32,
    ) -> Result<Vec<Option<String>>, ModelError> {
        self.enter()?;
        Ok(prompts
            .iter()
            .map(|p| match &self.generation {
                Some(fixed) => Some(fixed.clone()),
                None => Some(format!(" Sentiment: {}", self.label_for(p).label)),
            })
            .collect())
    }

    async fn extract(&self, inputs: &[String]) -> Result<Vec<Vec<EntitySpan>>, ModelError> {
        self.enter()?;
        Ok(inputs
            .iter()
            .map(|t| {
                self.entities
                    .iter()
                    .filter(|e| t.contains(e.word.replace('#', "").trim()))
                    .cloned()
                    .collect()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Loader handing out mock backends; per-alias overrides, else a shared fallback.
#[derive(Clone)]
pub struct MockLoader {
    overrides: HashMap<String, DynBackend>,
    fallback: MockBackend,
    loads: Arc<AtomicUsize>,
}

impl MockLoader {
    pub fn new(fallback: MockBackend) -> Self {
        Self {
            overrides: HashMap::new(),
            fallback,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_backend(mut self, alias: &str, backend: DynBackend) -> Self {
        self.overrides.insert(alias.to_string(), backend);
        self
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for MockLoader {
    fn default() -> Self {
        Self::new(MockBackend::financial_demo())
    }
}

impl ModelLoader for MockLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<DynBackend, AnalysisError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .overrides
            .get(&descriptor.alias)
            .cloned()
            .unwrap_or_else(|| Arc::new(self.fallback.clone())))
    }
}
