//! # Model Registry
//!
//! Static alias → model tables for each task family. Aliases are the stable keys
//! used everywhere else (config, results, persisted records); the backing
//! identifier is opaque and only the inference backend interprets it.
//!
//! The built-in table is initialised lazily once and is read-only afterwards.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AnalysisError;

/// Task family a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    Sentiment,
    Entity,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFamily::Sentiment => f.write_str("sentiment"),
            ModelFamily::Entity => f.write_str("entity"),
        }
    }
}

/// How a model is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStrategy {
    Classification,
    Generative,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub alias: String,
    pub backing_identifier: String,
    pub family: ModelFamily,
    pub strategy: ModelStrategy,
}

impl ModelDescriptor {
    pub fn new(
        alias: impl Into<String>,
        backing_identifier: impl Into<String>,
        family: ModelFamily,
        strategy: ModelStrategy,
    ) -> Self {
        Self {
            alias: alias.into(),
            backing_identifier: backing_identifier.into(),
            family,
            strategy,
        }
    }
}

const BUILTIN_TABLE: &[(&str, &str, ModelFamily, ModelStrategy)] = &[
    (
        "twitter-roberta",
        "cardiffnlp/twitter-roberta-base-sentiment-latest",
        ModelFamily::Sentiment,
        ModelStrategy::Classification,
    ),
    (
        "distilbert-sst2",
        "distilbert-base-uncased-finetuned-sst-2-english",
        ModelFamily::Sentiment,
        ModelStrategy::Classification,
    ),
    (
        "finbert",
        "yiyanghkust/finbert-tone",
        ModelFamily::Sentiment,
        ModelStrategy::Classification,
    ),
    (
        "llama-sentiment",
        "meta-llama/Llama-2-7b-chat-hf",
        ModelFamily::Sentiment,
        ModelStrategy::Generative,
    ),
    (
        "bert-base-ner",
        "dslim/bert-base-NER",
        ModelFamily::Entity,
        ModelStrategy::Classification,
    ),
    (
        "bert-large-ner",
        "dslim/bert-large-NER",
        ModelFamily::Entity,
        ModelStrategy::Classification,
    ),
];

static BUILTIN: Lazy<ModelRegistry> = Lazy::new(|| {
    let descriptors = BUILTIN_TABLE
        .iter()
        .map(|(alias, id, family, strategy)| ModelDescriptor::new(*alias, *id, *family, *strategy))
        .collect();
    ModelRegistry { descriptors }
});

/// Alias lookup table. Cheap to clone, never mutated after construction.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    descriptors: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// The process-wide built-in table.
    pub fn builtin() -> &'static ModelRegistry {
        &BUILTIN
    }

    /// Build a registry from an explicit table. Rejects duplicate aliases within a family.
    pub fn from_descriptors(descriptors: Vec<ModelDescriptor>) -> Result<Self, AnalysisError> {
        for (i, d) in descriptors.iter().enumerate() {
            let dup = descriptors[..i]
                .iter()
                .any(|e| e.family == d.family && e.alias == d.alias);
            if dup {
                return Err(AnalysisError::DuplicateAlias {
                    alias: d.alias.clone(),
                    family: d.family,
                });
            }
        }
        Ok(Self { descriptors })
    }

    pub fn resolve(&self, alias: &str, family: ModelFamily) -> Result<&ModelDescriptor, AnalysisError> {
        self.descriptors
            .iter()
            .find(|d| d.family == family && d.alias == alias)
            .ok_or_else(|| AnalysisError::UnknownModel {
                alias: alias.to_string(),
                family,
            })
    }

    /// Aliases of one family, in table order.
    pub fn aliases(&self, family: ModelFamily) -> Vec<&str> {
        self.descriptors
            .iter()
            .filter(|d| d.family == family)
            .map(|d| d.alias.as_str())
            .collect()
    }

    pub fn descriptors(&self) -> &[ModelDescriptor] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_aliases_per_family() {
        let reg = ModelRegistry::builtin();
        let d = reg.resolve("finbert", ModelFamily::Sentiment).unwrap();
        assert_eq!(d.backing_identifier, "yiyanghkust/finbert-tone");
        assert_eq!(d.strategy, ModelStrategy::Classification);

        let g = reg.resolve("llama-sentiment", ModelFamily::Sentiment).unwrap();
        assert_eq!(g.strategy, ModelStrategy::Generative);

        let n = reg.resolve("bert-large-ner", ModelFamily::Entity).unwrap();
        assert_eq!(n.backing_identifier, "dslim/bert-large-NER");
    }

    #[test]
    fn alias_is_scoped_to_its_family() {
        let reg = ModelRegistry::builtin();
        let err = reg.resolve("finbert", ModelFamily::Entity).unwrap_err();
        assert!(matches!(err, AnalysisError::UnknownModel { ref alias, family: ModelFamily::Entity } if alias == "finbert"));
    }

    #[test]
    fn duplicate_alias_in_same_family_is_rejected() {
        let table = vec![
            ModelDescriptor::new("a", "x/a", ModelFamily::Sentiment, ModelStrategy::Classification),
            ModelDescriptor::new("a", "x/b", ModelFamily::Sentiment, ModelStrategy::Generative),
        ];
        assert!(matches!(
            ModelRegistry::from_descriptors(table),
            Err(AnalysisError::DuplicateAlias { .. })
        ));

        // Same alias across families is fine.
        let ok = vec![
            ModelDescriptor::new("a", "x/a", ModelFamily::Sentiment, ModelStrategy::Classification),
            ModelDescriptor::new("a", "x/n", ModelFamily::Entity, ModelStrategy::Classification),
        ];
        assert!(ModelRegistry::from_descriptors(ok).is_ok());
    }

    #[test]
    fn aliases_listed_in_table_order() {
        let reg = ModelRegistry::builtin();
        assert_eq!(reg.aliases(ModelFamily::Entity), vec!["bert-base-ner", "bert-large-ner"]);
        assert_eq!(reg.aliases(ModelFamily::Sentiment).len(), 4);
    }
}
