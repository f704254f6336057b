// src/config/mod.rs
//! Runtime configuration loaded from `config/analyzer.toml`.
//!
//! Lookup order for the file:
//! 1) `$ANALYZER_CONFIG_PATH` (must exist),
//! 2) `config/analyzer.toml`,
//! 3) built-in defaults.
//!
//! Secrets may be written as `"ENV"`; they are resolved from the environment only
//! when the collaborator that needs them is built (see [`resolve_secret`]).

pub mod lists;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use crate::analyze::{AnalyzerSettings, EntityFilter, ScorePolicy, DEFAULT_PROMPT_TEMPLATE};
use crate::error::AnalysisError;

pub const ENV_CONFIG_PATH: &str = "ANALYZER_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/analyzer.toml";
/// Overrides `inference.mode` ("remote" | "mock").
pub const ENV_INFERENCE_MODE: &str = "INFERENCE_MODE";

fn default_sentiment_models() -> Vec<String> {
    vec!["twitter-roberta".to_string()]
}
fn default_entity_models() -> Vec<String> {
    vec!["bert-base-ner".to_string()]
}
fn default_score_policy() -> String {
    "signed".to_string()
}
fn default_pacing_ms() -> u64 {
    100
}
fn default_batch_size() -> usize {
    16
}
fn default_max_new_tokens() -> u32 {
    50
}
fn default_env() -> String {
    "ENV".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_sentiment_models")]
    pub sentiment_models: Vec<String>,
    #[serde(default = "default_entity_models")]
    pub entity_models: Vec<String>,
    /// "signed" | "label_weighted"
    #[serde(default = "default_score_policy")]
    pub score_policy: String,
    /// Delay between sequential calls on the diagnostics path.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Articles per engine batch in the pipeline.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub inference: InferenceSettings,
    #[serde(default)]
    pub entity_filter: EntityFilterSettings,
    #[serde(default)]
    pub news: NewsSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceSettings {
    /// "remote" | "mock"
    #[serde(default = "InferenceSettings::default_mode")]
    pub mode: String,
    #[serde(default = "InferenceSettings::default_base_url")]
    pub base_url: String,
    /// "ENV" means: read from HF_API_TOKEN
    #[serde(default = "default_env")]
    pub api_token: String,
    #[serde(default = "InferenceSettings::default_timeout_secs")]
    pub timeout_secs: u64,
    /// Response cache root; `None` disables caching.
    #[serde(default = "InferenceSettings::default_cache_dir")]
    pub cache_dir: Option<PathBuf>,
    /// Real remote calls per model per day.
    #[serde(default = "InferenceSettings::default_daily_limit")]
    pub daily_limit: u32,
}

impl InferenceSettings {
    fn default_mode() -> String {
        "remote".to_string()
    }
    fn default_base_url() -> String {
        "https://api-inference.huggingface.co/models".to_string()
    }
    fn default_timeout_secs() -> u64 {
        30
    }
    fn default_cache_dir() -> Option<PathBuf> {
        Some(PathBuf::from("cache/inference"))
    }
    fn default_daily_limit() -> u32 {
        500
    }

    pub fn is_mock(&self) -> bool {
        self.mode.eq_ignore_ascii_case("mock")
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            base_url: Self::default_base_url(),
            api_token: default_env(),
            timeout_secs: Self::default_timeout_secs(),
            cache_dir: Self::default_cache_dir(),
            daily_limit: Self::default_daily_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityFilterSettings {
    /// TOML/JSON news-source blocklist; built-in list when absent.
    #[serde(default)]
    pub blocklist_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSettings {
    /// "ENV" means: read from NEWS_API_KEY
    #[serde(default = "default_env")]
    pub api_key: String,
    #[serde(default = "NewsSettings::default_country")]
    pub country: String,
    #[serde(default = "NewsSettings::default_category")]
    pub category: String,
    #[serde(default = "NewsSettings::default_page_size")]
    pub page_size: u32,
    /// Extra RSS feeds fetched alongside NewsAPI.
    #[serde(default)]
    pub rss_feeds: Vec<String>,
}

impl NewsSettings {
    fn default_country() -> String {
        "us".to_string()
    }
    fn default_category() -> String {
        "business".to_string()
    }
    fn default_page_size() -> u32 {
        50
    }
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            api_key: default_env(),
            country: Self::default_country(),
            category: Self::default_category(),
            page_size: Self::default_page_size(),
            rss_feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "OutputSettings::default_path")]
    pub path: PathBuf,
}

impl OutputSettings {
    fn default_path() -> PathBuf {
        PathBuf::from("data/analyses.jsonl")
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sentiment_models: default_sentiment_models(),
            entity_models: default_entity_models(),
            score_policy: default_score_policy(),
            pacing_ms: default_pacing_ms(),
            batch_size: default_batch_size(),
            prompt_template: None,
            max_new_tokens: default_max_new_tokens(),
            inference: InferenceSettings::default(),
            entity_filter: EntityFilterSettings::default(),
            news: NewsSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading analyzer config from {}", path.display()))?;
        let mut cfg: AnalyzerConfig = toml::from_str(&data)
            .with_context(|| format!("parsing analyzer config {}", path.display()))?;
        cfg.sanitize()
            .with_context(|| format!("validating analyzer config {}", path.display()))?;
        Ok(cfg)
    }

    /// Env path → default path → built-in defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(pb);
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load_from_file(default_path);
        }
        let mut cfg = Self::default();
        cfg.sanitize()?;
        Ok(cfg)
    }

    /// Normalizes values in place; an unknown `score_policy` is rejected.
    fn sanitize(&mut self) -> Result<()> {
        self.score_policy = match ScorePolicy::parse(&self.score_policy) {
            Some(ScorePolicy::Signed) => "signed".to_string(),
            Some(ScorePolicy::LabelWeighted) => "label_weighted".to_string(),
            None => {
                return Err(anyhow!(
                    "unknown score_policy {:?} (expected \"signed\" or \"label_weighted\")",
                    self.score_policy.trim()
                ));
            }
        };
        if self.batch_size == 0 {
            self.batch_size = default_batch_size();
        }
        if self.max_new_tokens == 0 {
            self.max_new_tokens = default_max_new_tokens();
        }
        self.sentiment_models = trim_aliases(&self.sentiment_models);
        self.entity_models = trim_aliases(&self.entity_models);

        if let Ok(mode) = env::var(ENV_INFERENCE_MODE) {
            if !mode.trim().is_empty() {
                self.inference.mode = mode.trim().to_ascii_lowercase();
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> ScorePolicy {
        ScorePolicy::parse(&self.score_policy).unwrap_or_default()
    }

    pub fn pacing(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pacing_ms)
    }

    /// Analyzer construction settings; reads the blocklist file if configured.
    pub fn analyzer_settings(&self) -> Result<AnalyzerSettings> {
        let filter = match &self.entity_filter.blocklist_path {
            Some(p) => EntityFilter::from_blocklist_file(p)?,
            None => EntityFilter::default(),
        };
        Ok(AnalyzerSettings {
            prompt_template: self
                .prompt_template
                .clone()
                .unwrap_or_else(|| DEFAULT_PROMPT_TEMPLATE.to_string()),
            max_new_tokens: self.max_new_tokens,
            entity_filter: Arc::new(filter),
        })
    }
}

fn trim_aliases(aliases: &[String]) -> Vec<String> {
    aliases
        .iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// `"ENV"` (any case) → value of `var`; anything else is taken literally.
/// Empty results are a missing credential.
pub fn resolve_secret(value: &str, var: &'static str) -> Result<String, AnalysisError> {
    let resolved = if value.trim().eq_ignore_ascii_case("env") {
        env::var(var).unwrap_or_default()
    } else {
        value.trim().to_string()
    };
    if resolved.is_empty() {
        Err(AnalysisError::MissingCredential(var))
    } else {
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: AnalyzerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.sentiment_models, vec!["twitter-roberta".to_string()]);
        assert_eq!(cfg.entity_models, vec!["bert-base-ner".to_string()]);
        assert_eq!(cfg.policy(), ScorePolicy::Signed);
        assert_eq!(cfg.pacing_ms, 100);
        assert_eq!(cfg.inference.api_token, "ENV");
        assert_eq!(cfg.news.page_size, 50);
    }

    #[serial_test::serial]
    #[test]
    fn sanitize_fixes_bad_values() {
        env::remove_var(ENV_INFERENCE_MODE);
        let mut cfg: AnalyzerConfig = toml::from_str(
            r#"
sentiment_models = [" finbert ", ""]
score_policy = "Label-Weighted"
batch_size = 0
"#,
        )
        .unwrap();
        cfg.sanitize().unwrap();
        assert_eq!(cfg.sentiment_models, vec!["finbert".to_string()]);
        assert_eq!(cfg.policy(), ScorePolicy::LabelWeighted);
        assert_eq!(cfg.batch_size, 16);
    }

    #[serial_test::serial]
    #[test]
    fn misspelled_score_policy_is_rejected() {
        env::remove_var(ENV_INFERENCE_MODE);
        let mut cfg = AnalyzerConfig::default();
        cfg.score_policy = "weigted".into();
        let err = cfg.sanitize().unwrap_err();
        assert!(err.to_string().contains("weigted"), "{err}");
    }

    #[serial_test::serial]
    #[test]
    fn secrets_resolve_from_env_or_literal() {
        env::remove_var("HF_API_TOKEN");
        assert!(matches!(
            resolve_secret("ENV", "HF_API_TOKEN"),
            Err(AnalysisError::MissingCredential("HF_API_TOKEN"))
        ));
        env::set_var("HF_API_TOKEN", "hf_abc");
        assert_eq!(resolve_secret("env", "HF_API_TOKEN").unwrap(), "hf_abc");
        env::remove_var("HF_API_TOKEN");
        assert_eq!(resolve_secret(" literal ", "HF_API_TOKEN").unwrap(), "literal");
    }
}
