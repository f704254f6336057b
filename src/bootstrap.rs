// src/bootstrap.rs
//! Wiring from [`AnalyzerConfig`] to ready-to-use components.

use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyze::hf::HfLoader;
use crate::analyze::{MockLoader, ModelLoader};
use crate::compare::ComparisonManager;
use crate::config::AnalyzerConfig;
use crate::engine::BatchComparisonEngine;
use crate::ingest::providers::{NewsApiSource, RssSource};
use crate::ingest::types::ArticleSource;
use crate::registry::ModelRegistry;

/// Mock loader when `inference.mode = "mock"`, otherwise the HTTP loader.
pub fn build_loader(cfg: &AnalyzerConfig) -> anyhow::Result<Box<dyn ModelLoader>> {
    if cfg.inference.is_mock() {
        info!("inference mode: mock");
        return Ok(Box::new(MockLoader::default()));
    }
    let loader = HfLoader::new(&cfg.inference).context("building inference loader")?;
    // Safe diagnostics: endpoint + cache only, never the token
    info!(
        base_url = %cfg.inference.base_url,
        cache = ?cfg.inference.cache_dir,
        daily_limit = cfg.inference.daily_limit,
        "inference mode: remote"
    );
    Ok(Box::new(loader))
}

/// News sources from config. A missing NewsAPI key is a configuration error
/// unless RSS feeds are configured, in which case NewsAPI is skipped with a warning.
pub fn build_sources(cfg: &AnalyzerConfig) -> anyhow::Result<Vec<Box<dyn ArticleSource>>> {
    let mut out: Vec<Box<dyn ArticleSource>> = Vec::new();
    match NewsApiSource::from_settings(&cfg.news) {
        Ok(src) => out.push(Box::new(src)),
        Err(e) if cfg.news.rss_feeds.is_empty() => {
            return Err(e).context("newsapi is the only configured source");
        }
        Err(e) => warn!(error = %e, "newsapi source disabled; using rss feeds only"),
    }
    let client = reqwest::Client::new();
    for (i, url) in cfg.news.rss_feeds.iter().enumerate() {
        out.push(Box::new(RssSource::from_url(&format!("rss-{i}"), url, client.clone())));
    }
    Ok(out)
}

pub struct Runtime {
    pub cfg: AnalyzerConfig,
    pub engine: Arc<BatchComparisonEngine>,
    pub manager: Arc<ComparisonManager>,
}

impl Runtime {
    /// Loads every configured model once; the comparison manager shares them.
    pub fn from_config(cfg: AnalyzerConfig) -> anyhow::Result<Self> {
        let loader = build_loader(&cfg)?;
        let engine = BatchComparisonEngine::from_config(&cfg, ModelRegistry::builtin(), loader.as_ref())?;
        let manager = ComparisonManager::from_engine(&engine, cfg.pacing());
        Ok(Self {
            cfg,
            engine: Arc::new(engine),
            manager: Arc::new(manager),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[serial_test::serial]
    #[test]
    fn mock_runtime_needs_no_credentials() {
        std::env::remove_var("HF_API_TOKEN");
        let mut cfg = AnalyzerConfig::default();
        cfg.inference.mode = "mock".to_string();
        let rt = Runtime::from_config(cfg).unwrap();
        assert_eq!(rt.engine.describe().len(), 2);
    }

    #[serial_test::serial]
    #[test]
    fn remote_runtime_without_token_fails() {
        std::env::remove_var("HF_API_TOKEN");
        std::env::remove_var("INFERENCE_MODE");
        let cfg = AnalyzerConfig::default();
        assert!(Runtime::from_config(cfg).is_err());
    }

    #[serial_test::serial]
    #[test]
    fn sources_skip_newsapi_without_key() {
        std::env::remove_var("NEWS_API_KEY");
        let mut cfg = AnalyzerConfig::default();
        cfg.news.rss_feeds = vec!["https://example.test/feed.xml".to_string()];
        let sources = build_sources(&cfg).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "rss-0");
    }

    #[serial_test::serial]
    #[test]
    fn missing_newsapi_key_without_feeds_is_an_error() {
        std::env::remove_var("NEWS_API_KEY");
        let cfg = AnalyzerConfig::default();
        assert!(cfg.news.rss_feeds.is_empty());
        let err = build_sources(&cfg).err().expect("missing key must fail");
        let chain = format!("{err:#}");
        assert!(chain.contains("NEWS_API_KEY"), "{chain}");
    }
}
