// src/persist.rs
//! Persistence of analyzed articles.
//!
//! One [`PersistedRecord`] per (article, analysis) pair: per-model scores
//! (null on failure), per-model errors and the merged company list.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::analyze::truncate_chars;
use crate::engine::ArticleAnalysis;
use crate::ingest::types::RawArticle;

/// Stored titles are capped at this many characters.
pub const MAX_TITLE_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub title: String,
    pub content: String,
    pub url: String,
    /// ISO-8601, or null when the source gave no date.
    pub published_at: Option<String>,
    pub sentiments: BTreeMap<String, Option<f32>>,
    pub errors: BTreeMap<String, String>,
    pub companies: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn from_analysis(article: &RawArticle, analysis: &ArticleAnalysis) -> Self {
        let sentiments = analysis
            .sentiments_by_model
            .iter()
            .map(|(alias, o)| (alias.clone(), o.success().map(|r| r.score)))
            .collect();
        Self {
            title: truncate_chars(&article.title, MAX_TITLE_CHARS).to_string(),
            content: article.content.clone(),
            url: article.url.clone(),
            published_at: article
                .published_at
                .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true)),
            sentiments,
            errors: analysis.errors(),
            companies: analysis.merged_companies().into_iter().collect(),
            analyzed_at: Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn persist(&self, record: &PersistedRecord) -> Result<()>;
}

/// Appends one JSON document per line; parent dirs are created on first write.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        writeln!(f, "{line}").with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AnalysisSink for JsonlSink {
    async fn persist(&self, record: &PersistedRecord) -> Result<()> {
        let line = serde_json::to_string(record).context("serializing record")?;
        self.append_line(&line)
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<PersistedRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<PersistedRecord> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl AnalysisSink for MemorySink {
    async fn persist(&self, record: &PersistedRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record.clone());
        Ok(())
    }
}
