// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// One fetched article, immutable after construction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RawArticle {
    pub title: String,
    pub content: String, // "{title}. {description}"
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl RawArticle {
    pub fn new(title: &str, description: Option<&str>, url: &str) -> Self {
        Self {
            title: title.to_string(),
            content: build_content(title, description),
            url: url.to_string(),
            published_at: None,
        }
    }

    pub fn published(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.published_at = at;
        self
    }

    /// Short stable id for logs (article text is never logged).
    pub fn short_id(&self) -> String {
        let digest = Sha256::digest(self.url.as_bytes());
        digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
    }
}

/// `"{title}. {description}"`, trimmed.
pub fn build_content(title: &str, description: Option<&str>) -> String {
    format!("{}. {}", title, description.unwrap_or_default())
        .trim()
        .to_string()
}

#[async_trait::async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawArticle>>;
    fn name(&self) -> &str;
}
