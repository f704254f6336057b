// src/ingest/providers/newsapi.rs
//! NewsAPI top headlines (`/v2/top-headlines`).
//!
//! Transient statuses (429, 5xx) are retried with exponential backoff; every
//! other failure surfaces to `fetch_all`, which logs it and moves on.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{resolve_secret, NewsSettings};
use crate::error::AnalysisError;
use crate::ingest::types::{ArticleSource, RawArticle};

pub const NEWS_API_URL: &str = "https://newsapi.org/v2/top-headlines";
pub const ENV_NEWS_API_KEY: &str = "NEWS_API_KEY";

const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    articles: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Entry {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    published_at: Option<String>,
}

pub struct NewsApiSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    country: String,
    category: String,
    page_size: u32,
}

impl NewsApiSource {
    /// Fails when the API key is neither configured nor in `NEWS_API_KEY`.
    pub fn from_settings(settings: &NewsSettings) -> Result<Self, AnalysisError> {
        let api_key = resolve_secret(&settings.api_key, ENV_NEWS_API_KEY)?;
        let client = reqwest::Client::builder()
            .user_agent("news-sentiment/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::ModelLoad {
                alias: "newsapi".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: NEWS_API_URL.to_string(),
            api_key,
            country: settings.country.clone(),
            category: settings.category.clone(),
            page_size: settings.page_size,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn parse_response(body: &str) -> Result<Vec<RawArticle>> {
        let t0 = std::time::Instant::now();
        let resp: Response = serde_json::from_str(body).context("parsing newsapi response")?;
        let out: Vec<RawArticle> = resp
            .articles
            .into_iter()
            .filter_map(|e| {
                let title = e.title.filter(|t| !t.trim().is_empty())?;
                let url = e.url.filter(|u| !u.trim().is_empty())?;
                let published = e
                    .published_at
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc));
                Some(RawArticle::new(&title, e.description.as_deref(), &url).published(published))
            })
            .collect();
        histogram!("ingest_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(out)
    }

    async fn get_with_retry(&self) -> Result<String> {
        let page_size = self.page_size.to_string();
        let mut attempt = 0u32;
        loop {
            let resp = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("category", self.category.as_str()),
                    ("country", self.country.as_str()),
                    ("pageSize", page_size.as_str()),
                    ("apiKey", self.api_key.as_str()),
                ])
                .send()
                .await
                .context("newsapi http get")?;

            let status = resp.status();
            if status.is_success() {
                return resp.text().await.context("newsapi http .text()");
            }
            let transient = status.as_u16() == 429 || status.is_server_error();
            if !transient || attempt >= MAX_RETRIES {
                return Err(anyhow!("newsapi returned {status}"));
            }
            let delay = BACKOFF_BASE * 2u32.pow(attempt);
            tracing::debug!(target: "ingest", %status, attempt, ?delay, "newsapi retry");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl ArticleSource for NewsApiSource {
    async fn fetch_latest(&self) -> Result<Vec<RawArticle>> {
        let body = self.get_with_retry().await?;
        Self::parse_response(&body)
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_entries_without_url_or_title() {
        let body = r#"{"status":"ok","articles":[
            {"title":"Apple hits record","description":"Shares jumped.","url":"https://x/1","publishedAt":"2025-10-14T12:00:00Z"},
            {"title":"No url","description":"d","url":null},
            {"title":"","url":"https://x/3"},
            {"title":"No description","description":null,"url":"https://x/4","publishedAt":"garbage"}
        ]}"#;
        let out = NewsApiSource::parse_response(body).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content, "Apple hits record. Shares jumped.");
        assert!(out[0].published_at.is_some());
        assert_eq!(out[1].content, "No description.");
        assert!(out[1].published_at.is_none());
    }

    #[serial_test::serial]
    #[test]
    fn missing_key_is_a_configuration_error() {
        std::env::remove_var(ENV_NEWS_API_KEY);
        let err = NewsApiSource::from_settings(&NewsSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::MissingCredential(ENV_NEWS_API_KEY)));
    }
}
