// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::normalize_text;
use crate::ingest::types::{ArticleSource, RawArticle};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(ts.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// RSS 2.0 feed, either a fixed document or fetched over HTTP on every call.
pub struct RssSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssSource {
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    /// Items without a link or title are skipped, like NewsAPI entries.
    pub fn parse_items(xml: &str) -> Result<Vec<RawArticle>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            let url = it.link.as_deref().map(str::trim).unwrap_or_default();
            if title.is_empty() || url.is_empty() {
                continue;
            }
            let description = it.description.as_deref().map(normalize_text);
            out.push(
                RawArticle::new(&title, description.as_deref(), url)
                    .published(it.pub_date.as_deref().and_then(parse_rfc2822)),
            );
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl ArticleSource for RssSource {
    async fn fetch_latest(&self) -> Result<Vec<RawArticle>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .with_context(|| format!("rss http get {url}"))?
                    .text()
                    .await
                    .context("rss http .text()")?;
                Self::parse_items(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// quick-xml only knows the XML entities.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
  <item>
    <title>Apple&nbsp;beats estimates</title>
    <link>https://example.test/a</link>
    <pubDate>Tue, 14 Oct 2025 13:30:00 GMT</pubDate>
    <description>&lt;p&gt;Shares rose.&lt;/p&gt;</description>
  </item>
  <item><title>No link</title></item>
</channel></rss>"#;

    #[test]
    fn parses_items_and_skips_incomplete_ones() {
        let items = RssSource::parse_items(FEED).unwrap();
        assert_eq!(items.len(), 1);
        let a = &items[0];
        assert_eq!(a.title, "Apple beats estimates");
        assert_eq!(a.content, "Apple beats estimates. Shares rose.");
        assert_eq!(a.url, "https://example.test/a");
        assert_eq!(
            a.published_at.map(|d| d.to_rfc3339()),
            Some("2025-10-14T13:30:00+00:00".to_string())
        );
    }

    #[test]
    fn empty_channel_is_ok() {
        let items =
            RssSource::parse_items("<rss><channel><title>x</title></channel></rss>").unwrap();
        assert!(items.is_empty());
    }
}
