// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::ingest::types::{ArticleSource, RawArticle};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_articles_total", "Articles parsed from sources.");
        describe_counter!("ingest_dedup_total", "Articles dropped as duplicate URLs.");
        describe_counter!("ingest_provider_errors_total", "Source fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Source parse time in milliseconds.");
    });
}

/// Decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Option<regex::Regex>> = OnceCell::new();
    if let Some(re_tags) = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").ok()) {
        out = re_tags.replace_all(&out, " ").to_string();
    }

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the first article per URL, preserving order.
pub fn dedup_by_url(articles: Vec<RawArticle>) -> (Vec<RawArticle>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(articles.len());
    let mut dropped = 0usize;
    for a in articles {
        if seen.insert(a.url.clone()) {
            keep.push(a);
        } else {
            dropped += 1;
        }
    }
    (keep, dropped)
}

/// Fetch every source in order; a failing source is logged and skipped.
pub async fn fetch_all(sources: &[Box<dyn ArticleSource>]) -> Vec<RawArticle> {
    ensure_metrics_described();

    let mut raw = Vec::new();
    for s in sources {
        match s.fetch_latest().await {
            Ok(mut v) => {
                tracing::info!(target: "ingest", source = s.name(), count = v.len(), "fetched articles");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, source = s.name(), "source error");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
    }

    let (kept, dropped) = dedup_by_url(raw);
    counter!("ingest_articles_total").increment(kept.len() as u64);
    counter!("ingest_dedup_total").increment(dropped as u64);
    kept
}
