// src/analyze/ner.rs
//! Company-name cleanup for token-classification output.
//!
//! Raw organization spans are noisy: tokenizer continuation markers (`##pple`),
//! corporate suffixes picked up as standalone entities, and news-source names
//! from bylines. [`EntityFilter::filter`] turns a candidate collection into a
//! deduplicated [`EntitySet`].
//!
//! Rules, in order, per candidate:
//! 1. strip every `#` and surrounding whitespace;
//! 2. reject if 2 characters or shorter;
//! 3. reject if the lowercase form equals a generic corporate term;
//! 4. reject if the lowercase form contains a news-source token (substring) or
//!    equals a whole-string source token.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::lists::load_terms_from;

pub const GENERIC_TERMS: &[&str] = &["inc", "ltd", "corp", "company", "co"];

/// Matched as substrings of the lowercased candidate.
pub const DEFAULT_NEWS_SOURCES: &[&str] = &[
    "reuters",
    "bloomberg",
    "cnbc",
    "wsj",
    "financial",
    "times",
    "cnn",
    "bbc",
    "nytimes",
    "theguardian",
    "forbes",
    "fortune",
];

/// Matched as whole names only, so "Apple" and "Comcast" are kept while "AP" is dropped.
pub const DEFAULT_EXACT_SOURCES: &[&str] = &["ap", "com"];

/// Filtered, deduplicated company names. Ordering carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub companies: BTreeSet<String>,
    pub count: usize,
}

impl EntitySet {
    pub fn from_set(companies: BTreeSet<String>) -> Self {
        let count = companies.len();
        Self { companies, count }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.companies.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct EntityFilter {
    sources: Vec<String>,
    exact_sources: Vec<String>,
}

impl Default for EntityFilter {
    fn default() -> Self {
        Self {
            sources: DEFAULT_NEWS_SOURCES.iter().map(|s| s.to_string()).collect(),
            exact_sources: DEFAULT_EXACT_SOURCES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EntityFilter {
    /// Custom source tokens (lowercased). Generic corporate terms always apply.
    pub fn with_sources<I, S>(sources: I, exact_sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sources: lowercase_all(sources),
            exact_sources: lowercase_all(exact_sources),
        }
    }

    /// Load source tokens from a TOML/JSON blocklist file.
    pub fn from_blocklist_file(path: &Path) -> anyhow::Result<Self> {
        let lists = load_terms_from(path)?;
        Ok(Self {
            sources: lists.sources,
            exact_sources: lists.exact,
        })
    }

    /// Clean a single candidate; `None` if it is rejected.
    pub fn clean(&self, raw: &str) -> Option<String> {
        let name = raw.replace('#', "");
        let name = name.trim();
        if name.chars().count() <= 2 {
            return None;
        }
        let lower = name.to_lowercase();
        if GENERIC_TERMS.contains(&lower.as_str()) {
            return None;
        }
        if self.exact_sources.iter().any(|s| *s == lower) {
            return None;
        }
        if self.sources.iter().any(|s| lower.contains(s.as_str())) {
            return None;
        }
        Some(name.to_string())
    }

    pub fn filter<I, S>(&self, candidates: I) -> EntitySet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let companies = candidates
            .into_iter()
            .filter_map(|c| self.clean(c.as_ref()))
            .collect();
        EntitySet::from_set(companies)
    }
}

fn lowercase_all<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markers_and_dedups() {
        let f = EntityFilter::default();
        let out = f.filter(["##Apple", "Apple ", " Apple", "Microsoft"]);
        assert_eq!(out.count, 2);
        assert!(out.contains("Apple"));
        assert!(out.contains("Microsoft"));
    }

    #[test]
    fn rejects_short_generic_and_sources() {
        let f = EntityFilter::default();
        let out = f.filter([
            "GE", "Inc", "CORP", "co", "Company", "Reuters", "Bloomberg News", "The Financial Times",
            "com", "AP",
        ]);
        assert!(out.is_empty(), "unexpected survivors: {:?}", out.companies);
    }

    #[test]
    fn short_source_tokens_do_not_eat_real_names() {
        let f = EntityFilter::default();
        let out = f.filter(["Apple", "Comcast", "Capital One"]);
        assert_eq!(out.count, 3);
    }

    #[test]
    fn custom_sources_replace_defaults() {
        let f = EntityFilter::with_sources(vec!["Acme Wire"], vec![]);
        let out = f.filter(["Reuters", "acme wire daily", "Tesla"]);
        assert!(out.contains("Reuters"));
        assert!(out.contains("Tesla"));
        assert!(!out.contains("acme wire daily"));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let f = EntityFilter::default();
        // Two characters, four bytes.
        assert!(f.clean("ÖÄ").is_none());
        assert_eq!(f.clean("ÖAG").as_deref(), Some("ÖAG"));
    }
}
