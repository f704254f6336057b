// src/config/lists.rs
//! Term-list loading (news-source blocklist). Supports TOML or JSON formats.
//!
//! TOML shape:
//! ```toml
//! sources = ["reuters", "bloomberg"]   # substring match
//! exact = ["ap", "com"]                # whole-string match (optional)
//! ```
//! JSON shape: a plain array, treated as `sources`.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Blocklist terms, lowercased, trimmed, deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermLists {
    pub sources: Vec<String>,
    pub exact: Vec<String>,
}

/// Load a blocklist from an explicit path; the extension hints the format.
pub fn load_terms_from(path: &Path) -> Result<TermLists> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading blocklist from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_terms(&content, ext.as_str())
}

fn parse_terms(s: &str, hint_ext: &str) -> Result<TermLists> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("sources");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported blocklist format"))
}

fn parse_toml(s: &str) -> Result<TermLists> {
    #[derive(serde::Deserialize)]
    struct TomlTerms {
        sources: Vec<String>,
        #[serde(default)]
        exact: Vec<String>,
    }
    let v: TomlTerms = toml::from_str(s)?;
    Ok(TermLists {
        sources: clean_list(v.sources),
        exact: clean_list(v.exact),
    })
}

fn parse_json(s: &str) -> Result<TermLists> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(TermLists {
        sources: clean_list(v),
        exact: Vec::new(),
    })
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim().to_lowercase();
        if !t.is_empty() {
            set.insert(t);
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_trim_lowercase_and_formats_work() {
        let toml = r#"sources = [" Reuters ", "", "bloomberg", "Bloomberg"]
exact = ["AP"]"#;
        let out = parse_toml(toml).unwrap();
        assert_eq!(out.sources, vec!["bloomberg".to_string(), "reuters".to_string()]);
        assert_eq!(out.exact, vec!["ap".to_string()]);

        let json = r#"["CNBC", "  wsj  ", ""]"#;
        let out = parse_json(json).unwrap();
        assert_eq!(out.sources, vec!["cnbc".to_string(), "wsj".to_string()]);
        assert!(out.exact.is_empty());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_terms("not a list at all {", "txt").is_err());
    }
}
