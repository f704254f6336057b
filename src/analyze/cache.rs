//! Response cache + daily limit around any inference backend.
//!
//! - Per-input results are stored as JSON files keyed by
//!   sha256(model, task, input); a batch only sends its misses to the inner
//!   backend, in one call.
//! - Real calls count against a per-day limit persisted next to the cache;
//!   cache hits do not.
//! - Writes go through a `.tmp` file + rename.
//! - Empty results (no labels, no generation) are returned but never cached.

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::backend::{EntitySpan, InferenceBackend, LabelScore};
use crate::error::ModelError;

pub struct CachingBackend<B: InferenceBackend> {
    inner: B,
    model_id: String,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<B: InferenceBackend> CachingBackend<B> {
    pub fn new(inner: B, model_id: &str, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(target: "inference", dir = %cache_dir.display(), error = %e, "cache dir not created");
        }
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            model_id: model_id.to_string(),
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    /// Real calls made today.
    pub fn calls_today(&self) -> u32 {
        let g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired() {
            0
        } else {
            g.count
        }
    }

    fn reserve_call(&self) -> Result<(), ModelError> {
        let mut g = self.counter.lock().unwrap_or_else(|p| p.into_inner());
        if g.is_expired() {
            g.reset_to_today();
        }
        if g.count >= self.daily_limit_max {
            return Err(ModelError::RateLimited(self.daily_limit_max));
        }
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(())
    }

    async fn through_cache<T, F, Fut>(
        &self,
        task: &str,
        inputs: &[String],
        cacheable: fn(&T) -> bool,
        fetch: F,
    ) -> Result<Vec<T>, ModelError>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Vec<String>) -> Fut + Send,
        Fut: Future<Output = Result<Vec<T>, ModelError>> + Send,
    {
        let keys: Vec<String> = inputs
            .iter()
            .map(|i| cache_key(&self.model_id, task, i))
            .collect();

        let mut slots: Vec<Option<T>> = keys
            .iter()
            .map(|k| read_cache_file(&self.cache_dir, k))
            .collect();
        let misses: Vec<usize> = (0..slots.len()).filter(|&i| slots[i].is_none()).collect();

        let hits = (slots.len() - misses.len()) as u64;
        if hits > 0 {
            counter!("inference_cache_hits_total").increment(hits);
        }

        if !misses.is_empty() {
            self.reserve_call()?;
            let miss_inputs: Vec<String> = misses.iter().map(|&i| inputs[i].clone()).collect();
            let fresh = fetch(miss_inputs).await?;
            if fresh.len() != misses.len() {
                return Err(ModelError::LengthMismatch {
                    expected: misses.len(),
                    got: fresh.len(),
                });
            }
            for (&i, value) in misses.iter().zip(fresh) {
                if cacheable(&value) {
                    if let Err(e) = write_cache_file(&self.cache_dir, &keys[i], &value) {
                        debug!(target: "inference", error = %e, "cache write failed");
                    }
                }
                slots[i] = Some(value);
            }
        }

        slots
            .into_iter()
            .map(|s| s.ok_or_else(|| ModelError::Other("cache slot left empty".to_string())))
            .collect()
    }
}

#[async_trait]
impl<B: InferenceBackend> InferenceBackend for CachingBackend<B> {
    async fn classify(&self, inputs: &[String]) -> Result<Vec<Vec<LabelScore>>, ModelError> {
        self.through_cache(
            "classify",
            inputs,
            |v: &Vec<LabelScore>| !v.is_empty(),
            |miss| async move { self.inner.classify(&miss).await },
        )
        .await
    }

    async fn generate(
        &self,
        prompts: &[String],
        max_new_tokens: u32,
    ) -> Result<Vec<Option<String>>, ModelError> {
        let task = format!("generate:{max_new_tokens}");
        self.through_cache(
            &task,
            prompts,
            |v: &Option<String>| v.is_some(),
            |miss| async move { self.inner.generate(&miss, max_new_tokens).await },
        )
        .await
    }

    async fn extract(&self, inputs: &[String]) -> Result<Vec<Vec<EntitySpan>>, ModelError> {
        self.through_cache(
            "extract",
            inputs,
            |_: &Vec<EntitySpan>| true,
            |miss| async move { self.inner.extract(&miss).await },
        )
        .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(model_id: &str, task: &str, input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(task.as_bytes());
    hasher.update([0u8]);
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file<T: DeserializeOwned>(dir: &Path, key: &str) -> Option<T> {
    let buf = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file<T: Serialize>(dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let path = cache_path(dir, key);
    let json = serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&path, json.as_bytes())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}

impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}

impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_atomic(&counter_path(dir), s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::backend::MockBackend;

    #[tokio::test]
    async fn second_batch_is_served_from_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockBackend::new().with_rule("soared", "positive", 0.95);
        let cached = CachingBackend::new(mock.clone(), "m/a", tmp.path().to_path_buf(), 10);

        let inputs = vec!["Apple soared".to_string(), "Flat day".to_string()];
        let first = cached.classify(&inputs).await.unwrap();
        let second = cached.classify(&inputs).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(cached.calls_today(), 1);
    }

    #[tokio::test]
    async fn only_misses_reach_the_backend_and_order_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockBackend::new()
            .with_rule("up", "positive", 0.9)
            .with_rule("down", "negative", 0.8);
        let cached = CachingBackend::new(mock.clone(), "m/b", tmp.path().to_path_buf(), 10);

        cached.classify(&["up".to_string()]).await.unwrap();
        let out = cached
            .classify(&["down".to_string(), "up".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0][0].label, "negative");
        assert_eq!(out[1][0].label, "positive");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls_but_not_hits() {
        let tmp = tempfile::tempdir().unwrap();
        let mock = MockBackend::new().with_org("Apple");
        let cached = CachingBackend::new(mock.clone(), "m/n", tmp.path().to_path_buf(), 1);

        cached.extract(&["Apple".to_string()]).await.unwrap();
        let err = cached.extract(&["Other".to_string()]).await.unwrap_err();
        assert!(matches!(err, ModelError::RateLimited(1)));
        // Cached input still answers.
        assert!(cached.extract(&["Apple".to_string()]).await.is_ok());
        assert_eq!(mock.call_count(), 1);
    }

    struct Silent;
    #[async_trait]
    impl InferenceBackend for Silent {
        async fn generate(
            &self,
            prompts: &[String],
            _max_new_tokens: u32,
        ) -> Result<Vec<Option<String>>, ModelError> {
            Ok(prompts.iter().map(|_| None).collect())
        }
        fn name(&self) -> &str {
            "silent"
        }
    }

    #[tokio::test]
    async fn missing_generations_are_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cached = CachingBackend::new(Silent, "m/g", tmp.path().to_path_buf(), 10);
        let prompts = vec!["p".to_string()];
        assert_eq!(cached.generate(&prompts, 8).await.unwrap(), vec![None]);
        assert_eq!(cached.generate(&prompts, 8).await.unwrap(), vec![None]);
        // Both calls went to the backend.
        assert_eq!(cached.calls_today(), 2);
    }

    #[test]
    fn keys_depend_on_model_and_task() {
        let a = cache_key("m1", "classify", "x");
        assert_ne!(a, cache_key("m2", "classify", "x"));
        assert_ne!(a, cache_key("m1", "extract", "x"));
        assert_eq!(a.len(), 32);
    }
}
