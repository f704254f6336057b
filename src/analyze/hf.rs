//! Hugging Face Inference HTTP backend.
//!
//! One backend per model: `POST {base_url}/{model_id}` with
//! `{"inputs": [...], "parameters": {...}}`. The same endpoint serves all three
//! pipelines; the request parameters and response shape differ per call.
//! Requires `HF_API_TOKEN` (or a literal token in config).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::backend::{DynBackend, EntitySpan, InferenceBackend, LabelScore, ModelLoader};
use super::cache::CachingBackend;
use crate::config::{resolve_secret, InferenceSettings};
use crate::error::{AnalysisError, ModelError};
use crate::registry::ModelDescriptor;

pub const ENV_HF_TOKEN: &str = "HF_API_TOKEN";

pub struct HfInferenceBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HfInferenceBackend {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, model_id: &str) -> Self {
        Self {
            http,
            endpoint: format!("{}/{}", base_url.trim_end_matches('/'), model_id),
            api_key: api_key.to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(&self, body: &Value) -> Result<T, ModelError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                code: status.as_u16(),
                body: text.chars().take(300).collect(),
            });
        }
        resp.json::<T>().await.map_err(|e| ModelError::Decode(e.to_string()))
    }
}

// Response shapes: list inputs yield one nested list per input; some endpoints
// flatten the outer list for a single input.

#[derive(Deserialize)]
#[serde(untagged)]
enum Batched<T> {
    Nested(Vec<Vec<T>>),
    Flat(Vec<T>),
}

#[derive(Deserialize)]
struct Generated {
    generated_text: String,
}

/// Classification: a flat list is either one top label per input or all labels
/// of a single input.
fn unpack_labels(resp: Batched<LabelScore>, n: usize) -> Vec<Vec<LabelScore>> {
    match resp {
        Batched::Nested(v) => v,
        Batched::Flat(v) if v.len() == n => v.into_iter().map(|ls| vec![ls]).collect(),
        Batched::Flat(v) if n == 1 => vec![v],
        Batched::Flat(v) => v.into_iter().map(|ls| vec![ls]).collect(),
    }
}

fn unpack_spans(resp: Batched<EntitySpan>, n: usize) -> Vec<Vec<EntitySpan>> {
    match resp {
        Batched::Nested(v) if v.is_empty() && n == 1 => vec![Vec::new()],
        Batched::Nested(v) => v,
        Batched::Flat(v) => vec![v],
    }
}

/// An empty inner list means no generation came back for that prompt.
fn unpack_generated(resp: Batched<Generated>) -> Vec<Option<String>> {
    match resp {
        Batched::Nested(v) => v
            .into_iter()
            .map(|g| g.into_iter().next().map(|x| x.generated_text))
            .collect(),
        Batched::Flat(v) => v.into_iter().map(|g| Some(g.generated_text)).collect(),
    }
}

#[async_trait]
impl InferenceBackend for HfInferenceBackend {
    async fn classify(&self, inputs: &[String]) -> Result<Vec<Vec<LabelScore>>, ModelError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "inputs": inputs,
            "options": { "wait_for_model": true },
        });
        let resp: Batched<LabelScore> = self.post(&body).await?;
        Ok(unpack_labels(resp, inputs.len()))
    }

    async fn generate(
        &self,
        prompts: &[String],
        max_new_tokens: u32,
    ) -> Result<Vec<Option<String>>, ModelError> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "inputs": prompts,
            "parameters": { "max_new_tokens": max_new_tokens, "return_full_text": false },
            "options": { "wait_for_model": true },
        });
        let resp: Batched<Generated> = self.post(&body).await?;
        Ok(unpack_generated(resp))
    }

    async fn extract(&self, inputs: &[String]) -> Result<Vec<Vec<EntitySpan>>, ModelError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "inputs": inputs,
            "parameters": { "aggregation_strategy": "simple" },
            "options": { "wait_for_model": true },
        });
        let resp: Batched<EntitySpan> = self.post(&body).await?;
        Ok(unpack_spans(resp, inputs.len()))
    }

    fn name(&self) -> &str {
        "hf-inference"
    }
}

/// Builds HTTP backends sharing one client, wrapped in the response cache when
/// a cache dir is configured.
pub struct HfLoader {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    settings: InferenceSettings,
}

impl HfLoader {
    pub fn new(settings: &InferenceSettings) -> Result<Self, AnalysisError> {
        let api_key = resolve_secret(&settings.api_token, ENV_HF_TOKEN)?;
        let http = reqwest::Client::builder()
            .user_agent("news-sentiment/0.1 (model comparison)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| AnalysisError::ModelLoad {
                alias: "*".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: settings.base_url.clone(),
            api_key,
            settings: settings.clone(),
        })
    }
}

impl ModelLoader for HfLoader {
    fn load(&self, descriptor: &ModelDescriptor) -> Result<DynBackend, AnalysisError> {
        let backend = HfInferenceBackend::new(
            self.http.clone(),
            &self.base_url,
            &self.api_key,
            &descriptor.backing_identifier,
        );
        match &self.settings.cache_dir {
            Some(root) => {
                let dir = root.join(cache_dir_name(&descriptor.alias));
                Ok(Arc::new(CachingBackend::new(
                    backend,
                    &descriptor.backing_identifier,
                    dir,
                    self.settings.daily_limit,
                )))
            }
            None => Ok(Arc::new(backend)),
        }
    }
}

fn cache_dir_name(alias: &str) -> String {
    alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_and_model() {
        let b = HfInferenceBackend::new(
            reqwest::Client::new(),
            "https://example.test/models/",
            "k",
            "dslim/bert-base-NER",
        );
        assert_eq!(b.endpoint(), "https://example.test/models/dslim/bert-base-NER");
    }

    #[test]
    fn classification_shapes() {
        let nested: Batched<LabelScore> = serde_json::from_str(
            r#"[[{"label":"positive","score":0.9},{"label":"negative","score":0.1}],[{"label":"neutral","score":0.8}]]"#,
        )
        .unwrap();
        let out = unpack_labels(nested, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 2);

        // Single input, all labels flattened.
        let flat: Batched<LabelScore> = serde_json::from_str(
            r#"[{"label":"POSITIVE","score":0.99},{"label":"NEGATIVE","score":0.01}]"#,
        )
        .unwrap();
        let out = unpack_labels(flat, 1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);

        // Top label per input.
        let flat: Batched<LabelScore> = serde_json::from_str(
            r#"[{"label":"POSITIVE","score":0.99},{"label":"NEGATIVE","score":0.7}]"#,
        )
        .unwrap();
        assert_eq!(unpack_labels(flat, 2).len(), 2);
    }

    #[test]
    fn token_classification_shapes() {
        let nested: Batched<EntitySpan> = serde_json::from_str(
            r#"[[{"entity_group":"ORG","word":"Apple","score":0.99,"start":0,"end":5}],[]]"#,
        )
        .unwrap();
        let out = unpack_spans(nested, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0][0].word, "Apple");
        assert!(out[1].is_empty());

        let empty: Batched<EntitySpan> = serde_json::from_str("[]").unwrap();
        assert_eq!(unpack_spans(empty, 1).len(), 1);
    }

    #[test]
    fn generation_shapes() {
        let flat: Batched<Generated> =
            serde_json::from_str(r#"[{"generated_text":" Positive"}]"#).unwrap();
        assert_eq!(unpack_generated(flat), vec![Some(" Positive".to_string())]);

        let nested: Batched<Generated> = serde_json::from_str(
            r#"[[{"generated_text":"Negative"}],[],[{"generated_text":"Neutral"}]]"#,
        )
        .unwrap();
        assert_eq!(
            unpack_generated(nested),
            vec![Some("Negative".to_string()), None, Some("Neutral".to_string())]
        );
    }

    #[serial_test::serial]
    #[test]
    fn loader_requires_token() {
        std::env::remove_var(ENV_HF_TOKEN);
        let err = HfLoader::new(&InferenceSettings::default()).err().unwrap();
        assert!(matches!(err, AnalysisError::MissingCredential(ENV_HF_TOKEN)));
    }
}
