// tests/config_load.rs
use serial_test::serial;
use std::env;
use std::fs;

use news_sentiment::analyze::{MockBackend, MockLoader, ScorePolicy};
use news_sentiment::config::{AnalyzerConfig, ENV_CONFIG_PATH, ENV_INFERENCE_MODE};
use news_sentiment::{BatchComparisonEngine, ModelRegistry};

#[test]
#[serial]
fn repo_config_parses() {
    env::remove_var(ENV_INFERENCE_MODE);
    let cfg = AnalyzerConfig::load_from_file("config/analyzer.toml").expect("repo config");
    assert_eq!(
        cfg.sentiment_models,
        vec!["twitter-roberta", "distilbert-sst2", "finbert"]
    );
    assert_eq!(cfg.entity_models, vec!["bert-base-ner", "bert-large-ner"]);
    assert_eq!(cfg.policy(), ScorePolicy::Signed);
    assert!(!cfg.inference.is_mock());
    assert_eq!(cfg.inference.daily_limit, 500);

    // Every configured alias exists in the built-in registry.
    let reg = ModelRegistry::builtin();
    for a in &cfg.sentiment_models {
        reg.resolve(a, news_sentiment::ModelFamily::Sentiment).unwrap();
    }
    for a in &cfg.entity_models {
        reg.resolve(a, news_sentiment::ModelFamily::Entity).unwrap();
    }
}

#[test]
#[serial]
fn inference_mode_env_overrides_file() {
    env::set_var(ENV_INFERENCE_MODE, "mock");
    let cfg = AnalyzerConfig::load_from_file("config/analyzer.toml").unwrap();
    env::remove_var(ENV_INFERENCE_MODE);
    assert!(cfg.inference.is_mock());
}

#[test]
#[serial]
fn env_path_must_exist() {
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    let res = AnalyzerConfig::load_default();
    env::remove_var(ENV_CONFIG_PATH);
    assert!(res.is_err());
}

#[test]
#[serial]
fn env_path_is_used() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("analyzer.toml");
    fs::write(
        &path,
        "sentiment_models = [\"finbert\"]\nscore_policy = \"label_weighted\"\npacing_ms = 5\n",
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, &path);
    let cfg = AnalyzerConfig::load_default();
    env::remove_var(ENV_CONFIG_PATH);
    let cfg = cfg.unwrap();
    assert_eq!(cfg.sentiment_models, vec!["finbert"]);
    assert_eq!(cfg.policy(), ScorePolicy::LabelWeighted);
    assert_eq!(cfg.pacing().as_millis(), 5);
}

#[test]
#[serial]
fn misspelled_score_policy_fails_loading() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("analyzer.toml");
    fs::write(&path, "score_policy = \"weigted\"\n").unwrap();
    let err = AnalyzerConfig::load_from_file(&path).err().expect("must fail");
    assert!(format!("{err:#}").contains("weigted"), "{err:#}");
}

#[test]
#[serial]
fn unknown_alias_in_config_fails_construction() {
    let cfg: AnalyzerConfig = toml::from_str("sentiment_models = [\"gpt-sentiment\"]").unwrap();
    let res = BatchComparisonEngine::from_config(&cfg, ModelRegistry::builtin(), &MockLoader::default());
    let err = res.err().expect("must fail");
    assert!(err.to_string().contains("gpt-sentiment"));
}

#[tokio::test]
#[serial]
async fn custom_blocklist_drives_entity_filtering() {
    let tmp = tempfile::tempdir().unwrap();
    let list = tmp.path().join("sources.toml");
    fs::write(&list, "sources = [\"tesla\"]\n").unwrap();

    let mut cfg = AnalyzerConfig::default();
    cfg.sentiment_models = vec![];
    cfg.entity_models = vec!["bert-base-ner".to_string()];
    cfg.entity_filter.blocklist_path = Some(list);

    let loader = MockLoader::new(MockBackend::new().with_org("Tesla").with_org("Reuters"));
    let engine = BatchComparisonEngine::from_config(&cfg, ModelRegistry::builtin(), &loader).unwrap();
    let out = engine.analyze_batch(&["Tesla told Reuters"]).await;
    let set = out[0].entities_by_model["bert-base-ner"].success().unwrap();
    // Only the configured list applies.
    assert!(!set.contains("Tesla"));
    assert!(set.contains("Reuters"));
}
