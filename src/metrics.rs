use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(describe_all);
}

// Descriptions go to whichever recorder is installed at call time.
fn describe_all() {
    describe_counter!(
        "model_invocations_total",
        "Batched model invocations, by model alias."
    );
    describe_counter!(
        "model_failures_total",
        "Model invocations that failed, by model alias."
    );
    describe_histogram!("model_batch_ms", "Batched model invocation time in milliseconds.");
    describe_counter!(
        "inference_cache_hits_total",
        "Inputs answered from the inference response cache."
    );
    describe_counter!("pipeline_articles_total", "Articles analyzed by the pipeline.");
    describe_counter!(
        "pipeline_persist_errors_total",
        "Analysis records the sink failed to persist."
    );
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe_all();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
