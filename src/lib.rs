// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod bootstrap;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod registry;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::compare::{ComparisonManager, ComparisonReport};
pub use crate::engine::{ArticleAnalysis, BatchComparisonEngine};
pub use crate::error::{AnalysisError, ModelError};
pub use crate::registry::{ModelDescriptor, ModelFamily, ModelRegistry};
