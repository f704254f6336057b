//! Error taxonomy.
//!
//! Two layers:
//! - [`AnalysisError`]: configuration-time failures. These abort construction.
//! - [`ModelError`]: a single model invocation failed. Analyzers and the batch
//!   engine turn these into [`crate::analyze::Outcome::Failure`] values, so they
//!   never escape past those boundaries.

use thiserror::Error;

use crate::registry::ModelFamily;

/// Fatal errors raised while building analyzers / engines.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Configuration references an alias the registry does not know.
    #[error("unknown {family} model alias: {alias}")]
    UnknownModel { alias: String, family: ModelFamily },

    /// Registry table declares the same alias twice within one family.
    #[error("duplicate {family} model alias: {alias}")]
    DuplicateAlias { alias: String, family: ModelFamily },

    /// A collaborator needs a secret that is not present in the environment.
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// Building the backend handle for a model failed.
    #[error("failed to load model {alias}: {message}")]
    ModelLoad { alias: String, message: String },
}

/// Failure of one model invocation (single item or whole batch).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Http(String),

    #[error("inference endpoint returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("could not decode model response: {0}")]
    Decode(String),

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("model returned {got} results for {expected} inputs")]
    LengthMismatch { expected: usize, got: usize },

    #[error("daily inference limit of {0} calls reached")]
    RateLimited(u32),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ModelError::Decode(e.to_string())
        } else {
            ModelError::Http(e.to_string())
        }
    }
}
