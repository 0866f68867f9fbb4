//! Error types.
//!
//! The rating core itself is total: solving, grouping and weighting never
//! fail. Errors only arise from configuration misuse and from the I/O
//! boundary used by the CLI.

use thiserror::Error;

/// Configuration misuse detected by a `validate()` call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Decay rate `k` must be finite and strictly positive.
    #[error("decay rate must be finite and > 0, got {0}")]
    DecayRate(f64),

    /// Weight floor must lie in (0, 1].
    #[error("weight floor must be in (0, 1], got {0}")]
    WeightFloor(f64),

    /// Prune threshold must lie in [0, 1]; anything above 1 prunes every judge.
    #[error("prune threshold must be in [0, 1], got {0}")]
    PruneThreshold(f64),

    /// Convergence half-width target must be finite and > 0.
    #[error("convergence target must be finite and > 0, got {0}")]
    ConvergenceTarget(f64),

    /// Solver needs at least one iteration.
    #[error("solver max_iterations must be > 0")]
    MaxIterations,

    /// Solver tolerance must be finite and > 0.
    #[error("solver tolerance must be finite and > 0, got {0}")]
    Tolerance(f64),

    /// Prior game mass must be finite and > 0 so every connected entity reaches the anchor.
    #[error("prior games must be finite and > 0, got {0}")]
    PriorGames(f64),

    /// Confidence level must lie strictly between 0 and 1.
    #[error("confidence level must be in (0, 1), got {0}")]
    ConfidenceLevel(f64),
}

/// Errors raised while loading verdicts, sample maps or config files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown pool: {0}")]
    UnknownPool(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LoadError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
