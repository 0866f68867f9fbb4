//! Configuration value objects.
//!
//! Every knob is passed explicitly at the call site so two computations with
//! different thresholds can run side by side in one process (for example an
//! interactive view recomputing weights while the user drags a decay slider).

use std::f64::consts::LN_2;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LoadError};

// ---------------------------------------------------------------------
//  Solver
// ---------------------------------------------------------------------

/// Configuration for the Bradley-Terry solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Hard cap on solver iterations. Hitting it is a soft failure: the last
    /// iterate is returned and a warning is logged.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Stop once the largest per-entity rating change (in rating points)
    /// falls below this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Virtual drawn games each connected entity plays against the 1500
    /// anchor. Keeps undefeated and winless entities finite.
    #[serde(default = "default_prior_games")]
    pub prior_games: f64,
    /// Two-sided confidence level for the reported half-width.
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_max_iterations() -> usize {
    10_000
}

fn default_tolerance() -> f64 {
    1e-7
}

fn default_prior_games() -> f64 {
    1.0
}

fn default_confidence_level() -> f64 {
    0.95
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            prior_games: default_prior_games(),
            confidence_level: default_confidence_level(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::MaxIterations);
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(ConfigError::Tolerance(self.tolerance));
        }
        if !self.prior_games.is_finite() || self.prior_games <= 0.0 {
            return Err(ConfigError::PriorGames(self.prior_games));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ConfigError::ConfidenceLevel(self.confidence_level));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
//  Judge quality
// ---------------------------------------------------------------------

/// Configuration for judge reliability estimation and weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeQualityConfig {
    /// Multi-judge instances required before consensus mode activates.
    #[serde(default = "default_min_instances")]
    pub min_instances: usize,
    /// No judge weight ever drops below this.
    #[serde(default = "default_weight_floor")]
    pub weight_floor: f64,
    /// Exponential decay per rating point below the best judge.
    /// Half-life in rating points is `ln(2) / decay_rate`.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    /// Judges whose weight is strictly below this are pruned from sampling.
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,
}

fn default_min_instances() -> usize {
    5
}

fn default_weight_floor() -> f64 {
    0.1
}

fn default_decay_rate() -> f64 {
    LN_2 / 100.0
}

fn default_prune_threshold() -> f64 {
    0.25
}

impl Default for JudgeQualityConfig {
    fn default() -> Self {
        Self {
            min_instances: default_min_instances(),
            weight_floor: default_weight_floor(),
            decay_rate: default_decay_rate(),
            prune_threshold: default_prune_threshold(),
        }
    }
}

impl JudgeQualityConfig {
    /// Build a config with a caller-chosen decay rate, validating it.
    pub fn new(decay_rate: f64) -> Result<Self, ConfigError> {
        let cfg = Self {
            decay_rate,
            ..Self::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Decay rate that halves a judge's weight every `points` rating points.
    pub fn with_half_life(mut self, points: f64) -> Self {
        self.decay_rate = LN_2 / points;
        self
    }

    /// Rating-point distance at which a judge's weight halves.
    pub fn half_life(&self) -> f64 {
        LN_2 / self.decay_rate
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.decay_rate.is_finite() || self.decay_rate <= 0.0 {
            return Err(ConfigError::DecayRate(self.decay_rate));
        }
        if !(self.weight_floor > 0.0 && self.weight_floor <= 1.0) {
            return Err(ConfigError::WeightFloor(self.weight_floor));
        }
        if !(0.0..=1.0).contains(&self.prune_threshold) {
            return Err(ConfigError::PruneThreshold(self.prune_threshold));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
//  Convergence
// ---------------------------------------------------------------------

/// Configuration for the convergence controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Target 95% half-width in rating points.
    #[serde(default = "default_target_ci")]
    pub target_ci: f64,
    /// Comparisons requested for an entity with no matches yet, where the
    /// inverse-square-root extrapolation has nothing to scale from.
    #[serde(default = "default_unrated_estimate")]
    pub unrated_estimate: u64,
}

fn default_target_ci() -> f64 {
    50.0
}

fn default_unrated_estimate() -> u64 {
    10
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            target_ci: default_target_ci(),
            unrated_estimate: default_unrated_estimate(),
        }
    }
}

impl ConvergenceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_ci.is_finite() || self.target_ci <= 0.0 {
            return Err(ConfigError::ConvergenceTarget(self.target_ci));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
//  Aggregate
// ---------------------------------------------------------------------

/// All configuration in one file, as loaded by the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub judges: JudgeQualityConfig,
    #[serde(default)]
    pub convergence: ConvergenceConfig,
}

impl LadderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.judges.validate()?;
        self.convergence.validate()
    }

    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }
}
