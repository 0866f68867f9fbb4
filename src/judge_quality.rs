//! Judge reliability estimation and weighting.
//!
//! Pipeline (each stage is a separate function):
//! verdicts → [`group_instances`] → [`agreement_games`] → ratings → [`judge_weights`].
//!
//! Two interchangeable reliability signals feed the same weighting math:
//! - Consensus mode: judges "play" each other on every multi-judge
//!   instance; agreeing with consensus beats disagreeing.
//! - Proxy mode: an existing performance rating of each judge (e.g. its
//!   own writing rating) stands in for reliability.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::{JudgeQualityConfig, SolverConfig};
use crate::instances::{group_instances, EvaluationInstance};
use crate::ledger::{games_to_records, Game, PairwiseRecord, Verdict};
use crate::rating_engine::{solve_games, Rating};

/// Weight of a judge the estimator knows nothing about.
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMode {
    Consensus,
    Proxy,
}

/// Reliability ratings and weights for every known judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeQualityData {
    /// Reliability ratings; empty while bootstrapping.
    pub ratings: Vec<Rating>,
    /// Multiplicative weight per judge, in (0, 1].
    pub weights: BTreeMap<String, f64>,
    /// False during bootstrap, when every weight is exactly 1.0.
    pub active: bool,
    /// Multi-judge instances seen (0 in proxy mode).
    pub instance_count: usize,
    pub mode: EstimationMode,
}

impl JudgeQualityData {
    /// Bootstrap state: no ratings, every judge at full weight.
    pub fn bootstrap<I, S>(judges: I, instance_count: usize, mode: EstimationMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ratings: Vec::new(),
            weights: judges
                .into_iter()
                .map(|j| (j.into(), DEFAULT_WEIGHT))
                .collect(),
            active: false,
            instance_count,
            mode,
        }
    }

    pub fn rating_of(&self, judge: &str) -> Option<&Rating> {
        self.ratings.iter().find(|r| r.entity == judge)
    }
}

// ---------------------------------------------------------------------
//  Stages
// ---------------------------------------------------------------------

/// Judge-vs-judge games from instance agreement.
///
/// For every unordered pair of judges on an instance: the one agreeing with
/// consensus beats the one disagreeing; if both agree, or both disagree
/// (even with each other), the game is a draw.
pub fn agreement_games(instances: &[EvaluationInstance]) -> Vec<Game> {
    let mut games = Vec::new();
    for instance in instances {
        let votes: Vec<(&String, bool)> = instance
            .verdicts
            .iter()
            .map(|(judge, outcome)| (judge, *outcome == instance.consensus))
            .collect();
        for (pos, (white, white_agrees)) in votes.iter().enumerate() {
            for (black, black_agrees) in &votes[pos + 1..] {
                let result = match (white_agrees, black_agrees) {
                    (true, false) => 1.0,
                    (false, true) => 0.0,
                    _ => 0.5,
                };
                games.push(Game::new(*white, *black, result));
            }
        }
    }
    games
}

/// Agreement games folded into one record per judge pair, for rating the
/// judges as a pool of their own.
pub fn agreement_records(verdicts: &[Verdict]) -> Vec<PairwiseRecord> {
    games_to_records(&agreement_games(&group_instances(verdicts)))
}

/// Weights from reliability ratings.
///
/// `weight = max(floor, exp(k * (rating - best)))`, so the best judge gets
/// exactly 1.0. Judges in `judges` without a rated match keep 1.0.
pub fn judge_weights<S: AsRef<str>>(
    ratings: &[Rating],
    judges: &[S],
    cfg: &JudgeQualityConfig,
) -> BTreeMap<String, f64> {
    let rated: Vec<&Rating> = ratings.iter().filter(|r| r.match_count > 0).collect();
    let best = rated
        .iter()
        .map(|r| r.rating)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut weights: BTreeMap<String, f64> = judges
        .iter()
        .map(|j| (j.as_ref().to_string(), DEFAULT_WEIGHT))
        .collect();
    for r in rated {
        let w = (cfg.decay_rate * (r.rating - best)).exp().max(cfg.weight_floor);
        weights.insert(r.entity.clone(), w.min(DEFAULT_WEIGHT));
    }
    weights
}

// ---------------------------------------------------------------------
//  Estimators
// ---------------------------------------------------------------------

/// Consensus-mode estimate from raw verdicts.
///
/// `known_judges` are reported even if they never voted; judges found in
/// the verdicts are added automatically.
pub fn estimate_consensus<S: AsRef<str>>(
    verdicts: &[Verdict],
    known_judges: &[S],
    cfg: &JudgeQualityConfig,
    solver: &SolverConfig,
) -> JudgeQualityData {
    let mut judges: BTreeSet<String> = known_judges.iter().map(|j| j.as_ref().to_string()).collect();
    judges.extend(verdicts.iter().map(|v| v.judge.clone()));
    let judges: Vec<String> = judges.into_iter().collect();

    let instances = group_instances(verdicts);
    estimate_from_instances(&instances, &judges, cfg, solver)
}

/// Consensus-mode estimate from already grouped instances.
pub fn estimate_from_instances<S: AsRef<str>>(
    instances: &[EvaluationInstance],
    known_judges: &[S],
    cfg: &JudgeQualityConfig,
    solver: &SolverConfig,
) -> JudgeQualityData {
    let mut judges: BTreeSet<String> = known_judges.iter().map(|j| j.as_ref().to_string()).collect();
    for instance in instances {
        judges.extend(instance.verdicts.keys().cloned());
    }

    let instance_count = instances.len();
    if instance_count < cfg.min_instances {
        tracing::debug!(
            instance_count,
            min_instances = cfg.min_instances,
            "judge quality in bootstrap"
        );
        return JudgeQualityData::bootstrap(judges, instance_count, EstimationMode::Consensus);
    }

    let games = agreement_games(instances);
    let ratings = solve_games(&games, &[], solver);
    let judges: Vec<String> = judges.into_iter().collect();
    let weights = judge_weights(&ratings, &judges, cfg);

    JudgeQualityData {
        ratings,
        weights,
        active: true,
        instance_count,
        mode: EstimationMode::Consensus,
    }
}

/// Proxy-mode estimate: reuse each judge's rating along another dimension.
///
/// Needs at least two known judges present in `proxy_ratings`; otherwise
/// returns bootstrap output.
pub fn estimate_proxy<S: AsRef<str>>(
    proxy_ratings: &[Rating],
    known_judges: &[S],
    cfg: &JudgeQualityConfig,
) -> JudgeQualityData {
    let judges: BTreeSet<&str> = known_judges.iter().map(|j| j.as_ref()).collect();
    let ratings: Vec<Rating> = proxy_ratings
        .iter()
        .filter(|r| judges.contains(r.entity.as_str()))
        .cloned()
        .collect();

    if ratings.len() < 2 {
        tracing::debug!(present = ratings.len(), "proxy judge quality in bootstrap");
        return JudgeQualityData::bootstrap(judges, 0, EstimationMode::Proxy);
    }

    let judges: Vec<&str> = judges.into_iter().collect();
    let weights = judge_weights(&ratings, &judges, cfg);
    JudgeQualityData {
        ratings,
        weights,
        active: true,
        instance_count: 0,
        mode: EstimationMode::Proxy,
    }
}

// ---------------------------------------------------------------------
//  Queries
// ---------------------------------------------------------------------

/// Stored weight, or 1.0 for a judge the data has never seen.
pub fn get_judge_weight(data: &JudgeQualityData, judge: &str) -> f64 {
    data.weights.get(judge).copied().unwrap_or(DEFAULT_WEIGHT)
}

/// Whether `judge` should be dropped from future sampling.
///
/// Never prunes during bootstrap. Unknown judges default to weight 1.0 and
/// are therefore never pruned by this rule alone.
pub fn should_prune_judge(data: &JudgeQualityData, judge: &str, threshold: f64) -> bool {
    data.active && get_judge_weight(data, judge) < threshold
}

/// Known judges that [`should_prune_judge`] would drop, sorted.
pub fn pruned_judges(data: &JudgeQualityData, threshold: f64) -> Vec<String> {
    data.weights
        .keys()
        .filter(|j| should_prune_judge(data, j, threshold))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------
//  Bias annotations
// ---------------------------------------------------------------------

/// Bias estimate supplied by an external measurement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasEstimate {
    pub value: f64,
    pub sufficient_data: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeBias {
    /// Preference for the judge's own outputs.
    pub self_preference: BiasEstimate,
    /// Preference for the left (first shown) position.
    pub position: BiasEstimate,
}

/// Everything known about one judge, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeReport {
    pub judge: String,
    pub weight: f64,
    pub reliability: Option<f64>,
    pub reliability_ci95: Option<f64>,
    pub pruned: bool,
    pub bias: Option<JudgeBias>,
}

/// Join weights, reliability and externally measured bias per judge.
/// Bias values are passed through untouched.
pub fn judge_reports(
    data: &JudgeQualityData,
    biases: &BTreeMap<String, JudgeBias>,
    prune_threshold: f64,
) -> Vec<JudgeReport> {
    let mut judges: BTreeSet<&str> = data.weights.keys().map(String::as_str).collect();
    judges.extend(biases.keys().map(String::as_str));

    judges
        .into_iter()
        .map(|judge| {
            let rating = data.rating_of(judge);
            JudgeReport {
                judge: judge.to_string(),
                weight: get_judge_weight(data, judge),
                reliability: rating.map(|r| r.rating),
                reliability_ci95: rating.map(|r| r.ci95).filter(|c| c.is_finite()),
                pruned: should_prune_judge(data, judge, prune_threshold),
                bias: biases.get(judge).copied(),
            }
        })
        .collect()
}
