//! Rating solver: Bradley-Terry strengths with confidence half-widths.
//!
//! - Input is always aggregated per-pair tallies; games and records are
//!   folded into tallies first, so there is a single solve path.
//! - Strengths maximize the Bradley-Terry likelihood on the Elo scale:
//!   `P(i beats j) = 1 / (1 + 10^(-(R_i - R_j)/400))`. A tie is half a win
//!   for each side. The fit takes damped Newton steps on log-strength and
//!   falls back to an MM (minorization/maximization) sweep when a step
//!   cannot improve the likelihood.
//! - The scale is pinned by a virtual anchor at 1500. Every entity that
//!   played at least one game also plays `prior_games` virtual draws against
//!   the anchor, which keeps undefeated and winless entities finite.
//! - Entities with no games never enter the optimizer: 1500, infinite ci95.
//! - Output depends only on per-pair totals. Entities and tallies are
//!   iterated in sorted order, so permuting the input yields bit-identical
//!   ratings.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::f64::consts::{LN_10, SQRT_2};

use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::function::erf::erf_inv;

use crate::config::SolverConfig;
use crate::ledger::{games_to_records, tallies_from_records, Game, PairTally, PairwiseRecord};

/// Rating of an entity with no comparisons, and of the virtual anchor.
pub const ANCHOR_RATING: f64 = 1500.0;

/// Rating points per factor of ten in odds.
const ELO_SCALE: f64 = 400.0;

/// Rating points per unit of natural log-strength.
const RATING_PER_NAT: f64 = ELO_SCALE / LN_10;

/// Halvings tried on a Newton step before falling back to an MM sweep.
const MAX_STEP_HALVINGS: usize = 40;

// ---------------------------------------------------------------------
//  Data model
// ---------------------------------------------------------------------

/// Fitted rating of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub entity: String,
    pub rating: f64,
    /// 95% confidence half-width in rating points; infinite when unconstrained.
    #[serde(with = "half_width")]
    pub ci95: f64,
    pub wins: u64,
    pub losses: u64,
    pub ties: u64,
    pub match_count: u64,
}

impl Rating {
    /// Rating of an entity that has not been compared with anyone.
    pub fn unrated(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            rating: ANCHOR_RATING,
            ci95: f64::INFINITY,
            wins: 0,
            losses: 0,
            ties: 0,
            match_count: 0,
        }
    }

    pub fn lower(&self) -> f64 {
        self.rating - self.ci95
    }

    pub fn upper(&self) -> f64 {
        self.rating + self.ci95
    }

    /// Whether the two 95% intervals intersect.
    pub fn overlaps(&self, other: &Rating) -> bool {
        self.lower() <= other.upper() && other.lower() <= self.upper()
    }
}

/// Infinite half-widths are written as `null` and read back as infinity.
mod half_width {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else {
            s.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(d)?.unwrap_or(f64::INFINITY))
    }
}

/// Ratings plus solver diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SolveSummary {
    /// Sorted by rating descending, then entity.
    pub ratings: Vec<Rating>,
    pub iterations: usize,
    pub converged: bool,
    /// Largest rating change in the final iteration.
    pub max_delta: f64,
    /// Entities that entered the optimizer.
    pub connected: usize,
}

// ---------------------------------------------------------------------
//  Scale helpers
// ---------------------------------------------------------------------

/// Expected score of `a` against `b` on the Elo logistic scale.
///
/// Exactly 0.5 for equal ratings, and `expected_score(a, b) +
/// expected_score(b, a)` is exactly 1. NaN propagates.
pub fn expected_score(a: f64, b: f64) -> f64 {
    if a >= b {
        1.0 / (1.0 + 10f64.powf((b - a) / ELO_SCALE))
    } else {
        1.0 - 1.0 / (1.0 + 10f64.powf((a - b) / ELO_SCALE))
    }
}

/// `1 / (1 + e^-x)` without overflow for large `|x|`.
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `ln(e^a + e^b)`.
fn log_sum_exp(a: f64, b: f64) -> f64 {
    a.max(b) + (-(a - b).abs()).exp().ln_1p()
}

fn gamma_to_rating(gamma: f64) -> f64 {
    ANCHOR_RATING + ELO_SCALE * gamma.log10()
}

/// Two-sided normal quantile for the configured confidence level.
pub fn z_score(confidence_level: f64) -> f64 {
    SQRT_2 * erf_inv(confidence_level)
}

/// Sort for display: rating descending, entity label ascending on ties.
pub fn sort_ratings(ratings: &mut [Rating]) {
    ratings.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then_with(|| a.entity.cmp(&b.entity))
    });
}

// ---------------------------------------------------------------------
//  Entry points
// ---------------------------------------------------------------------

/// Fit ratings from atomic games. Games are aggregated before solving.
pub fn solve_games(games: &[Game], roster: &[String], cfg: &SolverConfig) -> Vec<Rating> {
    solve_records(&games_to_records(games), roster, cfg)
}

/// Fit ratings from pairwise records of either orientation.
pub fn solve_records(records: &[PairwiseRecord], roster: &[String], cfg: &SolverConfig) -> Vec<Rating> {
    solve_tallies(&tallies_from_records(records), roster, cfg)
}

/// Fit ratings from canonical tallies.
pub fn solve_tallies(tallies: &[PairTally], roster: &[String], cfg: &SolverConfig) -> Vec<Rating> {
    solve(tallies, roster, cfg).ratings
}

/// Fit ratings and report solver diagnostics.
///
/// Every entity in `roster` or referenced by a tally gets a rating.
/// Never fails: hitting the iteration cap returns the last iterate.
pub fn solve(tallies: &[PairTally], roster: &[String], cfg: &SolverConfig) -> SolveSummary {
    let graph = ComparisonGraph::build(tallies, roster);
    let fit = graph.fit(cfg);

    if !fit.converged {
        tracing::warn!(
            iterations = fit.iterations,
            max_delta = fit.max_delta,
            "rating solver hit iteration cap; returning best estimate"
        );
    }
    tracing::debug!(
        entities = graph.entities.len(),
        connected = graph.connected_count(),
        pairs = graph.edge_count,
        iterations = fit.iterations,
        converged = fit.converged,
        "rating solve finished"
    );

    let z = z_score(cfg.confidence_level);
    let mut ratings: Vec<Rating> = graph
        .entities
        .iter()
        .enumerate()
        .map(|(i, entity)| {
            let node = &graph.nodes[i];
            if !node.is_connected() {
                let mut r = Rating::unrated(entity.clone());
                r.wins = node.wins;
                r.losses = node.losses;
                r.ties = node.ties;
                r.match_count = node.wins + node.losses + node.ties;
                return r;
            }
            let info = graph.information(i, &fit.gamma, cfg.prior_games);
            let ci95 = if info > 0.0 {
                z * (ELO_SCALE / LN_10) / info.sqrt()
            } else {
                f64::INFINITY
            };
            Rating {
                entity: entity.clone(),
                rating: gamma_to_rating(fit.gamma[i]),
                ci95,
                wins: node.wins,
                losses: node.losses,
                ties: node.ties,
                match_count: node.wins + node.losses + node.ties,
            }
        })
        .collect();
    sort_ratings(&mut ratings);

    SolveSummary {
        ratings,
        iterations: fit.iterations,
        converged: fit.converged,
        max_delta: fit.max_delta,
        connected: graph.connected_count(),
    }
}

// ---------------------------------------------------------------------
//  Comparison graph and fit
// ---------------------------------------------------------------------

#[derive(Debug, Default)]
struct Node {
    wins: u64,
    losses: u64,
    ties: u64,
    /// Likelihood mass of wins plus half of ties.
    score_mass: f64,
    /// (opponent, total game mass), in sorted opponent order.
    opponents: Vec<(usize, f64)>,
}

impl Node {
    fn game_mass(&self) -> f64 {
        self.opponents.iter().map(|(_, n)| n).sum()
    }

    fn is_connected(&self) -> bool {
        self.game_mass() > 0.0
    }
}

struct ComparisonGraph {
    entities: Vec<String>,
    nodes: Vec<Node>,
    edge_count: usize,
}

struct Fit {
    gamma: Vec<f64>,
    iterations: usize,
    converged: bool,
    max_delta: f64,
}

impl ComparisonGraph {
    fn build(tallies: &[PairTally], roster: &[String]) -> Self {
        // Re-key by pair so duplicate or unsorted tallies collapse deterministically.
        let mut pairs: BTreeMap<(&str, &str), [f64; 3]> = BTreeMap::new();
        let mut counts: BTreeMap<(&str, &str), [u64; 3]> = BTreeMap::new();
        for t in tallies {
            if t.a == t.b {
                continue;
            }
            let (key, wa, wb, mwa, mwb) = if t.a <= t.b {
                ((t.a.as_str(), t.b.as_str()), t.wins_a, t.wins_b, t.mass_wins_a, t.mass_wins_b)
            } else {
                ((t.b.as_str(), t.a.as_str()), t.wins_b, t.wins_a, t.mass_wins_b, t.mass_wins_a)
            };
            let m = pairs.entry(key).or_insert([0.0; 3]);
            m[0] += mwa;
            m[1] += mwb;
            m[2] += t.mass_ties;
            let c = counts.entry(key).or_insert([0; 3]);
            c[0] += wa;
            c[1] += wb;
            c[2] += t.ties;
        }

        let names: BTreeSet<&str> = roster
            .iter()
            .map(String::as_str)
            .chain(pairs.keys().flat_map(|(a, b)| [*a, *b]))
            .collect();
        let entities: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        let index: HashMap<&str, usize> = names.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let mut nodes: Vec<Node> = (0..entities.len()).map(|_| Node::default()).collect();

        let mut edge_count = 0;
        for ((a, b), [mwa, mwb, mties]) in &pairs {
            let (i, j) = (index[a], index[b]);
            let [wa, wb, ties] = counts[&(*a, *b)];
            nodes[i].wins += wa;
            nodes[i].losses += wb;
            nodes[i].ties += ties;
            nodes[j].wins += wb;
            nodes[j].losses += wa;
            nodes[j].ties += ties;

            let mass = mwa + mwb + mties;
            if mass <= 0.0 {
                continue;
            }
            edge_count += 1;
            nodes[i].score_mass += mwa + 0.5 * mties;
            nodes[j].score_mass += mwb + 0.5 * mties;
            nodes[i].opponents.push((j, mass));
            nodes[j].opponents.push((i, mass));
        }
        for node in &mut nodes {
            node.opponents.sort_by_key(|(j, _)| *j);
        }

        Self {
            entities,
            nodes,
            edge_count,
        }
    }

    fn connected_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_connected()).count()
    }

    /// Damped Newton ascent on natural log-strengths.
    ///
    /// The anchor games make the negative Hessian positive definite, so each
    /// step is one Cholesky solve over the connected entities. A step is
    /// halved until the log-likelihood does not decrease; if no fraction of
    /// it helps, one MM sweep is taken instead, which never decreases it.
    fn fit(&self, cfg: &SolverConfig) -> Fit {
        let n = self.nodes.len();
        let prior = cfg.prior_games;
        let mut theta = vec![0.0; n];
        let mut iterations = 0;
        let mut converged = false;
        let mut max_delta = 0.0;

        let active: Vec<usize> = (0..n).filter(|&i| self.nodes[i].is_connected()).collect();
        if active.is_empty() {
            return Fit {
                gamma: vec![1.0; n],
                iterations,
                converged: true,
                max_delta,
            };
        }
        let mut slot = vec![usize::MAX; n];
        for (k, &i) in active.iter().enumerate() {
            slot[i] = k;
        }

        let mut objective = self.log_likelihood(&theta, prior);
        for _ in 0..cfg.max_iterations {
            iterations += 1;
            let (grad, hess) = self.newton_system(&active, &slot, &theta, prior);
            let diag: Vec<f64> = (0..active.len()).map(|k| hess[(k, k)]).collect();
            let step = match Cholesky::new(hess) {
                Some(chol) => chol.solve(&grad),
                None => DVector::from_fn(active.len(), |k, _| {
                    grad[k] / diag[k].max(f64::MIN_POSITIVE)
                }),
            };

            let mut accepted = None;
            let mut scale = 1.0;
            for _ in 0..MAX_STEP_HALVINGS {
                let mut candidate = theta.clone();
                for (k, &i) in active.iter().enumerate() {
                    candidate[i] += scale * step[k];
                }
                let value = self.log_likelihood(&candidate, prior);
                if value >= objective {
                    accepted = Some((candidate, value));
                    break;
                }
                scale *= 0.5;
            }
            let (next, value) = match accepted {
                Some(found) => found,
                None => {
                    let candidate = self.mm_sweep(&theta, prior);
                    let value = self.log_likelihood(&candidate, prior);
                    (candidate, value)
                }
            };

            max_delta = active
                .iter()
                .map(|&i| RATING_PER_NAT * (next[i] - theta[i]).abs())
                .fold(0.0, f64::max);
            theta = next;
            objective = value;
            if max_delta < cfg.tolerance {
                converged = true;
                break;
            }
        }

        Fit {
            gamma: theta.iter().map(|t| t.exp()).collect(),
            iterations,
            converged,
            max_delta,
        }
    }

    /// Gradient and negative Hessian of the log-likelihood over the
    /// connected entities, indexed by `slot`.
    fn newton_system(
        &self,
        active: &[usize],
        slot: &[usize],
        theta: &[f64],
        prior: f64,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let dim = active.len();
        let mut grad = DVector::<f64>::zeros(dim);
        let mut hess = DMatrix::<f64>::zeros(dim, dim);
        for (k, &i) in active.iter().enumerate() {
            let node = &self.nodes[i];
            let p0 = logistic(theta[i]);
            grad[k] = node.score_mass + 0.5 * prior - prior * p0;
            hess[(k, k)] = prior * p0 * (1.0 - p0);
            for &(j, mass) in &node.opponents {
                let p = logistic(theta[i] - theta[j]);
                let w = mass * p * (1.0 - p);
                grad[k] -= mass * p;
                hess[(k, k)] += w;
                hess[(k, slot[j])] -= w;
            }
        }
        (grad, hess)
    }

    /// One simultaneous MM update of every connected strength.
    fn mm_sweep(&self, theta: &[f64], prior: f64) -> Vec<f64> {
        let mut next = theta.to_vec();
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_connected() {
                continue;
            }
            let g = theta[i].exp();
            let mut denom = prior / (g + 1.0);
            for &(j, mass) in &node.opponents {
                denom += mass / (g + theta[j].exp());
            }
            next[i] = ((node.score_mass + 0.5 * prior) / denom).ln();
        }
        next
    }

    /// Log-likelihood (up to a constant) including the anchor games.
    fn log_likelihood(&self, theta: &[f64], prior: f64) -> f64 {
        let mut total = 0.0;
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.is_connected() {
                continue;
            }
            let t = theta[i];
            total += (node.score_mass + 0.5 * prior) * t - prior * log_sum_exp(t, 0.0);
            for &(j, mass) in &node.opponents {
                if j > i {
                    total -= mass * log_sum_exp(t, theta[j]);
                }
            }
        }
        total
    }

    /// Fisher information of entity `i`'s own log-strength at `gamma`,
    /// including the virtual anchor games.
    fn information(&self, i: usize, gamma: &[f64], prior: f64) -> f64 {
        let g = gamma[i];
        let p0 = g / (g + 1.0);
        let mut info = prior * p0 * (1.0 - p0);
        for &(j, mass) in &self.nodes[i].opponents {
            let p = g / (g + gamma[j]);
            info += mass * p * (1.0 - p);
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(a: &str, b: &str, wins_a: u64, wins_b: u64, ties: u64) -> PairwiseRecord {
        PairwiseRecord {
            model_a: a.into(),
            model_b: b.into(),
            wins_a,
            wins_b,
            ties,
        }
    }

    #[test]
    fn gamma_one_is_anchor() {
        assert_eq!(gamma_to_rating(1.0), ANCHOR_RATING);
        assert!((gamma_to_rating(10.0) - 1900.0).abs() < 1e-9);
    }

    #[test]
    fn z_score_matches_normal_quantile() {
        assert!((z_score(0.95) - 1.959_963_984_540_054).abs() < 1e-9);
    }

    #[test]
    fn balanced_pair_stays_at_anchor() {
        let out = solve_records(&[record("a", "b", 2, 2, 1)], &[], &SolverConfig::default());
        for r in &out {
            assert!((r.rating - ANCHOR_RATING).abs() < 1e-6, "{r:?}");
            assert!(r.ci95.is_finite());
        }
    }

    #[test]
    fn fitted_point_satisfies_score_equation() {
        let cfg = SolverConfig::default();
        let records = [record("a", "b", 5, 2, 1), record("b", "c", 3, 3, 0), record("a", "c", 4, 1, 2)];
        let out = solve_records(&records, &[], &cfg);
        let by: HashMap<&str, &Rating> = out.iter().map(|r| (r.entity.as_str(), r)).collect();

        // Observed score (plus half the anchor draws) equals expected score at the optimum.
        let a = by["a"];
        let expected = 8.0 * expected_score(a.rating, by["b"].rating)
            + 7.0 * expected_score(a.rating, by["c"].rating)
            + cfg.prior_games * expected_score(a.rating, ANCHOR_RATING);
        let observed = 5.0 + 0.5 + 4.0 + 1.0 + 0.5 * cfg.prior_games;
        assert!((expected - observed).abs() < 1e-4, "{expected} vs {observed}");
    }

    #[test]
    fn iteration_cap_is_soft() {
        let cfg = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let tallies = tallies_from_records(&[record("a", "b", 9, 0, 0)]);
        let summary = solve(&tallies, &[], &cfg);
        assert!(!summary.converged);
        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.ratings.len(), 2);
        assert!(summary.ratings.iter().all(|r| r.rating.is_finite()));
    }
}
