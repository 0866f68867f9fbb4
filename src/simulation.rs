//! Deterministic synthetic verdicts.
//!
//! Writers have latent Elo strengths; each pair of writers on each prompt
//! gets one latent outcome drawn from the Bradley-Terry model, and every
//! judge reports it with probability `accuracy` (otherwise it votes at
//! random). Presentation order is shuffled per judge so the ledger's
//! normalization is exercised. Replaces LLM calls in tests and in the
//! CLI `simulate` command.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ledger::{Outcome, Stage, Verdict};
use crate::pools::{SampleIndex, SampleOwner};
use crate::rating_engine::{expected_score, ANCHOR_RATING};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedWriter {
    pub id: String,
    /// Latent strength in rating points.
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedJudge {
    pub id: String,
    /// Probability of reporting the latent outcome.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationCase {
    pub name: String,
    pub writers: Vec<SimulatedWriter>,
    pub judges: Vec<SimulatedJudge>,
    pub prompts: usize,
    /// Prompt categories, assigned round-robin. Empty means uncategorized.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Probability that a latent outcome is a draw.
    #[serde(default)]
    pub tie_rate: f64,
    pub seed: u64,
}

impl SimulationCase {
    /// Evenly spaced writers (best first, 100 points apart) and judges that
    /// are all accurate except the last, which is noisy when there are at
    /// least three.
    pub fn standard(writers: usize, judges: usize, prompts: usize, seed: u64) -> Self {
        let top = ANCHOR_RATING + 50.0 * writers.saturating_sub(1) as f64;
        let writers = (0..writers)
            .map(|i| SimulatedWriter {
                id: format!("writer-{i}"),
                strength: top - 100.0 * i as f64,
            })
            .collect();
        let judges = (0..judges)
            .map(|i| SimulatedJudge {
                id: format!("judge-{i}"),
                accuracy: if judges >= 3 && i == judges - 1 { 0.2 } else { 0.95 },
            })
            .collect();
        Self {
            name: format!("standard_{seed}"),
            writers,
            judges,
            prompts,
            categories: vec!["analysis".to_string(), "fiction".to_string()],
            tie_rate: 0.05,
            seed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub verdicts: Vec<Verdict>,
    pub index: SampleIndex,
    /// Writers from strongest to weakest.
    pub true_order: Vec<String>,
}

pub fn sample_id(prompt: usize, writer: &str) -> String {
    format!("p{prompt}/{writer}")
}

pub fn simulate(case: &SimulationCase) -> SimulationOutput {
    let mut rng = StdRng::seed_from_u64(case.seed);
    let mut index = SampleIndex::new();
    let mut verdicts = Vec::new();

    for prompt in 0..case.prompts {
        let category = if case.categories.is_empty() {
            None
        } else {
            Some(case.categories[prompt % case.categories.len()].clone())
        };
        for w in &case.writers {
            index.insert(
                sample_id(prompt, &w.id),
                SampleOwner {
                    writer: w.id.clone(),
                    feedback: None,
                    category: category.clone(),
                },
            );
        }

        let prompt_id = format!("p{prompt}");
        for (i, a) in case.writers.iter().enumerate() {
            for b in &case.writers[i + 1..] {
                let latent = latent_outcome(&mut rng, a.strength, b.strength, case.tie_rate);
                let sa = sample_id(prompt, &a.id);
                let sb = sample_id(prompt, &b.id);
                for judge in &case.judges {
                    let reported = if rng.gen_bool(probability(judge.accuracy)) {
                        latent
                    } else if rng.gen_bool(0.5) {
                        Outcome::Left
                    } else {
                        Outcome::Right
                    };
                    let verdict = if rng.gen_bool(0.5) {
                        Verdict::new(&judge.id, Stage::Initial, &prompt_id, &sa, &sb, reported)
                    } else {
                        Verdict::new(&judge.id, Stage::Initial, &prompt_id, &sb, &sa, reported.flipped())
                    };
                    verdicts.push(verdict);
                }
            }
        }
    }

    let mut ranked: Vec<&SimulatedWriter> = case.writers.iter().collect();
    ranked.sort_by(|x, y| y.strength.total_cmp(&x.strength));

    SimulationOutput {
        verdicts,
        index,
        true_order: ranked.into_iter().map(|w| w.id.clone()).collect(),
    }
}

fn latent_outcome(rng: &mut StdRng, a: f64, b: f64, tie_rate: f64) -> Outcome {
    if rng.gen_bool(probability(tie_rate)) {
        return Outcome::Tie;
    }
    if rng.gen_bool(probability(expected_score(a, b))) {
        Outcome::Left
    } else {
        Outcome::Right
    }
}

/// Clamp into [0, 1] for `gen_bool`; NaN counts as never.
fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}
