//! Input digests for memoizing solves.
//!
//! The solver's output is a pure function of the per-pair totals and the
//! solver config, so a hash of the canonical tallies is a safe cache key.

use crate::config::SolverConfig;
use crate::ledger::{tallies_from_records, PairTally, PairwiseRecord};

/// Digest of records (either orientation, any order, duplicates allowed).
pub fn records_digest(records: &[PairwiseRecord], cfg: &SolverConfig) -> String {
    tallies_digest(&tallies_from_records(records), cfg)
}

/// Digest of canonical tallies plus the solver config.
pub fn tallies_digest(tallies: &[PairTally], cfg: &SolverConfig) -> String {
    let mut sorted: Vec<&PairTally> = tallies.iter().collect();
    sorted.sort_by(|x, y| (&x.a, &x.b).cmp(&(&y.a, &y.b)));

    let mut hasher = blake3::Hasher::new();
    hasher.update(&(cfg.max_iterations as u64).to_le_bytes());
    hasher.update(&cfg.tolerance.to_bits().to_le_bytes());
    hasher.update(&cfg.prior_games.to_bits().to_le_bytes());
    hasher.update(&cfg.confidence_level.to_bits().to_le_bytes());
    for t in sorted {
        update_str(&mut hasher, &t.a);
        update_str(&mut hasher, &t.b);
        for count in [t.wins_a, t.wins_b, t.ties] {
            hasher.update(&count.to_le_bytes());
        }
        for mass in [t.mass_wins_a, t.mass_wins_b, t.mass_ties] {
            hasher.update(&mass.to_bits().to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn update_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
