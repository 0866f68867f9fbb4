//! Convergence control: how many more comparisons does a rating need?
//!
//! A half-width derived from Fisher information shrinks roughly with
//! `1/sqrt(matches)`, so reaching a target half-width from the current one
//! needs `matches * (ci / target)^2` matches in total. A rating whose
//! interval no longer overlaps its ranked neighbors is settled regardless:
//! more precision cannot change its position.

use serde::Serialize;

use crate::config::ConvergenceConfig;
use crate::rating_engine::{sort_ratings, Rating};

/// Additional equally informative comparisons needed to bring `ci95` down
/// to `cfg.target_ci`. Zero once at or below target.
///
/// With no matches (or an unbounded half-width) there is nothing to
/// extrapolate from, so `cfg.unrated_estimate` is returned.
pub fn additional_comparisons(ci95: f64, match_count: u64, cfg: &ConvergenceConfig) -> u64 {
    if ci95 <= cfg.target_ci {
        return 0;
    }
    if match_count == 0 || !ci95.is_finite() {
        return cfg.unrated_estimate;
    }
    let ratio = ci95 / cfg.target_ci;
    let required = (match_count as f64 * ratio * ratio).ceil() as u64;
    required.saturating_sub(match_count).max(1)
}

/// True when `rating`'s interval is disjoint from every ranked neighbor.
/// A rating with no neighbors at all is not considered overlap-free.
pub fn overlap_free(rating: &Rating, above: Option<&Rating>, below: Option<&Rating>) -> bool {
    if above.is_none() && below.is_none() {
        return false;
    }
    above.map_or(true, |n| !rating.overlaps(n)) && below.map_or(true, |n| !rating.overlaps(n))
}

/// Comparisons still needed for `rating` given its ranked neighbors.
pub fn comparisons_needed(
    rating: &Rating,
    above: Option<&Rating>,
    below: Option<&Rating>,
    cfg: &ConvergenceConfig,
) -> u64 {
    if overlap_free(rating, above, below) {
        return 0;
    }
    additional_comparisons(rating.ci95, rating.match_count, cfg)
}

/// Per-entity convergence state in ranked order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceEntry {
    pub entity: String,
    pub rank: usize,
    pub rating: f64,
    pub ci95: f64,
    pub match_count: u64,
    pub needed: u64,
    pub overlap_free: bool,
    /// Interval intersects the next-higher entity's.
    pub overlaps_above: bool,
    /// Interval intersects the next-lower entity's.
    pub overlaps_below: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub entries: Vec<ConvergenceEntry>,
    pub total_needed: u64,
    /// Every entity needs zero further comparisons.
    pub settled: bool,
}

impl ConvergenceReport {
    pub fn needed_for(&self, entity: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|e| e.entity == entity)
            .map(|e| e.needed)
    }

    /// Adjacent ranked pairs whose intervals still overlap, top first.
    /// This is what a pair-selection strategy needs to decide what to judge next.
    pub fn unresolved_boundaries(&self) -> Vec<(&str, &str)> {
        self.entries
            .windows(2)
            .filter(|w| w[0].overlaps_below)
            .map(|w| (w[0].entity.as_str(), w[1].entity.as_str()))
            .collect()
    }
}

/// Convergence state for a whole rating pool.
pub fn convergence_report(ratings: &[Rating], cfg: &ConvergenceConfig) -> ConvergenceReport {
    let mut ranked = ratings.to_vec();
    sort_ratings(&mut ranked);

    let entries: Vec<ConvergenceEntry> = ranked
        .iter()
        .enumerate()
        .map(|(pos, r)| {
            let above = pos.checked_sub(1).map(|p| &ranked[p]);
            let below = ranked.get(pos + 1);
            ConvergenceEntry {
                entity: r.entity.clone(),
                rank: pos + 1,
                rating: r.rating,
                ci95: r.ci95,
                match_count: r.match_count,
                needed: comparisons_needed(r, above, below, cfg),
                overlap_free: overlap_free(r, above, below),
                overlaps_above: above.is_some_and(|n| r.overlaps(n)),
                overlaps_below: below.is_some_and(|n| r.overlaps(n)),
            }
        })
        .collect();

    let total_needed = entries.iter().map(|e| e.needed).fold(0, u64::saturating_add);
    ConvergenceReport {
        settled: entries.iter().all(|e| e.needed == 0),
        entries,
        total_needed,
    }
}
