//! Record ledger: raw verdicts in, canonical pairwise aggregates out.
//!
//! A verdict names two *samples*; the ledger resolves each sample to the
//! entity that produced it (a writer model, a feedback model, ...) and folds
//! verdicts into per-pair win/loss/tie counts. Everything here is keyed on
//! canonically ordered pairs so the result never depends on which side a
//! judge happened to see first or on the order verdicts arrived in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Verdicts
// =============================================================================

/// A judge's preference on one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Left,
    Right,
    Tie,
}

impl Outcome {
    /// Same preference seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Tie => Self::Tie,
        }
    }

    /// Score credited to the left side.
    pub fn left_score(self) -> f64 {
        match self {
            Self::Left => 1.0,
            Self::Right => 0.0,
            Self::Tie => 0.5,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
            Self::Tie => 2,
        }
    }
}

/// Pipeline stage a comparison belongs to. Part of the instance context so
/// the same two samples compared in different stages stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initial,
    Revised,
    Improvement,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Revised => "revised",
            Self::Improvement => "improvement",
        }
    }
}

/// One judge's opinion on one comparison of two samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub judge: String,
    pub stage: Stage,
    pub prompt_id: String,
    pub sample_left: String,
    pub sample_right: String,
    pub outcome: Outcome,
}

impl Verdict {
    pub fn new(
        judge: impl Into<String>,
        stage: Stage,
        prompt_id: impl Into<String>,
        sample_left: impl Into<String>,
        sample_right: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            judge: judge.into(),
            stage,
            prompt_id: prompt_id.into(),
            sample_left: sample_left.into(),
            sample_right: sample_right.into(),
            outcome,
        }
    }

    /// Disambiguates identical sample pairs judged under different stages or prompts.
    pub fn context_key(&self) -> String {
        format!("{}:{}", self.stage.as_str(), self.prompt_id)
    }

    /// Whether the stored sample order is already canonical.
    pub fn is_canonical(&self) -> bool {
        self.sample_left <= self.sample_right
    }

    /// Sample pair in lexicographic order.
    pub fn canonical_pair(&self) -> (&str, &str) {
        if self.is_canonical() {
            (&self.sample_left, &self.sample_right)
        } else {
            (&self.sample_right, &self.sample_left)
        }
    }

    /// Copy with samples in canonical order and the outcome flipped to match.
    pub fn normalized(&self) -> Self {
        if self.is_canonical() {
            return self.clone();
        }
        Self {
            judge: self.judge.clone(),
            stage: self.stage,
            prompt_id: self.prompt_id.clone(),
            sample_left: self.sample_right.clone(),
            sample_right: self.sample_left.clone(),
            outcome: self.outcome.flipped(),
        }
    }
}

/// Outcome relative to the canonical (lexicographically sorted) sample pair.
pub fn normalize_outcome(verdict: &Verdict) -> Outcome {
    if verdict.is_canonical() {
        verdict.outcome
    } else {
        verdict.outcome.flipped()
    }
}

// =============================================================================
// Games and records
// =============================================================================

/// Atomic solver event. `result` is the score awarded to `white`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub white: String,
    pub black: String,
    pub result: f64,
}

impl Game {
    pub fn new(white: impl Into<String>, black: impl Into<String>, result: f64) -> Self {
        Self {
            white: white.into(),
            black: black.into(),
            result,
        }
    }

    pub fn from_outcome(white: impl Into<String>, black: impl Into<String>, outcome: Outcome) -> Self {
        Self::new(white, black, outcome.left_score())
    }

    /// Outcome from white's point of view.
    pub fn outcome(&self) -> Outcome {
        if self.result > 0.5 {
            Outcome::Left
        } else if self.result < 0.5 {
            Outcome::Right
        } else {
            Outcome::Tie
        }
    }
}

/// Aggregated outcomes for one unordered pair of entities.
///
/// Records built by this module are canonical (`model_a < model_b`), but
/// records loaded from a cumulative store may carry either orientation;
/// [`merge_records`] handles both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseRecord {
    pub model_a: String,
    pub model_b: String,
    pub wins_a: u64,
    pub wins_b: u64,
    pub ties: u64,
}

impl PairwiseRecord {
    /// Empty record with the pair stored canonically.
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        let (model_a, model_b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            model_a,
            model_b,
            wins_a: 0,
            wins_b: 0,
            ties: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.wins_a + self.wins_b + self.ties
    }

    /// Unordered key shared by both orientations of the pair.
    pub fn pair_key(&self) -> (&str, &str) {
        if self.model_a <= self.model_b {
            (&self.model_a, &self.model_b)
        } else {
            (&self.model_b, &self.model_a)
        }
    }

    /// Same counts with sides swapped.
    pub fn reversed(&self) -> Self {
        Self {
            model_a: self.model_b.clone(),
            model_b: self.model_a.clone(),
            wins_a: self.wins_b,
            wins_b: self.wins_a,
            ties: self.ties,
        }
    }

    /// Copy stored with `model_a < model_b`.
    pub fn canonical(&self) -> Self {
        if self.model_a <= self.model_b {
            self.clone()
        } else {
            self.reversed()
        }
    }

    /// Record one outcome where `left` is the side that outcome refers to.
    /// Panics in debug builds if `left` is not part of this pair.
    pub fn record(&mut self, left: &str, outcome: Outcome) {
        let outcome = if left == self.model_a {
            outcome
        } else {
            debug_assert_eq!(left, self.model_b);
            outcome.flipped()
        };
        match outcome {
            Outcome::Left => self.wins_a += 1,
            Outcome::Right => self.wins_b += 1,
            Outcome::Tie => self.ties += 1,
        }
    }

    /// Add `other`'s counts, swapping them first if its orientation differs.
    fn absorb(&mut self, other: &PairwiseRecord) {
        let aligned = if other.model_a == self.model_a {
            other.clone()
        } else {
            other.reversed()
        };
        self.wins_a += aligned.wins_a;
        self.wins_b += aligned.wins_b;
        self.ties += aligned.ties;
    }

    /// Expand into one atomic game per recorded outcome.
    pub fn games(&self) -> impl Iterator<Item = Game> + '_ {
        let wins_a = (0..self.wins_a).map(move |_| Game::new(&self.model_a, &self.model_b, 1.0));
        let wins_b = (0..self.wins_b).map(move |_| Game::new(&self.model_a, &self.model_b, 0.0));
        let ties = (0..self.ties).map(move |_| Game::new(&self.model_a, &self.model_b, 0.5));
        wins_a.chain(wins_b).chain(ties)
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Resolve both samples of a verdict; `None` for self-comparisons and for
/// samples outside the current pool.
fn resolve_pair<F>(verdict: &Verdict, entity_of: &F) -> Option<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    let left = entity_of(&verdict.sample_left)?;
    let right = entity_of(&verdict.sample_right)?;
    if left == right {
        return None;
    }
    Some((left, right))
}

/// One game per verdict between the entities owning the two samples.
///
/// Self-comparisons (both samples from the same entity) are dropped: they
/// carry no information and would otherwise count as a phantom draw.
pub fn to_games<F>(verdicts: &[Verdict], entity_of: F) -> Vec<Game>
where
    F: Fn(&str) -> Option<String>,
{
    verdicts
        .iter()
        .filter_map(|v| {
            let (left, right) = resolve_pair(v, &entity_of)?;
            Some(Game::from_outcome(left, right, v.outcome))
        })
        .collect()
}

/// Fold games into canonical records, one per unordered pair, sorted by pair.
pub fn games_to_records(games: &[Game]) -> Vec<PairwiseRecord> {
    let mut by_pair: BTreeMap<(String, String), PairwiseRecord> = BTreeMap::new();
    for game in games {
        if game.white == game.black {
            continue;
        }
        let record = PairwiseRecord::new(&game.white, &game.black);
        let key = (record.model_a.clone(), record.model_b.clone());
        by_pair
            .entry(key)
            .or_insert(record)
            .record(&game.white, game.outcome());
    }
    by_pair.into_values().collect()
}

/// Same filtering as [`to_games`], aggregated into one record per entity pair.
pub fn extract_pairwise_records<F>(verdicts: &[Verdict], entity_of: F) -> Vec<PairwiseRecord>
where
    F: Fn(&str) -> Option<String>,
{
    let mut by_pair: BTreeMap<(String, String), PairwiseRecord> = BTreeMap::new();
    for verdict in verdicts {
        let Some((left, right)) = resolve_pair(verdict, &entity_of) else {
            continue;
        };
        let record = PairwiseRecord::new(&left, &right);
        let key = (record.model_a.clone(), record.model_b.clone());
        by_pair
            .entry(key)
            .or_insert(record)
            .record(&left, verdict.outcome);
    }
    by_pair.into_values().collect()
}

/// Merge incoming records into an existing set.
///
/// Each unordered pair appears exactly once in the output. The stored
/// orientation of the first record seen for a pair wins; later records with
/// flipped labels are swapped before their counts are added. Self-pairs are
/// discarded. Output is sorted by unordered pair.
pub fn merge_records(existing: &[PairwiseRecord], incoming: &[PairwiseRecord]) -> Vec<PairwiseRecord> {
    let mut merged: BTreeMap<(String, String), PairwiseRecord> = BTreeMap::new();
    for record in existing.iter().chain(incoming) {
        if record.model_a == record.model_b {
            continue;
        }
        let (a, b) = record.pair_key();
        let key = (a.to_string(), b.to_string());
        match merged.get_mut(&key) {
            Some(stored) => stored.absorb(record),
            None => {
                merged.insert(key, record.clone());
            }
        }
    }
    merged.into_values().collect()
}

// =============================================================================
// Solver input
// =============================================================================

/// Canonical per-pair input to the rating solver.
///
/// Raw counts are integer verdict counts; the `mass_*` fields are what the
/// likelihood actually sees and differ from the counts only when verdicts
/// are weighted by judge reliability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairTally {
    pub a: String,
    pub b: String,
    pub wins_a: u64,
    pub wins_b: u64,
    pub ties: u64,
    pub mass_wins_a: f64,
    pub mass_wins_b: f64,
    pub mass_ties: f64,
}

impl PairTally {
    pub fn mass_total(&self) -> f64 {
        self.mass_wins_a + self.mass_wins_b + self.mass_ties
    }
}

impl From<&PairwiseRecord> for PairTally {
    fn from(record: &PairwiseRecord) -> Self {
        let r = record.canonical();
        Self {
            mass_wins_a: r.wins_a as f64,
            mass_wins_b: r.wins_b as f64,
            mass_ties: r.ties as f64,
            a: r.model_a,
            b: r.model_b,
            wins_a: r.wins_a,
            wins_b: r.wins_b,
            ties: r.ties,
        }
    }
}

/// Canonical, merged, sorted tallies from records of either orientation.
pub fn tallies_from_records(records: &[PairwiseRecord]) -> Vec<PairTally> {
    merge_records(&[], records)
        .iter()
        .map(PairTally::from)
        .filter(|t| t.wins_a + t.wins_b + t.ties > 0)
        .collect()
}

/// Like [`extract_pairwise_records`], but each verdict's likelihood mass is
/// its judge's weight.
///
/// Counts are first accumulated as integers per (pair, judge) and only then
/// multiplied out in sorted judge order, so the floating-point sums do not
/// depend on verdict order.
pub fn extract_weighted_tallies<F, W>(verdicts: &[Verdict], entity_of: F, weight_of: W) -> Vec<PairTally>
where
    F: Fn(&str) -> Option<String>,
    W: Fn(&str) -> f64,
{
    type JudgeCounts = BTreeMap<String, [u64; 3]>;
    let mut by_pair: BTreeMap<(String, String), JudgeCounts> = BTreeMap::new();

    for verdict in verdicts {
        let Some((left, right)) = resolve_pair(verdict, &entity_of) else {
            continue;
        };
        let (key, outcome) = if left <= right {
            ((left, right), verdict.outcome)
        } else {
            ((right, left), verdict.outcome.flipped())
        };
        let counts = by_pair
            .entry(key)
            .or_default()
            .entry(verdict.judge.clone())
            .or_insert([0; 3]);
        counts[outcome.slot()] += 1;
    }

    by_pair
        .into_iter()
        .map(|((a, b), judges)| {
            let mut tally = PairTally {
                a,
                b,
                wins_a: 0,
                wins_b: 0,
                ties: 0,
                mass_wins_a: 0.0,
                mass_wins_b: 0.0,
                mass_ties: 0.0,
            };
            for (judge, [left, right, tie]) in judges {
                let w = weight_of(&judge);
                tally.wins_a += left;
                tally.wins_b += right;
                tally.ties += tie;
                tally.mass_wins_a += w * left as f64;
                tally.mass_wins_b += w * right as f64;
                tally.mass_ties += w * tie as f64;
            }
            tally
        })
        .collect()
}
