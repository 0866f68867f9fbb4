//! Rating pools and sample resolution.
//!
//! Entities are rated in independent pools (writers, feedback providers,
//! per-category writers). A pool never mixes entities of different roles;
//! a sample that has no owner in a pool is simply not rated there.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SolverConfig;
use crate::error::LoadError;
use crate::ledger::{extract_pairwise_records, extract_weighted_tallies, Verdict};
use crate::rating_engine::{solve_records, solve_tallies, Rating};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Writers,
    Feedback,
    /// Judges own no samples; they are rated from judge-vs-judge agreement
    /// games (`judge_quality::agreement_records`).
    Judges,
    /// Writers restricted to samples of one category.
    Category(String),
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Writers => f.write_str("writers"),
            Self::Feedback => f.write_str("feedback"),
            Self::Judges => f.write_str("judges"),
            Self::Category(c) => write!(f, "category:{c}"),
        }
    }
}

impl FromStr for Pool {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "writers" => Ok(Self::Writers),
            "feedback" => Ok(Self::Feedback),
            "judges" => Ok(Self::Judges),
            other => match other.strip_prefix("category:") {
                Some(c) if !c.is_empty() => Ok(Self::Category(c.to_string())),
                _ => Err(LoadError::UnknownPool(other.to_string())),
            },
        }
    }
}

/// Who produced a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleOwner {
    /// Model that wrote the sample.
    pub writer: String,
    /// Model whose feedback produced a revised sample, if any.
    #[serde(default)]
    pub feedback: Option<String>,
    /// Prompt category, if the prompt set is categorized.
    #[serde(default)]
    pub category: Option<String>,
}

/// Sample id → owner map shared by all pools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleIndex {
    samples: HashMap<String, SampleOwner>,
}

impl SampleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sample: impl Into<String>, owner: SampleOwner) {
        self.samples.insert(sample.into(), owner);
    }

    pub fn get(&self, sample: &str) -> Option<&SampleOwner> {
        self.samples.get(sample)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Entity owning `sample` within `pool`.
    pub fn entity_of(&self, pool: &Pool, sample: &str) -> Option<String> {
        let owner = self.samples.get(sample)?;
        match pool {
            Pool::Writers => Some(owner.writer.clone()),
            Pool::Feedback => owner.feedback.clone(),
            Pool::Judges => None,
            Pool::Category(c) => (owner.category.as_deref() == Some(c.as_str()))
                .then(|| owner.writer.clone()),
        }
    }

    /// Resolution closure for the ledger functions.
    pub fn resolver<'a>(&'a self, pool: &'a Pool) -> impl Fn(&str) -> Option<String> + 'a {
        move |sample| self.entity_of(pool, sample)
    }

    /// Every entity that owns at least one sample in `pool`, sorted.
    pub fn roster(&self, pool: &Pool) -> Vec<String> {
        let entities: BTreeSet<String> = self
            .samples
            .keys()
            .filter_map(|s| self.entity_of(pool, s))
            .collect();
        entities.into_iter().collect()
    }

    /// Distinct categories seen across samples, sorted.
    pub fn categories(&self) -> Vec<String> {
        let cats: BTreeSet<&str> = self
            .samples
            .values()
            .filter_map(|o| o.category.as_deref())
            .collect();
        cats.into_iter().map(str::to_string).collect()
    }
}

/// Rate every entity of one pool from raw verdicts.
///
/// Entities in `roster` with no usable comparisons still get a default
/// rating; pass an empty roster to rate only entities that were compared.
pub fn rate_pool(
    verdicts: &[Verdict],
    index: &SampleIndex,
    pool: &Pool,
    roster: &[String],
    cfg: &SolverConfig,
) -> Vec<Rating> {
    let records = extract_pairwise_records(verdicts, index.resolver(pool));
    solve_records(&records, roster, cfg)
}

/// Like [`rate_pool`], with each verdict weighted by its judge's reliability.
pub fn rate_pool_weighted<W>(
    verdicts: &[Verdict],
    index: &SampleIndex,
    pool: &Pool,
    roster: &[String],
    weight_of: W,
    cfg: &SolverConfig,
) -> Vec<Rating>
where
    W: Fn(&str) -> f64,
{
    let tallies = extract_weighted_tallies(verdicts, index.resolver(pool), weight_of);
    solve_tallies(&tallies, roster, cfg)
}
