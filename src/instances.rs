//! Evaluation instances: the same comparison rated by several judges.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ledger::{normalize_outcome, Outcome, Verdict};

/// One comparison (sample pair in a context) rated by at least two judges.
///
/// Samples are stored in canonical order and every judge's outcome is
/// expressed relative to that order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationInstance {
    pub context_key: String,
    pub sample_a: String,
    pub sample_b: String,
    pub consensus: Outcome,
    pub verdicts: BTreeMap<String, Outcome>,
}

impl EvaluationInstance {
    pub fn judge_count(&self) -> usize {
        self.verdicts.len()
    }

    /// Whether `judge` voted with the consensus. `None` if it did not vote.
    pub fn agrees(&self, judge: &str) -> Option<bool> {
        self.verdicts.get(judge).map(|o| *o == self.consensus)
    }
}

/// Strict-majority outcome, or `Tie` when no outcome beats both others.
///
/// Two-way splits and three-way disagreements both land on `Tie`; no
/// majority is manufactured from a plurality that does not exist.
pub fn consensus<I>(votes: I) -> Outcome
where
    I: IntoIterator<Item = Outcome>,
{
    let (mut left, mut right, mut tie) = (0usize, 0usize, 0usize);
    for vote in votes {
        match vote {
            Outcome::Left => left += 1,
            Outcome::Right => right += 1,
            Outcome::Tie => tie += 1,
        }
    }
    if left > right && left > tie {
        Outcome::Left
    } else if right > left && right > tie {
        Outcome::Right
    } else {
        Outcome::Tie
    }
}

/// Group verdicts into multi-judge instances.
///
/// Verdicts are keyed by `(context_key, canonical sample pair)`. A judge
/// that voted more than once on an instance keeps its latest verdict (the
/// later one in the log). Groups with fewer than two distinct judges are
/// dropped. Output is sorted by key.
pub fn group_instances(verdicts: &[Verdict]) -> Vec<EvaluationInstance> {
    type InstanceKey = (String, String, String);
    let mut groups: BTreeMap<InstanceKey, BTreeMap<String, Outcome>> = BTreeMap::new();

    for verdict in verdicts {
        let (a, b) = verdict.canonical_pair();
        let key = (verdict.context_key(), a.to_string(), b.to_string());
        groups
            .entry(key)
            .or_default()
            .insert(verdict.judge.clone(), normalize_outcome(verdict));
    }

    groups
        .into_iter()
        .filter(|(_, votes)| votes.len() >= 2)
        .map(|((context_key, sample_a, sample_b), votes)| EvaluationInstance {
            consensus: consensus(votes.values().copied()),
            context_key,
            sample_a,
            sample_b,
            verdicts: votes,
        })
        .collect()
}
