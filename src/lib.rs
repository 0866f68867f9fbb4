#![forbid(unsafe_code)]

//! # verdict-ladder
//!
//! Rank competing generators from pairwise "which output is better" verdicts,
//! and work out which of the judges issuing those verdicts can be trusted.
//!
//! Raw verdicts are folded into canonical per-pair tallies (`ledger`) and fit
//! with a Bradley-Terry model on the Elo scale (`rating_engine`), yielding a
//! rating and a 95% half-width per entity. Verdicts on the same comparison
//! from several judges are grouped into instances (`instances`); agreement
//! with the majority turns into judge-vs-judge games whose ratings become
//! multiplicative judge weights (`judge_quality`). The `convergence` module
//! decides how many more comparisons a rating still needs.
//!
//! Everything in the core is pure and synchronous, and the solver's output
//! does not depend on the order verdicts arrive in.

pub mod config;
pub mod convergence;
pub mod digest;
pub mod error;
pub mod instances;
pub mod judge_quality;
pub mod ledger;
pub mod pools;
pub mod rating_engine;
pub mod simulation;

pub use config::{ConvergenceConfig, JudgeQualityConfig, LadderConfig, SolverConfig};
pub use convergence::{
    additional_comparisons, comparisons_needed, convergence_report, overlap_free,
    ConvergenceReport,
};
pub use error::{ConfigError, LoadError};
pub use instances::{consensus, group_instances, EvaluationInstance};
pub use judge_quality::{
    agreement_games, agreement_records, estimate_consensus, estimate_proxy, get_judge_weight, judge_weights,
    should_prune_judge, JudgeQualityData,
};
pub use ledger::{
    extract_pairwise_records, merge_records, normalize_outcome, to_games, Game, Outcome,
    PairwiseRecord, Stage, Verdict,
};
pub use pools::{rate_pool, Pool, SampleIndex, SampleOwner};
pub use rating_engine::{expected_score, solve_games, solve_records, Rating, ANCHOR_RATING};
