use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use verdict_ladder::config::SolverConfig;
use verdict_ladder::ledger::{
    extract_pairwise_records, extract_weighted_tallies, to_games, Game, Outcome, PairwiseRecord,
    Stage, Verdict,
};
use verdict_ladder::rating_engine::{
    expected_score, solve, solve_games, solve_records, solve_tallies, Rating, ANCHOR_RATING,
};

fn by_entity(ratings: &[Rating]) -> HashMap<String, Rating> {
    ratings.iter().map(|r| (r.entity.clone(), r.clone())).collect()
}

fn owner_of(sample: &str) -> Option<String> {
    // "model/prompt" -> "model"
    sample.split('/').next().map(str::to_string)
}

fn mixed_verdicts() -> Vec<Verdict> {
    let mut v = Vec::new();
    let pairs = [
        ("alpha/p1", "beta/p1", Outcome::Left),
        ("beta/p2", "alpha/p2", Outcome::Right),
        ("alpha/p3", "gamma/p3", Outcome::Left),
        ("gamma/p1", "beta/p1", Outcome::Tie),
        ("beta/p3", "gamma/p3", Outcome::Left),
        ("gamma/p2", "alpha/p2", Outcome::Left),
        ("delta/p1", "alpha/p1", Outcome::Right),
        ("delta/p2", "gamma/p2", Outcome::Tie),
        ("alpha/p1", "alpha/p2", Outcome::Left), // self-comparison
    ];
    for (judge, stage) in [("j1", Stage::Initial), ("j2", Stage::Revised)] {
        for (left, right, outcome) in pairs {
            v.push(Verdict::new(judge, stage, "p", left, right, outcome));
        }
    }
    v
}

#[test]
fn expected_score_is_symmetric_and_centered() {
    for r in [0.0, 1234.5, 1500.0, 2800.0, -300.0] {
        assert_eq!(expected_score(r, r), 0.5);
    }
    for (a, b) in [(1500.0, 1400.0), (1000.0, 2000.0), (1712.3, 1698.1), (0.0, 3000.0)] {
        assert_eq!(expected_score(a, b) + expected_score(b, a), 1.0);
    }
    // 400 points is a factor of ten in odds.
    assert!((expected_score(1900.0, 1500.0) - 10.0 / 11.0).abs() < 1e-12);
}

#[test]
fn three_straight_wins_rank_winner_above_anchor_and_loser() {
    let games = vec![
        Game::new("A", "B", 1.0),
        Game::new("B", "A", 0.0),
        Game::new("A", "B", 1.0),
    ];
    let ratings = by_entity(&solve_games(&games, &[], &SolverConfig::default()));

    let a = &ratings["A"];
    let b = &ratings["B"];
    assert!(a.rating > ANCHOR_RATING);
    assert!(a.rating > b.rating);
    assert_eq!(a.wins, 3);
    assert_eq!(b.losses, 3);
    assert_eq!(a.match_count, 3);
    assert!(a.rating.is_finite() && a.ci95.is_finite());
}

#[test]
fn roster_entities_without_games_sit_at_anchor() {
    let roster = vec!["A".to_string(), "B".to_string(), "idle".to_string()];
    let games = vec![Game::new("A", "B", 1.0)];
    let ratings = by_entity(&solve_games(&games, &roster, &SolverConfig::default()));

    let idle = &ratings["idle"];
    assert_eq!(idle.rating, ANCHOR_RATING);
    assert_eq!(idle.match_count, 0);
    assert!(idle.ci95.is_infinite());
}

#[test]
fn empty_input_rates_roster_only() {
    let roster = vec!["x".to_string(), "y".to_string()];
    let ratings = solve_records(&[], &roster, &SolverConfig::default());
    assert_eq!(ratings.len(), 2);
    assert!(ratings.iter().all(|r| r.rating == ANCHOR_RATING && r.match_count == 0));

    assert!(solve_records(&[], &[], &SolverConfig::default()).is_empty());
}

#[test]
fn self_comparisons_do_not_move_ratings() {
    let cfg = SolverConfig::default();
    let base = vec![
        Verdict::new("j", Stage::Initial, "p", "a/1", "b/1", Outcome::Left),
        Verdict::new("j", Stage::Initial, "p", "b/2", "a/2", Outcome::Tie),
    ];
    let mut polluted = base.clone();
    polluted.push(Verdict::new("j", Stage::Initial, "p", "a/1", "a/2", Outcome::Left));
    polluted.push(Verdict::new("j", Stage::Initial, "p", "a/3", "a/1", Outcome::Tie));

    let clean = solve_records(&extract_pairwise_records(&base, owner_of), &[], &cfg);
    let dirty = solve_records(&extract_pairwise_records(&polluted, owner_of), &[], &cfg);
    assert_eq!(clean, dirty);
    assert_eq!(to_games(&polluted, owner_of).len(), 2);
}

#[test]
fn permutations_give_bit_identical_ratings() {
    let cfg = SolverConfig::default();
    let verdicts = mixed_verdicts();
    let reference = solve_records(&extract_pairwise_records(&verdicts, owner_of), &[], &cfg);

    let mut rng = StdRng::seed_from_u64(1337);
    for _ in 0..25 {
        let mut shuffled = verdicts.clone();
        shuffled.shuffle(&mut rng);
        let ratings = solve_records(&extract_pairwise_records(&shuffled, owner_of), &[], &cfg);
        assert_eq!(ratings.len(), reference.len());
        for (x, y) in ratings.iter().zip(&reference) {
            assert_eq!(x.entity, y.entity);
            assert_eq!(x.rating.to_bits(), y.rating.to_bits());
            assert_eq!(x.ci95.to_bits(), y.ci95.to_bits());
            assert_eq!((x.wins, x.losses, x.ties, x.match_count), (y.wins, y.losses, y.ties, y.match_count));
        }
    }
}

#[test]
fn record_orientation_does_not_matter() {
    let cfg = SolverConfig::default();
    let forward = PairwiseRecord {
        model_a: "a".into(),
        model_b: "b".into(),
        wins_a: 4,
        wins_b: 1,
        ties: 2,
    };
    let reversed = forward.reversed();
    assert_eq!(
        solve_records(&[forward], &[], &cfg),
        solve_records(&[reversed], &[], &cfg)
    );
}

#[test]
fn more_matches_shrink_half_width() {
    let cfg = SolverConfig::default();
    let small = PairwiseRecord {
        model_a: "a".into(),
        model_b: "b".into(),
        wins_a: 3,
        wins_b: 2,
        ties: 0,
    };
    let large = PairwiseRecord {
        wins_a: 30,
        wins_b: 20,
        ..small.clone()
    };
    let ci_small = by_entity(&solve_records(&[small], &[], &cfg))["a"].ci95;
    let ci_large = by_entity(&solve_records(&[large], &[], &cfg))["a"].ci95;
    assert!(ci_large < ci_small, "{ci_large} !< {ci_small}");
}

#[test]
fn balanced_outcomes_are_tighter_than_lopsided() {
    let cfg = SolverConfig::default();
    let balanced = PairwiseRecord {
        model_a: "a".into(),
        model_b: "b".into(),
        wins_a: 10,
        wins_b: 10,
        ties: 0,
    };
    let lopsided = PairwiseRecord {
        wins_a: 19,
        wins_b: 1,
        ..balanced.clone()
    };
    let ci_balanced = by_entity(&solve_records(&[balanced], &[], &cfg))["a"].ci95;
    let ci_lopsided = by_entity(&solve_records(&[lopsided], &[], &cfg))["a"].ci95;
    assert!(ci_balanced < ci_lopsided);
}

#[test]
fn chain_orders_transitively() {
    let cfg = SolverConfig::default();
    let records = vec![
        PairwiseRecord { model_a: "a".into(), model_b: "b".into(), wins_a: 6, wins_b: 2, ties: 0 },
        PairwiseRecord { model_a: "b".into(), model_b: "c".into(), wins_a: 6, wins_b: 2, ties: 0 },
    ];
    let summary = solve(
        &verdict_ladder::ledger::tallies_from_records(&records),
        &[],
        &cfg,
    );
    assert!(summary.converged);
    let order: Vec<&str> = summary.ratings.iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn unit_weights_match_unweighted_fit() {
    let cfg = SolverConfig::default();
    let verdicts = mixed_verdicts();
    let unweighted = solve_records(&extract_pairwise_records(&verdicts, owner_of), &[], &cfg);
    let weighted = solve_tallies(&extract_weighted_tallies(&verdicts, owner_of, |_| 1.0), &[], &cfg);
    assert_eq!(unweighted, weighted);
}

#[test]
fn down_weighted_judge_has_less_pull() {
    let cfg = SolverConfig::default();
    let mut verdicts = Vec::new();
    for i in 0..4 {
        let (l, r) = (format!("a/{i}"), format!("b/{i}"));
        verdicts.push(Verdict::new("good", Stage::Initial, "p", &l, &r, Outcome::Left));
        verdicts.push(Verdict::new("bad", Stage::Initial, "p", &l, &r, Outcome::Right));
    }
    let trusted = by_entity(&solve_tallies(
        &extract_weighted_tallies(&verdicts, owner_of, |j| if j == "bad" { 0.1 } else { 1.0 }),
        &[],
        &cfg,
    ));
    assert!(trusted["a"].rating > trusted["b"].rating);
    // Raw counts are untouched by weighting.
    assert_eq!(trusted["a"].wins, 4);
    assert_eq!(trusted["a"].losses, 4);
}

fn pair(a: &str, b: &str, wins_a: u64, wins_b: u64, ties: u64) -> PairwiseRecord {
    PairwiseRecord {
        model_a: a.into(),
        model_b: b.into(),
        wins_a,
        wins_b,
        ties,
    }
}

/// Observed minus expected score for every entity, anchor games included.
fn score_residuals(records: &[PairwiseRecord], ratings: &[Rating], prior: f64) -> Vec<(String, f64)> {
    let by = by_entity(ratings);
    ratings
        .iter()
        .map(|r| {
            let mut observed = 0.5 * prior;
            let mut expected = prior * expected_score(r.rating, ANCHOR_RATING);
            for rec in records {
                let (opponent, won, lost) = if rec.model_a == r.entity {
                    (&rec.model_b, rec.wins_a, rec.wins_b)
                } else if rec.model_b == r.entity {
                    (&rec.model_a, rec.wins_b, rec.wins_a)
                } else {
                    continue;
                };
                let games = (won + lost + rec.ties) as f64;
                observed += won as f64 + 0.5 * rec.ties as f64;
                expected += games * expected_score(r.rating, by[opponent.as_str()].rating);
            }
            (r.entity.clone(), observed - expected)
        })
        .collect()
}

#[test]
fn heavy_lopsided_record_converges_under_defaults() {
    let cfg = SolverConfig::default();
    let tallies = verdict_ladder::ledger::tallies_from_records(&[pair("a", "b", 200, 5, 0)]);
    let summary = solve(&tallies, &[], &cfg);

    assert!(summary.converged, "stopped after {} iterations", summary.iterations);
    assert!(summary.iterations < 100, "{} iterations", summary.iterations);
    let r = by_entity(&summary.ratings);
    assert!((r["a"].rating + r["b"].rating - 2.0 * ANCHOR_RATING).abs() < 1e-6);
    assert!(r["a"].rating > r["b"].rating);
}

#[test]
fn sweep_of_1000_reaches_the_likelihood_maximum() {
    let cfg = SolverConfig::default();
    let heavy = solve(
        &verdict_ladder::ledger::tallies_from_records(&[pair("a", "b", 1000, 0, 0)]),
        &[],
        &cfg,
    );
    assert!(heavy.converged);
    let heavy = by_entity(&heavy.ratings);
    // Symmetric around the anchor; a stands where the anchor draw balances
    // the 1000 wins.
    assert!((heavy["a"].rating + heavy["b"].rating - 2.0 * ANCHOR_RATING).abs() < 1e-6);
    assert!((heavy["a"].rating - 2164.0).abs() < 1.0, "{}", heavy["a"].rating);

    let light = by_entity(&solve_records(&[pair("a", "b", 50, 0, 0)], &[], &cfg));
    let gap = |r: &HashMap<String, Rating>| r["a"].rating - r["b"].rating;
    assert!(gap(&heavy) > gap(&light));
}

#[test]
fn cumulative_ledger_satisfies_score_equations() {
    let cfg = SolverConfig::default();
    let names = ["a", "b", "c", "d", "e"];
    let mut records = Vec::new();
    for (i, x) in names.iter().enumerate() {
        for (k, y) in names[i + 1..].iter().enumerate() {
            // Stronger-listed entity wins more, more so across a wider gap.
            let gap = (k + 1) as u64;
            records.push(pair(x, y, 100 + 15 * gap, 70 - 15 * gap, 5));
        }
    }
    let tallies = verdict_ladder::ledger::tallies_from_records(&records);
    let summary = solve(&tallies, &[], &cfg);

    assert!(summary.converged, "stopped after {} iterations", summary.iterations);
    assert!(summary.iterations < 100);
    let order: Vec<&str> = summary.ratings.iter().map(|r| r.entity.as_str()).collect();
    assert_eq!(order, names.to_vec());
    for (entity, residual) in score_residuals(&records, &summary.ratings, cfg.prior_games) {
        assert!(residual.abs() < 1e-6, "{entity}: residual {residual}");
    }
}

#[test]
fn nan_ratings_propagate() {
    assert!(expected_score(f64::NAN, 1500.0).is_nan());
    assert!(expected_score(1500.0, f64::NAN).is_nan());
    assert!(expected_score(f64::NAN, f64::NAN).is_nan());
}
