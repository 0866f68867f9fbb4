use verdict_ladder::ledger::{
    extract_pairwise_records, games_to_records, merge_records, normalize_outcome, to_games,
    tallies_from_records, Outcome, PairwiseRecord, Stage, Verdict,
};

fn record(a: &str, b: &str, wins_a: u64, wins_b: u64, ties: u64) -> PairwiseRecord {
    PairwiseRecord {
        model_a: a.into(),
        model_b: b.into(),
        wins_a,
        wins_b,
        ties,
    }
}

fn owner_of(sample: &str) -> Option<String> {
    sample.split('/').next().map(str::to_string)
}

#[test]
fn merge_swaps_reversed_labels_into_stored_orientation() {
    let existing = vec![record("X", "Y", 3, 1, 0)];
    let incoming = vec![record("Y", "X", 2, 0, 1)];
    let merged = merge_records(&existing, &incoming);

    assert_eq!(merged, vec![record("X", "Y", 3, 3, 1)]);
}

#[test]
fn merge_keeps_first_seen_orientation_even_if_not_canonical() {
    let merged = merge_records(&[record("b", "a", 1, 0, 0)], &[record("a", "b", 5, 0, 0)]);
    assert_eq!(merged, vec![record("b", "a", 1, 5, 0)]);
}

#[test]
fn merge_drops_self_pairs_and_sorts_output() {
    let merged = merge_records(
        &[record("m", "z", 1, 0, 0), record("m", "m", 4, 4, 4)],
        &[record("c", "a", 0, 1, 0)],
    );
    let keys: Vec<(&str, &str)> = merged.iter().map(|r| r.pair_key()).collect();
    assert_eq!(keys, vec![("a", "c"), ("m", "z")]);
}

#[test]
fn normalization_flips_outcome_with_samples() {
    let v = Verdict::new("j", Stage::Revised, "p7", "zeta", "alpha", Outcome::Left);
    assert!(!v.is_canonical());
    assert_eq!(normalize_outcome(&v), Outcome::Right);

    let n = v.normalized();
    assert_eq!((n.sample_left.as_str(), n.sample_right.as_str()), ("alpha", "zeta"));
    assert_eq!(n.outcome, Outcome::Right);
    assert_eq!(n.context_key(), "revised:p7");

    let tie = Verdict::new("j", Stage::Initial, "p", "b", "a", Outcome::Tie);
    assert_eq!(normalize_outcome(&tie), Outcome::Tie);
}

#[test]
fn presentation_order_does_not_change_records() {
    let shown_ab = vec![Verdict::new("j", Stage::Initial, "p", "a/1", "b/1", Outcome::Left)];
    let shown_ba = vec![Verdict::new("j", Stage::Initial, "p", "b/1", "a/1", Outcome::Right)];
    assert_eq!(
        extract_pairwise_records(&shown_ab, owner_of),
        extract_pairwise_records(&shown_ba, owner_of)
    );
}

#[test]
fn self_comparisons_and_unowned_samples_are_dropped() {
    let verdicts = vec![
        Verdict::new("j", Stage::Initial, "p", "a/1", "a/2", Outcome::Left),
        Verdict::new("j", Stage::Initial, "p", "a/1", "b/1", Outcome::Tie),
        Verdict::new("j", Stage::Initial, "p", "ghost", "b/1", Outcome::Left),
    ];
    let only_known = |s: &str| {
        if s.contains('/') {
            owner_of(s)
        } else {
            None
        }
    };

    let games = to_games(&verdicts, only_known);
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].result, 0.5);

    let records = extract_pairwise_records(&verdicts, only_known);
    assert_eq!(records, vec![record("a", "b", 0, 0, 1)]);
    assert_eq!(games_to_records(&games), records);
}

#[test]
fn tallies_combine_both_orientations() {
    let tallies = tallies_from_records(&[record("b", "a", 2, 1, 0), record("a", "b", 1, 0, 3)]);
    assert_eq!(tallies.len(), 1);
    let t = &tallies[0];
    assert_eq!((t.a.as_str(), t.b.as_str()), ("a", "b"));
    assert_eq!((t.wins_a, t.wins_b, t.ties), (2, 2, 3));
    assert_eq!(t.mass_total(), 7.0);
}

#[test]
fn records_expand_to_atomic_games() {
    let r = record("a", "b", 2, 1, 1);
    let games: Vec<_> = r.games().collect();
    assert_eq!(games.len() as u64, r.total());
    assert_eq!(games_to_records(&games), vec![r]);
}
