use simsearch_core::analysis::{
    normalized_similarity, odds_of_random_hit, probability_of_random_match, similarity,
};

#[test]
fn probability_bounds() {
    assert!((probability_of_random_match(0) - 1.0).abs() < 1e-12);
    assert!(probability_of_random_match(128) > 0.0);
    assert!(probability_of_random_match(128) < 1e-38);
    // Values past the hash width clamp to a full match.
    assert_eq!(probability_of_random_match(500), probability_of_random_match(128));
}

#[test]
fn odds_never_decrease_with_more_matching_bits() {
    for population in [0u64, 1, 1_000, 50_000_000] {
        let mut previous = 0.0f64;
        for bits in 0..=128 {
            let odds = odds_of_random_hit(bits, population);
            assert!(odds >= previous, "odds fell at {bits} bits (population {population})");
            previous = odds;
        }
    }
}

#[test]
fn larger_population_lowers_odds() {
    assert!(odds_of_random_hit(100, 1_000_000) < odds_of_random_hit(100, 10));
    // An empty index is treated as a population of one.
    assert_eq!(odds_of_random_hit(100, 0), odds_of_random_hit(100, 1));
    assert!((odds_of_random_hit(0, 1) - 1.0).abs() < 1e-12);
}

#[test]
fn similarity_scales() {
    assert_eq!(similarity(128), 1.0);
    assert_eq!(similarity(64), 0.5);
    assert_eq!(normalized_similarity(64), 0.0);
    assert_eq!(normalized_similarity(10), 0.0);
    assert_eq!(normalized_similarity(96), 0.5);
    assert_eq!(normalized_similarity(128), 1.0);
}
