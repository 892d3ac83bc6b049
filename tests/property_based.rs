//! Property-based invariants shared by every prioritization strategy.

use std::collections::HashSet;

use proptest::prelude::*;

use priorizar::apfd::apfd;
use priorizar::prioritize::{additional_order, lsh_greedy_order, total_order, DistanceMetric};
use priorizar::record::TestCaseType;
use priorizar::tokenizer::{LexicalTokenizer, Tokenizer};

fn is_permutation(order: &[usize], n: usize) -> bool {
    let seen: HashSet<usize> = order.iter().copied().collect();
    order.len() == n && seen.len() == n && seen.iter().all(|&i| i < n)
}

proptest! {
    #[test]
    fn test_apfd_stays_in_unit_interval(mask in prop::collection::vec(any::<bool>(), 1..40)) {
        let order: Vec<usize> = (0..mask.len()).collect();
        let faults: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(|(i, _)| i)
            .collect();
        let score = apfd(&faults, &order);
        prop_assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_coverage_orders_are_permutations(
        raw_sets in prop::collection::vec(prop::collection::hash_set("[a-e]", 0..5), 0..8)
    ) {
        let sets: Vec<HashSet<String>> = raw_sets;
        prop_assert!(is_permutation(&total_order(&sets), sets.len()));
        prop_assert!(is_permutation(&additional_order(&sets), sets.len()));
    }

    #[test]
    fn test_lsh_order_is_a_permutation(
        token_lists in prop::collection::vec(
            prop::collection::vec("[a-h]{1,6}", 0..6),
            0..6,
        )
    ) {
        let cases: Vec<String> = (0..token_lists.len()).map(|i| format!("t{i}.c")).collect();
        let order = lsh_greedy_order(&cases, &token_lists, 16, 8, 128).unwrap();
        prop_assert!(is_permutation(&order, cases.len()));
    }

    #[test]
    fn test_symmetric_metrics(a in ".{0,30}", b in ".{0,30}") {
        for metric in [
            DistanceMetric::Hamming,
            DistanceMetric::Edit,
            DistanceMetric::Euclidean,
            DistanceMetric::Manhattan,
        ] {
            let forward = metric.compute(&a, &b);
            let backward = metric.compute(&b, &a);
            prop_assert!((forward - backward).abs() < 1e-9);
            prop_assert!(forward >= 0.0);
        }
        prop_assert_eq!(metric_zero(&a), 0.0);
    }

    #[test]
    fn test_tokenizer_total_on_arbitrary_input(contents in ".{0,200}") {
        let tokenizer = LexicalTokenizer::new();
        for case_type in [TestCaseType::C, TestCaseType::Sh, TestCaseType::Unknown] {
            let _ = tokenizer.tokens(&contents, case_type);
        }
    }
}

fn metric_zero(a: &str) -> f64 {
    DistanceMetric::Hamming.compute(a, a)
}
