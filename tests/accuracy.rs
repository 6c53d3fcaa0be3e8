//! Statistical checks of the MinHash estimator. Every trial is seeded, so
//! these tests are deterministic.

use simlsh::{estimate_jaccard, exact_jaccard, MinHashConfig, SignatureEngine};

const A: [u64; 5] = [1, 2, 3, 4, 5];
const B: [u64; 5] = [3, 4, 5, 6, 7];

fn estimate(n_hash_functions: usize, seed: u64) -> f64 {
    let cfg = MinHashConfig::default()
        .with_hash_functions(n_hash_functions)
        .with_seed(seed);
    let engine = SignatureEngine::from_config(&cfg).expect("valid config");
    let a = engine.compute_signature(&A).expect("non-empty set");
    let b = engine.compute_signature(&B).expect("non-empty set");
    estimate_jaccard(a.values(), b.values()).expect("equal lengths")
}

fn mean_abs_error(n_hash_functions: usize, trials: u64) -> f64 {
    let exact = exact_jaccard(&A, &B).expect("non-empty union");
    (0..trials)
        .map(|seed| (estimate(n_hash_functions, seed) - exact).abs())
        .sum::<f64>()
        / trials as f64
}

#[test]
fn overlapping_sets_estimate_three_sevenths() {
    let exact = exact_jaccard(&A, &B).unwrap();
    assert!((exact - 3.0 / 7.0).abs() < 1e-12);

    let trials = 200u64;
    let within = (0..trials)
        .filter(|&seed| (estimate(200, seed) - exact).abs() <= 0.08)
        .count();
    assert!(
        within as f64 >= 0.95 * trials as f64,
        "only {within}/{trials} trials within 0.08 of {exact}"
    );
}

#[test]
fn error_shrinks_as_signatures_grow() {
    let err_10 = mean_abs_error(10, 60);
    let err_100 = mean_abs_error(100, 60);
    let err_1000 = mean_abs_error(1000, 60);
    assert!(err_10 > err_100, "{err_10} <= {err_100}");
    assert!(err_100 > err_1000, "{err_100} <= {err_1000}");
    assert!(err_1000 < 0.05, "{err_1000}");
}

#[test]
fn self_similarity_is_exact() {
    for seed in 0..20 {
        assert_eq!(estimate_self(seed), 1.0);
    }
}

fn estimate_self(seed: u64) -> f64 {
    let engine =
        SignatureEngine::from_config(&MinHashConfig::default().with_seed(seed)).expect("valid");
    let sig = engine.compute_signature(&A).expect("non-empty set");
    estimate_jaccard(sig.values(), sig.values()).expect("equal lengths")
}

#[test]
fn estimate_is_symmetric() {
    let engine =
        SignatureEngine::from_config(&MinHashConfig::default().with_seed(4)).expect("valid");
    let a = engine.compute_signature(&A).unwrap();
    let b = engine.compute_signature(&B).unwrap();
    assert_eq!(
        estimate_jaccard(a.values(), b.values()).unwrap(),
        estimate_jaccard(b.values(), a.values()).unwrap()
    );
}
