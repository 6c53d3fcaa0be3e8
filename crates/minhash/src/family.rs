//! Hash families for MinHash.
//!
//! A [`HashFamily`] is an ordered set of `n` hash functions over integer keys,
//! all reduced by the same prime modulus. Coefficients are drawn once, from
//! an explicit [`fastrand::Rng`], and never change afterwards: `evaluate` is a
//! pure function of `(key, index)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{MinHashConfig, MinHashError};

/// Outer modulus of the universal (double) hash.
pub const UNIVERSAL_MODULUS: u64 = 104_729;

/// Shape of every function in a family.
///
/// Over runs of consecutive item ids a linear function visits the items as an
/// arithmetic progression, so its minimum favours the ends of the run and the
/// estimate drifts low. The quadratic term of [`HashKind::Polynomial`] breaks
/// that structure, which makes it the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashKind {
    /// `(a*x + b) mod p`
    Linear,
    /// `(c0 + c1*x + c2*x^2) mod p`
    #[default]
    Polynomial,
    /// `h1 = (a*x + b) mod p`, `h2 = (a*h1 + b) mod m`, result `(h1 + h2) mod m`
    Universal,
}

impl HashKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HashKind::Linear => "linear",
            HashKind::Polynomial => "polynomial",
            HashKind::Universal => "universal",
        }
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashKind {
    type Err = MinHashError;

    /// Accepts the full names and their one-letter abbreviations, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "l" => Ok(HashKind::Linear),
            "polynomial" | "p" => Ok(HashKind::Polynomial),
            "universal" | "u" | "double" => Ok(HashKind::Universal),
            other => Err(MinHashError::InvalidParameter(format!(
                "unknown hash kind '{other}'; expected linear, polynomial or universal"
            ))),
        }
    }
}

/// Coefficients of a single hash function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCoefficients {
    /// Multiplier, in `[1, prime - 1]`.
    pub a: u64,
    /// Offset, in `[0, prime - 1]`.
    pub b: u64,
    /// Polynomial coefficients `c0, c1, c2`, each in `[1, prime - 1]`.
    pub poly: [u64; 3],
}

/// An immutable family of hash functions sharing one modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFamily {
    kind: HashKind,
    prime: u64,
    seed: Option<u64>,
    coefficients: Vec<HashCoefficients>,
}

pub(crate) fn check_family_params(n_hash_functions: usize, prime: u64) -> Result<(), MinHashError> {
    if n_hash_functions == 0 {
        return Err(MinHashError::InvalidParameter(
            "n_hash_functions must be >= 1 (got 0)".to_string(),
        ));
    }
    if prime < 2 {
        return Err(MinHashError::InvalidParameter(format!(
            "prime must be >= 2 (got {prime})"
        )));
    }
    Ok(())
}

impl HashFamily {
    /// Draw a new family from the given generator.
    pub fn new(
        n_hash_functions: usize,
        prime: u64,
        kind: HashKind,
        rng: &mut fastrand::Rng,
    ) -> Result<Self, MinHashError> {
        check_family_params(n_hash_functions, prime)?;

        let coefficients = (0..n_hash_functions)
            .map(|_| HashCoefficients {
                a: rng.u64(1..prime),
                b: rng.u64(0..prime),
                poly: [rng.u64(1..prime), rng.u64(1..prime), rng.u64(1..prime)],
            })
            .collect();

        Ok(Self {
            kind,
            prime,
            seed: None,
            coefficients,
        })
    }

    /// Draw a reproducible family: the same seed always yields the same coefficients.
    pub fn with_seed(
        n_hash_functions: usize,
        prime: u64,
        kind: HashKind,
        seed: u64,
    ) -> Result<Self, MinHashError> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut family = Self::new(n_hash_functions, prime, kind, &mut rng)?;
        family.seed = Some(seed);
        Ok(family)
    }

    /// Build the family described by a [`MinHashConfig`].
    pub fn from_config(cfg: &MinHashConfig) -> Result<Self, MinHashError> {
        cfg.validate()?;
        match cfg.seed {
            Some(seed) => Self::with_seed(cfg.n_hash_functions, cfg.prime, cfg.kind, seed),
            None => Self::new(
                cfg.n_hash_functions,
                cfg.prime,
                cfg.kind,
                &mut fastrand::Rng::new(),
            ),
        }
    }

    /// Seeded family whose modulus is the first prime above `max_item`, so
    /// every item id in `0..=max_item` is hashed without systematic collisions.
    pub fn for_universe(
        max_item: u64,
        n_hash_functions: usize,
        kind: HashKind,
        seed: u64,
    ) -> Result<Self, MinHashError> {
        let prime = next_prime(max_item).ok_or_else(|| {
            MinHashError::InvalidParameter(format!("no u64 prime exceeds {max_item}"))
        })?;
        Self::with_seed(n_hash_functions, prime, kind, seed)
    }

    /// Number of hash functions.
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// Always false; a family has at least one function.
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    pub fn prime(&self) -> u64 {
        self.prime
    }

    pub fn kind(&self) -> HashKind {
        self.kind
    }

    /// Seed the coefficients were drawn from, if the family is reproducible.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn coefficients(&self) -> &[HashCoefficients] {
        &self.coefficients
    }

    /// Apply function `index` to `key`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[inline]
    pub fn evaluate(&self, key: u64, index: usize) -> u64 {
        let c = &self.coefficients[index];
        let p = self.prime;
        // Reducing the key first keeps every product inside u128 and does
        // not change the result modulo p.
        let x = key % p;
        match self.kind {
            HashKind::Linear => affine_mod(c.a, x, c.b, p),
            HashKind::Polynomial => {
                let x2 = mul_mod(x, x, p);
                let t1 = mul_mod(c.poly[1], x, p);
                let t2 = mul_mod(c.poly[2], x2, p);
                ((c.poly[0] as u128 + t1 as u128 + t2 as u128) % p as u128) as u64
            }
            HashKind::Universal => {
                let m = UNIVERSAL_MODULUS;
                let h1 = affine_mod(c.a, x, c.b, p);
                let h2 = affine_mod(c.a, h1, c.b, m);
                ((h1 as u128 + h2 as u128) % m as u128) as u64
            }
        }
    }

    /// Apply every function to `key`, writing one value per function.
    ///
    /// `out` is cleared first and ends up with exactly `self.len()` values.
    pub fn evaluate_all(&self, key: u64, out: &mut Vec<u64>) {
        out.clear();
        out.extend((0..self.len()).map(|i| self.evaluate(key, i)));
    }
}

#[inline]
fn mul_mod(x: u64, y: u64, m: u64) -> u64 {
    ((x as u128 * y as u128) % m as u128) as u64
}

#[inline]
fn affine_mod(a: u64, x: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * x as u128 + b as u128) % m as u128) as u64
}

/// Trial division over `6k ± 1`.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n < 4 {
        return true;
    }
    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }
    let mut i = 5u64;
    while i.checked_mul(i).is_some_and(|sq| sq <= n) {
        if n % i == 0 || n % (i + 2) == 0 {
            return false;
        }
        i += 6;
    }
    true
}

/// Smallest prime strictly greater than `n`, or `None` past the last u64 prime.
pub fn next_prime(n: u64) -> Option<u64> {
    let mut candidate = n.checked_add(1)?;
    while !is_prime(candidate) {
        candidate = candidate.checked_add(1)?;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_names_and_abbreviations() {
        assert_eq!("linear".parse::<HashKind>().unwrap(), HashKind::Linear);
        assert_eq!("L".parse::<HashKind>().unwrap(), HashKind::Linear);
        assert_eq!(
            "Polynomial".parse::<HashKind>().unwrap(),
            HashKind::Polynomial
        );
        assert_eq!("p".parse::<HashKind>().unwrap(), HashKind::Polynomial);
        assert_eq!(" UNIVERSAL ".parse::<HashKind>().unwrap(), HashKind::Universal);
        assert_eq!("u".parse::<HashKind>().unwrap(), HashKind::Universal);
    }

    #[test]
    fn kind_rejects_unknown_names() {
        let err = "cubic".parse::<HashKind>().unwrap_err();
        assert!(matches!(err, MinHashError::InvalidParameter(_)));
        assert!(err.to_string().contains("cubic"));
    }

    #[test]
    fn construct_rejects_zero_functions() {
        let result = HashFamily::with_seed(0, 10_513, HashKind::Linear, 1);
        assert!(matches!(result, Err(MinHashError::InvalidParameter(_))));
    }

    #[test]
    fn construct_rejects_degenerate_prime() {
        let result = HashFamily::with_seed(4, 1, HashKind::Linear, 1);
        assert!(matches!(result, Err(MinHashError::InvalidParameter(_))));
    }

    #[test]
    fn coefficients_stay_in_range() {
        let prime = 101;
        let family = HashFamily::with_seed(500, prime, HashKind::Polynomial, 99).unwrap();
        assert_eq!(family.len(), 500);
        for c in family.coefficients() {
            assert!((1..prime).contains(&c.a));
            assert!(c.b < prime);
            assert!(c.poly.iter().all(|v| (1..prime).contains(v)));
        }
    }

    #[test]
    fn same_seed_same_family() {
        let a = HashFamily::with_seed(64, 10_513, HashKind::Universal, 42).unwrap();
        let b = HashFamily::with_seed(64, 10_513, HashKind::Universal, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.seed(), Some(42));
    }

    #[test]
    fn different_seeds_differ() {
        let a = HashFamily::with_seed(64, 10_513, HashKind::Linear, 1).unwrap();
        let b = HashFamily::with_seed(64, 10_513, HashKind::Linear, 2).unwrap();
        assert_ne!(a.coefficients(), b.coefficients());
    }

    #[test]
    fn evaluate_is_deterministic() {
        for kind in [HashKind::Linear, HashKind::Polynomial, HashKind::Universal] {
            let family = HashFamily::with_seed(16, 10_513, kind, 3).unwrap();
            for key in [0u64, 1, 17, 10_512, 99_999] {
                for i in 0..family.len() {
                    assert_eq!(family.evaluate(key, i), family.evaluate(key, i));
                }
            }
        }
    }

    #[test]
    fn linear_matches_formula() {
        let family = HashFamily::with_seed(8, 10_513, HashKind::Linear, 5).unwrap();
        for (i, c) in family.coefficients().iter().enumerate() {
            let key = 1234u64;
            assert_eq!(family.evaluate(key, i), (c.a * key + c.b) % 10_513);
        }
    }

    #[test]
    fn polynomial_matches_formula() {
        let family = HashFamily::with_seed(8, 10_513, HashKind::Polynomial, 5).unwrap();
        for (i, c) in family.coefficients().iter().enumerate() {
            let key = 321u64;
            let expected = (c.poly[0] + c.poly[1] * key + c.poly[2] * key * key) % 10_513;
            assert_eq!(family.evaluate(key, i), expected);
        }
    }

    #[test]
    fn universal_matches_formula() {
        let family = HashFamily::with_seed(8, 10_513, HashKind::Universal, 5).unwrap();
        for (i, c) in family.coefficients().iter().enumerate() {
            let key = 777u64;
            let h1 = (c.a * key + c.b) % 10_513;
            let h2 = (c.a * h1 + c.b) % UNIVERSAL_MODULUS;
            assert_eq!(family.evaluate(key, i), (h1 + h2) % UNIVERSAL_MODULUS);
            assert!(family.evaluate(key, i) < UNIVERSAL_MODULUS);
        }
    }

    #[test]
    fn large_keys_do_not_overflow() {
        let family =
            HashFamily::with_seed(8, 18_446_744_073_709_551_557, HashKind::Polynomial, 11)
                .unwrap();
        for i in 0..family.len() {
            assert!(family.evaluate(u64::MAX - 3, i) < family.prime());
        }
    }

    #[test]
    fn evaluate_all_fills_one_value_per_function() {
        let family = HashFamily::with_seed(12, 10_513, HashKind::Linear, 8).unwrap();
        let mut out = vec![1, 2, 3];
        family.evaluate_all(55, &mut out);
        assert_eq!(out.len(), 12);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, family.evaluate(55, i));
        }
    }

    #[test]
    fn next_prime_finds_following_prime() {
        assert_eq!(next_prime(0), Some(2));
        assert_eq!(next_prime(2), Some(3));
        assert_eq!(next_prime(10_512), Some(10_513));
        assert_eq!(next_prime(10_513), Some(10_529));
        assert_eq!(next_prime(104_728), Some(104_729));
        assert_eq!(next_prime(u64::MAX), None);
    }

    #[test]
    fn for_universe_prime_exceeds_max_item() {
        let family = HashFamily::for_universe(1_000, 4, HashKind::Linear, 1).unwrap();
        assert_eq!(family.prime(), 1_009);
    }

    #[test]
    fn from_config_honors_seed() {
        let cfg = MinHashConfig::default().with_seed(77).with_hash_functions(10);
        let a = HashFamily::from_config(&cfg).unwrap();
        let b = HashFamily::from_config(&cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }
}
