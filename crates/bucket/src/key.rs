//! Bucket keys derived from signature bands.
//!
//! The band index is always a separate component of the key, so slices from
//! different bands can never share a bucket. Within one band, the folded
//! scheme maps slices into a bounded code space where distinct slices may
//! collide; such collisions only add false-positive candidates and are
//! tuned through the code space size.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Modulus of the running fold, `2^63 - 1`.
pub const FOLD_MODULUS: u64 = (1 << 63) - 1;

/// Multiplier of the running fold.
pub const FOLD_MULTIPLIER: u64 = 31;

/// Default number of distinct folded codes per band (six decimal digits).
pub const DEFAULT_CODE_SPACE: u64 = 1_000_000;

/// How a band slice becomes a bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketKeyScheme {
    /// Multiply-and-mod fold of `(band_index, slice)` reduced into
    /// `code_space` codes.
    Folded { code_space: u64 },
    /// The slice itself; entities share a bucket iff their slices are equal.
    Exact,
}

impl Default for BucketKeyScheme {
    fn default() -> Self {
        BucketKeyScheme::Folded {
            code_space: DEFAULT_CODE_SPACE,
        }
    }
}

impl BucketKeyScheme {
    /// Derive the key of `rows`, the slice of band `band`.
    pub fn key(&self, band: usize, rows: &[u64]) -> BucketKey {
        match *self {
            BucketKeyScheme::Folded { code_space } => BucketKey::Code {
                band,
                code: fold_band(band, rows) % code_space.max(1),
            },
            BucketKeyScheme::Exact => BucketKey::Rows {
                band,
                rows: rows.into(),
            },
        }
    }
}

/// `h = band; for v in rows: h = (h * 31 + v) mod (2^63 - 1)`.
pub fn fold_band(band: usize, rows: &[u64]) -> u64 {
    let modulus = FOLD_MODULUS as u128;
    let mut h = band as u128 % modulus;
    for &v in rows {
        h = (h * FOLD_MULTIPLIER as u128 + v as u128) % modulus;
    }
    h as u64
}

/// Identifies one bucket of a [`crate::BandedBucketIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    Code { band: usize, code: u64 },
    Rows { band: usize, rows: Box<[u64]> },
}

impl BucketKey {
    pub fn band(&self) -> usize {
        match self {
            BucketKey::Code { band, .. } | BucketKey::Rows { band, .. } => *band,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Code { code, .. } => write!(f, "LSH-{code:06}"),
            BucketKey::Rows { band, rows } => {
                write!(f, "LSH-b{band}[")?;
                for (i, v) in rows.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_matches_running_formula() {
        // band 2, rows [5, 7]: (2*31 + 5) * 31 + 7 = 2084
        assert_eq!(fold_band(2, &[5, 7]), 2084);
        assert_eq!(fold_band(0, &[]), 0);
    }

    #[test]
    fn fold_stays_below_modulus() {
        let h = fold_band(usize::MAX, &[u64::MAX, u64::MAX, u64::MAX]);
        assert!(h < FOLD_MODULUS);
    }

    #[test]
    fn folded_key_is_six_digit_code() {
        let key = BucketKeyScheme::default().key(3, &[123_456_789, 42]);
        let BucketKey::Code { band, code } = &key else {
            panic!("expected a folded key");
        };
        assert_eq!(*band, 3);
        assert!(*code < DEFAULT_CODE_SPACE);
        let label = key.to_string();
        assert!(label.starts_with("LSH-"));
        assert_eq!(label.len(), 10);
    }

    #[test]
    fn band_index_separates_identical_slices() {
        let scheme = BucketKeyScheme::default();
        assert_ne!(scheme.key(0, &[1, 2, 3]), scheme.key(1, &[1, 2, 3]));
        assert_ne!(
            BucketKeyScheme::Exact.key(0, &[1, 2, 3]),
            BucketKeyScheme::Exact.key(1, &[1, 2, 3])
        );
    }

    #[test]
    fn folded_scheme_may_merge_distinct_slices() {
        // 5 and 1_000_005 land on the same code in a 10^6 code space.
        let scheme = BucketKeyScheme::default();
        assert_eq!(scheme.key(0, &[5]), scheme.key(0, &[1_000_005]));
        assert_ne!(
            BucketKeyScheme::Exact.key(0, &[5]),
            BucketKeyScheme::Exact.key(0, &[1_000_005])
        );
    }

    #[test]
    fn exact_key_displays_slice() {
        let key = BucketKeyScheme::Exact.key(4, &[9, 8]);
        assert_eq!(key.to_string(), "LSH-b4[9,8]");
        assert_eq!(key.band(), 4);
    }

    #[test]
    fn scheme_serde_shape() {
        let json = serde_json::to_string(&BucketKeyScheme::default()).unwrap();
        assert_eq!(json, r#"{"folded":{"code_space":1000000}}"#);
        let exact: BucketKeyScheme = serde_json::from_str(r#""exact""#).unwrap();
        assert_eq!(exact, BucketKeyScheme::Exact);
    }
}
