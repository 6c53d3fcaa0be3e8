//! Candidate probability of the banding scheme.
//!
//! Two entities with Jaccard similarity `s` share at least one of `b` buckets
//! of `r` rows with probability `1 - (1 - s^r)^b`. Plotted against `s` this is
//! an S-curve whose midpoint sits near `(1/b)^(1/r)`.

use serde::Serialize;

use crate::{BandLayout, BucketError};

/// Probability that two entities of similarity `s` become candidates when
/// signatures of length `n` are cut into `b` bands of `n / b` rows.
pub fn collision_probability(s: f64, n: usize, b: usize) -> Result<f64, BucketError> {
    if !(0.0..=1.0).contains(&s) {
        return Err(BucketError::InvalidParameter(format!(
            "similarity must be within [0, 1] (got {s})"
        )));
    }
    let r = rows_for(n, b)?;
    Ok(1.0 - (1.0 - s.powi(r as i32)).powi(b as i32))
}

fn rows_for(n: usize, b: usize) -> Result<usize, BucketError> {
    if b == 0 {
        return Err(BucketError::InvalidParameter(
            "number of bands must be >= 1 (got 0)".to_string(),
        ));
    }
    if b > n {
        return Err(BucketError::InvalidParameter(format!(
            "number of bands ({b}) exceeds signature length ({n})"
        )));
    }
    if n > i32::MAX as usize {
        return Err(BucketError::InvalidParameter(format!(
            "signature length {n} is too large"
        )));
    }
    Ok(n / b)
}

/// Similarity at which the candidate probability rises most steeply.
pub fn threshold(num_bands: usize, rows_per_band: usize) -> f64 {
    (1.0 / num_bands as f64).powf(1.0 / rows_per_band as f64)
}

/// One S-curve, sampled at evenly spaced similarities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveSeries {
    pub num_bands: usize,
    pub rows_per_band: usize,
    /// `(similarity, probability)` from `0.0` to `1.0` inclusive.
    pub points: Vec<(f64, f64)>,
}

impl CurveSeries {
    /// `b = 20, r = 5`
    pub fn label(&self) -> String {
        format!("b = {}, r = {}", self.num_bands, self.rows_per_band)
    }
}

/// Sample the curve of every band count in `band_values` for signatures of
/// length `n`, at `steps` similarities (at least two).
pub fn probability_curve(
    n: usize,
    band_values: &[usize],
    steps: usize,
) -> Result<Vec<CurveSeries>, BucketError> {
    if steps < 2 {
        return Err(BucketError::InvalidParameter(format!(
            "steps must be >= 2 (got {steps})"
        )));
    }
    band_values
        .iter()
        .map(|&b| {
            let r = rows_for(n, b)?;
            let points = (0..steps)
                .map(|i| {
                    let s = i as f64 / (steps - 1) as f64;
                    collision_probability(s, n, b).map(|p| (s, p))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CurveSeries {
                num_bands: b,
                rows_per_band: r,
                points,
            })
        })
        .collect()
}

/// The exact-divisor layout of `n` whose [`threshold`] is closest to `target`.
///
/// Ties keep the layout with fewer bands.
pub fn plan_layout(n: usize, target: f64) -> Result<BandLayout, BucketError> {
    if n == 0 {
        return Err(BucketError::InvalidParameter(
            "signature length must be >= 1 (got 0)".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&target) {
        return Err(BucketError::InvalidParameter(format!(
            "target threshold must be within [0, 1] (got {target})"
        )));
    }

    let mut best = (1, n);
    let mut best_diff = f64::MAX;
    for b in (1..=n).filter(|b| n % b == 0) {
        let r = n / b;
        let diff = (threshold(b, r) - target).abs();
        if diff < best_diff {
            best = (b, r);
            best_diff = diff;
        }
    }
    BandLayout::new(best.0, best.1)
}
