//! Jaccard similarity: estimated from signatures, exact from item sets.

use std::collections::HashSet;

use ndarray::Array2;
use rayon::prelude::*;

use crate::config::MinHashError;
use crate::signature::{EntityId, ItemSet, SignatureStore};

/// Fraction of positions where two signatures agree.
///
/// This is an unbiased estimator of the Jaccard similarity of the underlying
/// sets when both signatures come from the same hash family.
pub fn estimate_jaccard(a: &[u64], b: &[u64]) -> Result<f64, MinHashError> {
    if a.len() != b.len() {
        return Err(MinHashError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(MinHashError::UndefinedSimilarity);
    }
    let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
    Ok(matches as f64 / a.len() as f64)
}

/// `|A ∩ B| / |A ∪ B|`. Undefined when both sets are empty.
pub fn exact_jaccard<A, B>(a: &A, b: &B) -> Result<f64, MinHashError>
where
    A: ItemSet + ?Sized,
    B: ItemSet + ?Sized,
{
    let a: HashSet<u64> = a.items().collect();
    let b: HashSet<u64> = b.items().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return Err(MinHashError::UndefinedSimilarity);
    }
    let intersection = a.intersection(&b).count();
    Ok(intersection as f64 / union as f64)
}

/// Pairwise estimated similarities of every entity in a store.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    ids: Vec<EntityId>,
    values: Array2<f64>,
}

impl SimilarityMatrix {
    /// Compute all pairs; rows are filled in parallel when `use_parallel`.
    ///
    /// Quadratic in the number of entities: meant for samples and ground-truth
    /// checks, not for whole datasets. Zero-length signatures are
    /// `UndefinedSimilarity`.
    pub fn from_store(store: &SignatureStore, use_parallel: bool) -> Result<Self, MinHashError> {
        if store.signature_len()? == Some(0) {
            return Err(MinHashError::UndefinedSimilarity);
        }
        let ids: Vec<EntityId> = store.entity_ids().collect();
        let sigs: Vec<&[u64]> = store.iter().map(|(_, s)| s.values()).collect();
        let n = ids.len();

        let row = |i: usize| -> Result<Vec<f64>, MinHashError> {
            (0..n)
                .map(|j| {
                    if i == j {
                        Ok(1.0)
                    } else {
                        estimate_jaccard(sigs[i], sigs[j])
                    }
                })
                .collect()
        };
        let rows: Vec<Vec<f64>> = if use_parallel {
            (0..n).into_par_iter().map(row).collect::<Result<_, _>>()?
        } else {
            (0..n).map(row).collect::<Result<_, _>>()?
        };

        let mut values = Array2::zeros((n, n));
        for (i, r) in rows.into_iter().enumerate() {
            for (j, v) in r.into_iter().enumerate() {
                values[[i, j]] = v;
            }
        }
        Ok(Self { ids, values })
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    fn position(&self, entity: EntityId) -> Option<usize> {
        self.ids.binary_search(&entity).ok()
    }

    /// Estimated similarity of two entities, if both are present.
    pub fn get(&self, a: EntityId, b: EntityId) -> Option<f64> {
        Some(self.values[[self.position(a)?, self.position(b)?]])
    }

    /// The `top_n` other entities most similar to `entity`, best first, ties
    /// broken by ascending id.
    pub fn most_similar(&self, entity: EntityId, top_n: usize) -> Vec<(EntityId, f64)> {
        let Some(i) = self.position(entity) else {
            return Vec::new();
        };
        let mut scored: Vec<(EntityId, f64)> = self
            .ids
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(j, &id)| (id, self.values[[i, j]]))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_n);
        scored
    }
}
