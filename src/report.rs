//! Ground-truth check of MinHash estimates.
//!
//! A seeded sample of entities is compared pairwise. Pairs whose estimated
//! similarity exceeds the threshold are re-scored with exact Jaccard on the
//! original item sets, and the absolute difference is reported as the loss.

use std::collections::BTreeMap;

use minhash::{estimate_jaccard, exact_jaccard, EntityId, ItemSet, SignatureStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Entities drawn from the store; all of them when the store is smaller.
    pub sample_size: usize,
    /// Pairs strictly above this estimate are checked against exact Jaccard.
    pub similarity_threshold: f64,
    /// Pairs kept in [`ValidationReport::top_pairs`].
    pub max_results: usize,
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            similarity_threshold: 0.6,
            max_results: 10,
            seed: 213_242,
        }
    }
}

/// One checked pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairEstimate {
    pub left: EntityId,
    pub right: EntityId,
    pub estimated: f64,
    pub exact: f64,
    pub loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub sampled_entities: usize,
    pub compared_pairs: usize,
    /// Pairs above the threshold.
    pub similar_pairs: usize,
    pub dissimilar_pairs: usize,
    /// Mean loss over similar pairs, `None` when there were none.
    pub mean_loss: Option<f64>,
    /// Highest estimates first, ties by pair.
    pub top_pairs: Vec<PairEstimate>,
}

/// Compare estimates against exact Jaccard for a seeded sample of `store`.
///
/// `item_sets` must hold the original set of every sampled entity.
pub fn validate_estimates<S>(
    store: &SignatureStore,
    item_sets: &BTreeMap<EntityId, S>,
    cfg: &ValidationConfig,
) -> Result<ValidationReport, PipelineError>
where
    S: ItemSet,
{
    if !(0.0..=1.0).contains(&cfg.similarity_threshold) {
        return Err(PipelineError::InvalidParameter(format!(
            "similarity_threshold must be within [0, 1] (got {})",
            cfg.similarity_threshold
        )));
    }

    let ids: Vec<EntityId> = store.entity_ids().collect();
    let mut rng = fastrand::Rng::with_seed(cfg.seed);
    let mut sample = if cfg.sample_size >= ids.len() {
        ids
    } else {
        rng.choose_multiple(ids, cfg.sample_size)
    };
    sample.sort_unstable();

    let mut compared = 0usize;
    let mut checked = Vec::new();
    for (i, &left) in sample.iter().enumerate() {
        for &right in &sample[i + 1..] {
            compared += 1;
            let (Some(a), Some(b)) = (store.get(left), store.get(right)) else {
                continue;
            };
            let estimated = estimate_jaccard(a.values(), b.values())?;
            if estimated <= cfg.similarity_threshold {
                continue;
            }
            let exact = exact_jaccard(lookup(item_sets, left)?, lookup(item_sets, right)?)?;
            checked.push(PairEstimate {
                left,
                right,
                estimated,
                exact,
                loss: (estimated - exact).abs(),
            });
        }
    }

    let similar = checked.len();
    let mean_loss = if checked.is_empty() {
        None
    } else {
        Some(checked.iter().map(|p| p.loss).sum::<f64>() / similar as f64)
    };
    checked.sort_by(|a, b| {
        b.estimated
            .total_cmp(&a.estimated)
            .then((a.left, a.right).cmp(&(b.left, b.right)))
    });
    checked.truncate(cfg.max_results);

    debug!(
        sampled = sample.len(),
        compared,
        similar,
        mean_loss = mean_loss.unwrap_or(0.0),
        "validated estimates"
    );

    Ok(ValidationReport {
        sampled_entities: sample.len(),
        compared_pairs: compared,
        similar_pairs: similar,
        dissimilar_pairs: compared - similar,
        mean_loss,
        top_pairs: checked,
    })
}

fn lookup<S>(item_sets: &BTreeMap<EntityId, S>, entity: EntityId) -> Result<&S, PipelineError> {
    item_sets.get(&entity).ok_or_else(|| {
        PipelineError::InvalidParameter(format!("no item set for entity {entity}"))
    })
}
