//! Workspace umbrella crate for SimLSH.
//!
//! This crate stitches the MinHash signature stage and the banded bucket
//! index together so callers can go from per-entity item sets to ranked
//! similar entities with a handful of calls:
//!
//! ```
//! use std::collections::BTreeSet;
//! use simlsh::{build_index, find_similar, generate_signatures, BucketConfig, MinHashConfig};
//!
//! let sets: Vec<(u64, BTreeSet<u64>)> = vec![
//!     (1, (1..=40).collect()),
//!     (2, (2..=41).collect()),
//!     (3, (500..=540).collect()),
//! ];
//! let minhash_cfg = MinHashConfig::default().with_seed(42);
//! let (_engine, store) =
//!     generate_signatures(sets.iter().map(|(id, s)| (*id, s)), &minhash_cfg).unwrap();
//!
//! let index = build_index(&store, &BucketConfig::default()).unwrap();
//! let similar = find_similar(&index, 1, 0.5, 10).unwrap();
//! assert_eq!(similar.first().map(|c| c.entity), Some(2));
//! ```

pub mod config;
pub mod recommend;
pub mod report;

pub use bucket::{
    collision_probability, plan_layout, probability_curve, threshold, BandLayout,
    BandedBucketIndex, BucketConfig, BucketError, BucketKey, BucketKeyScheme, BucketStats,
    BucketView, CandidateSet, CurveSeries,
};
pub use minhash::{
    estimate_jaccard, exact_jaccard, next_prime, CharacteristicMatrixBuilder, DenseMembership,
    EmptySetPolicy, EntityId, HashFamily, HashKind, ItemId, ItemSet, MembershipMatrix,
    MinHashConfig, MinHashError, Signature, SignatureEngine, SignatureStore, SimilarityMatrix,
    SparseMembership,
};

pub use crate::config::{
    BucketYamlConfig, ConfigLoadError, MinHashYamlConfig, SimLshConfig, ValidationYamlConfig,
};
pub use crate::recommend::{recommend_items, RecommendedItem};
pub use crate::report::{validate_estimates, PairEstimate, ValidationConfig, ValidationReport};

use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Errors that can occur while running the signature and index stages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("signature stage failed: {0}")]
    MinHash(#[from] MinHashError),
    #[error("index stage failed: {0}")]
    Bucket(#[from] BucketError),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_signatures(&self, latency: Duration, result: Result<(), MinHashError>);
    fn record_index(&self, latency: Duration, result: Result<(), BucketError>);
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    fn record_signatures(self, result: Result<(), MinHashError>) {
        self.recorder
            .record_signatures(self.start.elapsed(), result);
    }

    fn record_index(self, result: Result<(), BucketError>) {
        self.recorder.record_index(self.start.elapsed(), result);
    }
}

/// Draw a hash family from `cfg` and compute the signature of every entity.
///
/// The engine is returned alongside the store so later probes are hashed
/// with the same family.
pub fn generate_signatures<'a, S, I>(
    item_sets: I,
    cfg: &MinHashConfig,
) -> Result<(SignatureEngine, SignatureStore), PipelineError>
where
    S: ItemSet + Sync + ?Sized + 'a,
    I: IntoIterator<Item = (EntityId, &'a S)>,
{
    let span = MetricsSpan::start();
    let result =
        SignatureEngine::from_config(cfg).and_then(|engine| {
            let store = engine.compute_store(item_sets)?;
            Ok((engine, store))
        });
    if let Some(span) = span {
        span.record_signatures(result.as_ref().map(|_| ()).map_err(Clone::clone));
    }
    let (engine, store) = result?;
    info!(
        entities = store.len(),
        hash_functions = engine.signature_len(),
        kind = %engine.family().kind(),
        "generated signatures"
    );
    Ok((engine, store))
}

/// Band every signature of `store` into a fresh index described by `cfg`.
pub fn build_index(
    store: &SignatureStore,
    cfg: &BucketConfig,
) -> Result<BandedBucketIndex, PipelineError> {
    let span = MetricsSpan::start();
    let result = BandedBucketIndex::from_config(cfg).and_then(|mut index| {
        index.build_with_config(store, cfg)?;
        Ok(index)
    });
    if let Some(span) = span {
        span.record_index(result.as_ref().map(|_| ()).map_err(Clone::clone));
    }
    Ok(result?)
}

/// An LSH candidate with its estimated similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub entity: EntityId,
    pub similarity: f64,
}

/// Candidates of `entity`, scored by estimated Jaccard similarity.
///
/// Results below `min_similarity` are dropped; the rest are ordered by
/// similarity descending, then entity id ascending, and cut to `top_k`.
pub fn find_similar(
    index: &BandedBucketIndex,
    entity: EntityId,
    min_similarity: f64,
    top_k: usize,
) -> Result<Vec<ScoredCandidate>, PipelineError> {
    let signature = index
        .signatures()
        .get(entity)
        .ok_or(BucketError::UnknownEntity(entity))?;
    let candidates = index.query(signature, Some(entity))?;
    rank_candidates(index, signature, candidates, min_similarity, top_k)
}

/// [`find_similar`] for a signature that is not part of the index.
pub fn find_similar_to(
    index: &BandedBucketIndex,
    signature: &Signature,
    min_similarity: f64,
    top_k: usize,
) -> Result<Vec<ScoredCandidate>, PipelineError> {
    let candidates = index.query(signature, None)?;
    rank_candidates(index, signature, candidates, min_similarity, top_k)
}

fn rank_candidates(
    index: &BandedBucketIndex,
    signature: &Signature,
    candidates: CandidateSet,
    min_similarity: f64,
    top_k: usize,
) -> Result<Vec<ScoredCandidate>, PipelineError> {
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(PipelineError::InvalidParameter(format!(
            "min_similarity must be within [0, 1] (got {min_similarity})"
        )));
    }
    let mut scored = Vec::with_capacity(candidates.len());
    for entity in candidates {
        let Some(other) = index.signatures().get(entity) else {
            continue;
        };
        let similarity = estimate_jaccard(signature.values(), other.values())?;
        if similarity >= min_similarity {
            scored.push(ScoredCandidate { entity, similarity });
        }
    }
    scored.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then(a.entity.cmp(&b.entity))
    });
    scored.truncate(top_k);
    Ok(scored)
}
