//! # SimLSH Bucket Index
//!
//! This crate provides the locality-sensitive hashing stage of SimLSH: MinHash
//! signatures are cut into contiguous bands, every band slice is turned into
//! a [`BucketKey`], and entities sharing a key land in the same bucket.
//! Entities that agree with a query in at least one band become its
//! similarity candidates, so a search costs a handful of bucket lookups
//! instead of a scan over every pair.
//!
//! ## Core Features
//!
//! - **Atomic rebuilds**: [`BandedBucketIndex::build`] validates the band
//!   layout against every signature, builds the new bucket map off to the
//!   side, and only then replaces the previous one. A failed build leaves the
//!   prior index untouched.
//! - **Deterministic output**: entities are processed in ascending id order,
//!   so every bucket lists its entities in the same order whether bands are
//!   built sequentially or in parallel with Rayon.
//! - **Configurable keys**: the [`BucketKeyScheme::Folded`] scheme reduces a
//!   band into a bounded code space (`LSH-NNNNNN`), accepting occasional
//!   within-band collisions as extra false positives;
//!   [`BucketKeyScheme::Exact`] keys on the slice itself.
//! - **Planning**: [`collision_probability`] and [`plan_layout`] describe how
//!   the band/row split shapes the candidate S-curve.
//!
//! ## Example Usage
//!
//! ```
//! use bucket::{BandedBucketIndex, BucketKeyScheme};
//! use minhash::{Signature, SignatureStore};
//!
//! let mut store = SignatureStore::new();
//! store.insert(1, Signature::new(vec![1, 2, 3, 4]));
//! store.insert(2, Signature::new(vec![1, 2, 9, 9]));
//! store.insert(3, Signature::new(vec![7, 7, 7, 7]));
//!
//! let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
//! index.build(&store, 2, 2).unwrap();
//!
//! let candidates = index.query_by_entity_id(1).unwrap();
//! assert_eq!(candidates.into_iter().collect::<Vec<_>>(), vec![2]);
//! ```

mod key;
mod probability;
mod query;

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;

use hashbrown::HashMap;
use minhash::{EntityId, SignatureStore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use key::{fold_band, BucketKey, BucketKeyScheme, DEFAULT_CODE_SPACE, FOLD_MODULUS};
pub use probability::{
    collision_probability, plan_layout, probability_curve, threshold, CurveSeries,
};

/// Candidate entities returned by a query, ascending.
pub type CandidateSet = BTreeSet<EntityId>;

/// Errors returned by the bucket layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BucketError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error(
        "band layout {num_bands}x{rows_per_band} does not cover a signature of length {signature_len}{}",
        entity.map(|e| format!(" (entity {e})")).unwrap_or_default()
    )]
    BandLayoutMismatch {
        entity: Option<EntityId>,
        signature_len: usize,
        num_bands: usize,
        rows_per_band: usize,
    },
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
}

/// How signatures are cut into bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BandLayout {
    num_bands: usize,
    rows_per_band: usize,
}

impl BandLayout {
    /// Both dimensions must be at least one.
    pub fn new(num_bands: usize, rows_per_band: usize) -> Result<Self, BucketError> {
        if num_bands == 0 {
            return Err(BucketError::InvalidParameter(
                "num_bands must be >= 1 (got 0)".to_string(),
            ));
        }
        if rows_per_band == 0 {
            return Err(BucketError::InvalidParameter(
                "rows_per_band must be >= 1 (got 0)".to_string(),
            ));
        }
        if num_bands.checked_mul(rows_per_band).is_none() {
            return Err(BucketError::InvalidParameter(format!(
                "band layout {num_bands}x{rows_per_band} overflows"
            )));
        }
        Ok(Self {
            num_bands,
            rows_per_band,
        })
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn rows_per_band(&self) -> usize {
        self.rows_per_band
    }

    /// Signature length this layout covers exactly.
    pub fn signature_len(&self) -> usize {
        self.num_bands * self.rows_per_band
    }

    /// Signature positions of `band`.
    pub fn band_range(&self, band: usize) -> Range<usize> {
        let start = band * self.rows_per_band;
        start..start + self.rows_per_band
    }

    fn check(&self, entity: Option<EntityId>, signature_len: usize) -> Result<(), BucketError> {
        if signature_len == self.signature_len() {
            Ok(())
        } else {
            Err(BucketError::BandLayoutMismatch {
                entity,
                signature_len,
                num_bands: self.num_bands,
                rows_per_band: self.rows_per_band,
            })
        }
    }
}

impl fmt::Display for BandLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b={}, r={}", self.num_bands, self.rows_per_band)
    }
}

/// Runtime configuration of the bucket stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Number of bands per signature.
    pub num_bands: usize,
    /// Rows per band. `None` derives `signature_len / num_bands`; when that
    /// does not divide evenly the build fails instead of truncating.
    pub rows_per_band: Option<usize>,
    /// Bucket key derivation.
    pub scheme: BucketKeyScheme,
    /// Build bands in parallel with Rayon.
    pub use_parallel: bool,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            num_bands: 20,
            rows_per_band: None,
            scheme: BucketKeyScheme::default(),
            use_parallel: false,
        }
    }
}

impl BucketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bands(mut self, num_bands: usize) -> Self {
        self.num_bands = num_bands;
        self
    }

    pub fn with_rows_per_band(mut self, rows: usize) -> Self {
        self.rows_per_band = Some(rows);
        self
    }

    pub fn with_scheme(mut self, scheme: BucketKeyScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Rows per band to use for signatures of `signature_len`.
    pub fn rows_for(&self, signature_len: usize) -> usize {
        self.rows_per_band
            .unwrap_or_else(|| signature_len / self.num_bands.max(1))
    }

    pub fn validate(&self) -> Result<(), BucketError> {
        if self.num_bands == 0 {
            return Err(BucketError::InvalidParameter(
                "num_bands must be >= 1 (got 0)".to_string(),
            ));
        }
        if self.rows_per_band == Some(0) {
            return Err(BucketError::InvalidParameter(
                "rows_per_band must be >= 1 (got 0)".to_string(),
            ));
        }
        if let BucketKeyScheme::Folded { code_space: 0 } = self.scheme {
            return Err(BucketError::InvalidParameter(
                "code_space must be >= 1 (got 0)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read-only view of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketView<'a> {
    pub key: &'a BucketKey,
    pub entities: &'a [EntityId],
}

impl fmt::Display for BucketView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bucket {} (band {}): {:?}", self.key, self.key.band(), self.entities)
    }
}

/// Summary figures of a built index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BucketStats {
    pub entities: usize,
    pub buckets: usize,
    pub collision_buckets: usize,
    pub largest_bucket: usize,
    pub mean_bucket_size: f64,
}

/// LSH index mapping band keys to the entities that produced them.
#[derive(Debug, Clone, Default)]
pub struct BandedBucketIndex {
    scheme: BucketKeyScheme,
    use_parallel: bool,
    layout: Option<BandLayout>,
    buckets: HashMap<BucketKey, Vec<EntityId>>,
    signatures: SignatureStore,
}

impl BandedBucketIndex {
    /// Empty, sequential index using `scheme`.
    pub fn new(scheme: BucketKeyScheme) -> Self {
        Self {
            scheme,
            ..Self::default()
        }
    }

    /// Empty index honoring the scheme and parallelism of `cfg`.
    pub fn from_config(cfg: &BucketConfig) -> Result<Self, BucketError> {
        cfg.validate()?;
        Ok(Self::new(cfg.scheme).with_parallel(cfg.use_parallel))
    }

    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    pub fn scheme(&self) -> BucketKeyScheme {
        self.scheme
    }

    /// Layout of the last successful build.
    pub fn layout(&self) -> Option<BandLayout> {
        self.layout
    }

    /// Replace the whole index with buckets built from `store`.
    ///
    /// Every signature must have exactly `num_bands * rows_per_band` values.
    /// On error nothing changes.
    pub fn build(
        &mut self,
        store: &SignatureStore,
        num_bands: usize,
        rows_per_band: usize,
    ) -> Result<(), BucketError> {
        let layout = BandLayout::new(num_bands, rows_per_band)?;
        self.build_with_layout(store, layout)
    }

    /// [`Self::build`] with rows per band resolved from `cfg` and the store's
    /// signature length.
    pub fn build_with_config(
        &mut self,
        store: &SignatureStore,
        cfg: &BucketConfig,
    ) -> Result<(), BucketError> {
        cfg.validate()?;
        let signature_len = store.iter().next().map_or(0, |(_, s)| s.len());
        let rows = cfg.rows_for(signature_len);
        if rows == 0 {
            return Err(BucketError::BandLayoutMismatch {
                entity: None,
                signature_len,
                num_bands: cfg.num_bands,
                rows_per_band: rows,
            });
        }
        self.build(store, cfg.num_bands, rows)
    }

    pub fn build_with_layout(
        &mut self,
        store: &SignatureStore,
        layout: BandLayout,
    ) -> Result<(), BucketError> {
        for (&id, signature) in store {
            layout.check(Some(id), signature.len())?;
        }

        let buckets = if self.use_parallel {
            let per_band: Vec<HashMap<BucketKey, Vec<EntityId>>> = (0..layout.num_bands())
                .into_par_iter()
                .map(|band| self.band_buckets(store, layout, band))
                .collect();
            // The band index is part of every key, so the maps are disjoint.
            let mut merged = HashMap::with_capacity(per_band.iter().map(HashMap::len).sum());
            for map in per_band {
                merged.extend(map);
            }
            merged
        } else {
            let mut buckets: HashMap<BucketKey, Vec<EntityId>> = HashMap::new();
            for (&id, signature) in store {
                for band in 0..layout.num_bands() {
                    let key = self
                        .scheme
                        .key(band, &signature.values()[layout.band_range(band)]);
                    buckets.entry(key).or_default().push(id);
                }
            }
            buckets
        };

        debug!(
            entities = store.len(),
            bands = layout.num_bands(),
            rows_per_band = layout.rows_per_band(),
            buckets = buckets.len(),
            "built bucket index"
        );

        self.buckets = buckets;
        self.layout = Some(layout);
        self.signatures = store.clone();
        Ok(())
    }

    fn band_buckets(
        &self,
        store: &SignatureStore,
        layout: BandLayout,
        band: usize,
    ) -> HashMap<BucketKey, Vec<EntityId>> {
        let mut buckets: HashMap<BucketKey, Vec<EntityId>> = HashMap::new();
        let range = layout.band_range(band);
        for (&id, signature) in store {
            let key = self.scheme.key(band, &signature.values()[range.clone()]);
            buckets.entry(key).or_default().push(id);
        }
        buckets
    }

    /// Number of distinct buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of indexed entities.
    pub fn entity_count(&self) -> usize {
        self.signatures.len()
    }

    /// Signatures of the last successful build.
    pub fn signatures(&self) -> &SignatureStore {
        &self.signatures
    }

    /// Entities of one bucket, in processing order.
    pub fn bucket(&self, key: &BucketKey) -> Option<&[EntityId]> {
        self.buckets.get(key).map(Vec::as_slice)
    }

    /// Every bucket, in unspecified order.
    pub fn buckets(&self) -> impl Iterator<Item = BucketView<'_>> {
        self.buckets.iter().map(|(key, entities)| BucketView {
            key,
            entities: entities.as_slice(),
        })
    }

    /// Keys under which `entity` was filed, ordered by band.
    pub fn keys_of(&self, entity: EntityId) -> Result<Vec<BucketKey>, BucketError> {
        let signature = self
            .signatures
            .get(entity)
            .ok_or(BucketError::UnknownEntity(entity))?;
        let Some(layout) = self.layout else {
            return Ok(Vec::new());
        };
        Ok((0..layout.num_bands())
            .map(|band| self.scheme.key(band, &signature.values()[layout.band_range(band)]))
            .collect())
    }

    /// Buckets holding more than one entity, sorted by key.
    pub fn collision_buckets(&self) -> Vec<BucketView<'_>> {
        let mut views: Vec<BucketView<'_>> =
            self.buckets().filter(|v| v.entities.len() > 1).collect();
        views.sort_by(|a, b| a.key.cmp(b.key));
        views
    }

    /// Up to `n` buckets chosen pseudo-randomly from `seed`, sorted by key.
    pub fn sample_buckets(&self, n: usize, seed: u64) -> Vec<BucketView<'_>> {
        let mut keys: Vec<&BucketKey> = self.buckets.keys().collect();
        keys.sort();
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut chosen = rng.choose_multiple(keys, n);
        chosen.sort();
        chosen
            .into_iter()
            .filter_map(|key| {
                self.buckets.get_key_value(key).map(|(key, entities)| BucketView {
                    key,
                    entities: entities.as_slice(),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> BucketStats {
        let sizes = self.buckets.values().map(Vec::len);
        let total: usize = sizes.clone().sum();
        BucketStats {
            entities: self.entity_count(),
            buckets: self.buckets.len(),
            collision_buckets: sizes.clone().filter(|&s| s > 1).count(),
            largest_bucket: sizes.max().unwrap_or(0),
            mean_bucket_size: if self.buckets.is_empty() {
                0.0
            } else {
                total as f64 / self.buckets.len() as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minhash::Signature;

    fn sig(values: &[u64]) -> Signature {
        Signature::new(values.to_vec())
    }

    fn store(entries: &[(EntityId, &[u64])]) -> SignatureStore {
        entries.iter().map(|(id, v)| (*id, sig(v))).collect()
    }

    #[test]
    fn layout_rejects_zero_dimensions() {
        assert!(matches!(
            BandLayout::new(0, 5),
            Err(BucketError::InvalidParameter(_))
        ));
        assert!(matches!(
            BandLayout::new(5, 0),
            Err(BucketError::InvalidParameter(_))
        ));
    }

    #[test]
    fn layout_band_ranges_are_contiguous() {
        let layout = BandLayout::new(4, 3).unwrap();
        assert_eq!(layout.signature_len(), 12);
        assert_eq!(layout.band_range(0), 0..3);
        assert_eq!(layout.band_range(3), 9..12);
        assert_eq!(layout.to_string(), "b=4, r=3");
    }

    #[test]
    fn build_places_duplicate_entity_in_every_band_bucket() {
        let values: Vec<u64> = (0..100).map(|v| v * 7 + 3).collect();
        let s = store(&[(1, &values), (2, &values)]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::default());
        index.build(&s, 20, 5).unwrap();

        let keys_1 = index.keys_of(1).unwrap();
        let keys_2 = index.keys_of(2).unwrap();
        assert_eq!(keys_1.len(), 20);
        assert_eq!(keys_1, keys_2);
        for key in &keys_1 {
            assert_eq!(index.bucket(key), Some(&[1, 2][..]));
        }
    }

    #[test]
    fn build_rejects_non_dividing_layout() {
        let values: Vec<u64> = (0..100).collect();
        let s = store(&[(1, &values)]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::default());
        let err = index.build(&s, 7, 100 / 7).unwrap_err();
        assert_eq!(
            err,
            BucketError::BandLayoutMismatch {
                entity: Some(1),
                signature_len: 100,
                num_bands: 7,
                rows_per_band: 14,
            }
        );
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn build_with_config_rejects_non_dividing_bands() {
        let values: Vec<u64> = (0..100).collect();
        let s = store(&[(1, &values)]);
        let mut index = BandedBucketIndex::default();
        let cfg = BucketConfig::default().with_bands(7);
        assert!(matches!(
            index.build_with_config(&s, &cfg),
            Err(BucketError::BandLayoutMismatch { .. })
        ));

        let cfg = BucketConfig::default().with_bands(20);
        index.build_with_config(&s, &cfg).unwrap();
        assert_eq!(index.layout(), Some(BandLayout::new(20, 5).unwrap()));
    }

    #[test]
    fn build_rejects_inconsistent_store() {
        let s = store(&[(1, &[1, 2, 3, 4]), (2, &[1, 2, 3])]);
        let mut index = BandedBucketIndex::default();
        let err = index.build(&s, 2, 2).unwrap_err();
        assert!(matches!(
            err,
            BucketError::BandLayoutMismatch {
                entity: Some(2),
                signature_len: 3,
                ..
            }
        ));
    }

    #[test]
    fn failed_build_keeps_previous_index() {
        let good = store(&[(1, &[1, 2, 3, 4]), (2, &[1, 2, 5, 6])]);
        let bad = store(&[(9, &[1, 2, 3])]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
        index.build(&good, 2, 2).unwrap();
        let before = index.bucket_count();

        assert!(index.build(&bad, 2, 2).is_err());
        assert_eq!(index.bucket_count(), before);
        assert_eq!(index.entity_count(), 2);
        assert_eq!(index.layout(), Some(BandLayout::new(2, 2).unwrap()));
    }

    #[test]
    fn rebuild_discards_old_buckets() {
        let first = store(&[(1, &[1, 2, 3, 4]), (2, &[1, 2, 5, 6])]);
        let second = store(&[(3, &[9, 9, 9, 9])]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
        index.build(&first, 2, 2).unwrap();
        index.build(&second, 4, 1).unwrap();

        assert_eq!(index.entity_count(), 1);
        assert_eq!(index.bucket_count(), 4);
        assert!(index.buckets().all(|v| v.entities == [3]));
    }

    #[test]
    fn parallel_build_equals_sequential() {
        let entries: Vec<(EntityId, Vec<u64>)> = (0..300u64)
            .map(|id| (id, (0..24).map(|i| (id * 31 + i) % 11).collect()))
            .collect();
        let s: SignatureStore = entries
            .iter()
            .map(|(id, v)| (*id, Signature::new(v.clone())))
            .collect();

        for scheme in [BucketKeyScheme::default(), BucketKeyScheme::Exact] {
            let mut seq = BandedBucketIndex::new(scheme);
            let mut par = BandedBucketIndex::new(scheme).with_parallel(true);
            seq.build(&s, 8, 3).unwrap();
            par.build(&s, 8, 3).unwrap();

            assert_eq!(seq.bucket_count(), par.bucket_count());
            for view in seq.buckets() {
                assert_eq!(par.bucket(view.key), Some(view.entities));
            }
        }
    }

    #[test]
    fn bucket_entities_follow_ascending_id() {
        let s = store(&[(30, &[1, 1]), (10, &[1, 1]), (20, &[1, 1])]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
        index.build(&s, 1, 2).unwrap();
        let views: Vec<_> = index.buckets().collect();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].entities, [10, 20, 30]);
    }

    #[test]
    fn collision_buckets_and_stats() {
        let s = store(&[(1, &[1, 2, 3, 4]), (2, &[1, 2, 5, 6]), (3, &[7, 8, 9, 10])]);
        let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
        index.build(&s, 2, 2).unwrap();

        let collisions = index.collision_buckets();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].entities, [1, 2]);

        let stats = index.stats();
        assert_eq!(stats.entities, 3);
        assert_eq!(stats.buckets, 5);
        assert_eq!(stats.collision_buckets, 1);
        assert_eq!(stats.largest_bucket, 2);
        assert!((stats.mean_bucket_size - 6.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn sample_buckets_is_seeded_and_bounded() {
        let entries: Vec<(EntityId, Vec<u64>)> =
            (0..50u64).map(|id| (id, vec![id, id + 1])).collect();
        let s: SignatureStore = entries
            .iter()
            .map(|(id, v)| (*id, Signature::new(v.clone())))
            .collect();
        let mut index = BandedBucketIndex::new(BucketKeyScheme::default());
        index.build(&s, 2, 1).unwrap();

        let a: Vec<String> = index.sample_buckets(5, 11).iter().map(|v| v.to_string()).collect();
        let b: Vec<String> = index.sample_buckets(5, 11).iter().map(|v| v.to_string()).collect();
        assert_eq!(a.len(), 5);
        assert_eq!(a, b);
        assert_eq!(index.sample_buckets(10_000, 1).len(), index.bucket_count());
    }

    #[test]
    fn keys_of_unknown_entity_fails() {
        let index = BandedBucketIndex::default();
        assert_eq!(index.keys_of(4), Err(BucketError::UnknownEntity(4)));
    }

    #[test]
    fn config_validation() {
        assert!(BucketConfig::default().validate().is_ok());
        assert!(BucketConfig::default().with_bands(0).validate().is_err());
        assert!(BucketConfig::default()
            .with_rows_per_band(0)
            .validate()
            .is_err());
        assert!(BucketConfig::default()
            .with_scheme(BucketKeyScheme::Folded { code_space: 0 })
            .validate()
            .is_err());
        assert_eq!(BucketConfig::default().rows_for(100), 5);
        assert_eq!(BucketConfig::default().with_rows_per_band(4).rows_for(100), 4);
    }

    #[test]
    fn layout_mismatch_message_names_entity() {
        let err = BucketError::BandLayoutMismatch {
            entity: Some(8),
            signature_len: 100,
            num_bands: 7,
            rows_per_band: 14,
        };
        assert_eq!(
            err.to_string(),
            "band layout 7x14 does not cover a signature of length 100 (entity 8)"
        );
    }
}
