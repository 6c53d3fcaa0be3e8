use std::collections::BTreeSet;

use minhash::{EntityId, Signature};

use crate::{BandedBucketIndex, BucketError, CandidateSet};

impl BandedBucketIndex {
    /// Entities sharing at least one band bucket with `signature`.
    ///
    /// `excluding` is removed from the result. Before the first successful
    /// build every query returns an empty set.
    pub fn query(
        &self,
        signature: &Signature,
        excluding: Option<EntityId>,
    ) -> Result<CandidateSet, BucketError> {
        let Some(layout) = self.layout else {
            return Ok(CandidateSet::new());
        };
        layout.check(None, signature.len())?;

        let mut candidates = CandidateSet::new();
        for band in 0..layout.num_bands() {
            let key = self
                .scheme
                .key(band, &signature.values()[layout.band_range(band)]);
            if let Some(entities) = self.buckets.get(&key) {
                candidates.extend(entities.iter().copied());
            }
        }
        if let Some(id) = excluding {
            candidates.remove(&id);
        }
        Ok(candidates)
    }

    /// [`Self::query`] with the stored signature of `entity`, excluding itself.
    pub fn query_by_entity_id(&self, entity: EntityId) -> Result<CandidateSet, BucketError> {
        let signature = self
            .signatures
            .get(entity)
            .ok_or(BucketError::UnknownEntity(entity))?;
        self.query(signature, Some(entity))
    }

    /// Every unordered pair of entities sharing at least one bucket, as
    /// `(lower, higher)`, sorted.
    pub fn candidate_pairs(&self) -> Vec<(EntityId, EntityId)> {
        let mut pairs = BTreeSet::new();
        for entities in self.buckets.values() {
            for (i, &a) in entities.iter().enumerate() {
                for &b in &entities[i + 1..] {
                    if a != b {
                        pairs.insert((a.min(b), a.max(b)));
                    }
                }
            }
        }
        pairs.into_iter().collect()
    }
}
