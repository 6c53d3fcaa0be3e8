//! MinHash signature computation.
//!
//! A signature holds, for every function of a [`HashFamily`], the minimum hash
//! value over the members of one item set. Two signatures from the same family
//! agree at position `i` with probability equal to the Jaccard similarity of
//! their sets.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::BuildHasher;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{EmptySetPolicy, MinHashConfig, MinHashError};
use crate::family::HashFamily;
use crate::matrix::MembershipMatrix;

/// Identifier of an item (e.g. a movie).
pub type ItemId = u64;

/// Identifier of an entity characterized by a set of items (e.g. a user).
pub type EntityId = u64;

/// A set of item identifiers.
///
/// Duplicates yielded by `items` are harmless: MinHash and Jaccard only
/// look at set membership.
pub trait ItemSet {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_;
}

impl<S: BuildHasher> ItemSet for HashSet<ItemId, S> {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().copied()
    }
}

impl ItemSet for BTreeSet<ItemId> {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().copied()
    }
}

impl ItemSet for [ItemId] {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().copied()
    }
}

impl ItemSet for Vec<ItemId> {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().copied()
    }
}

impl<const N: usize> ItemSet for [ItemId; N] {
    fn items(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.iter().copied()
    }
}

/// Fixed-length MinHash signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(Vec<u64>);

impl Signature {
    pub fn new(values: Vec<u64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }
}

impl From<Vec<u64>> for Signature {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

impl AsRef<[u64]> for Signature {
    fn as_ref(&self) -> &[u64] {
        &self.0
    }
}

/// Signatures keyed by entity.
///
/// Iteration is in ascending entity id, which is the processing order every
/// downstream stage relies on for reproducible output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureStore {
    entries: BTreeMap<EntityId, Signature>,
}

impl SignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the signature of `entity`, returning the old one.
    pub fn insert(&mut self, entity: EntityId, signature: Signature) -> Option<Signature> {
        self.entries.insert(entity, signature)
    }

    pub fn get(&self, entity: EntityId) -> Option<&Signature> {
        self.entries.get(&entity)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entries.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, EntityId, Signature> {
        self.entries.iter()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.keys().copied()
    }

    /// Length shared by every signature, `None` for an empty store.
    ///
    /// Returns `LengthMismatch` for the first pair of disagreeing lengths.
    pub fn signature_len(&self) -> Result<Option<usize>, MinHashError> {
        let mut lens = self.entries.values().map(Signature::len);
        let Some(first) = lens.next() else {
            return Ok(None);
        };
        match lens.find(|&len| len != first) {
            Some(other) => Err(MinHashError::LengthMismatch {
                left: first,
                right: other,
            }),
            None => Ok(Some(first)),
        }
    }
}

impl FromIterator<(EntityId, Signature)> for SignatureStore {
    fn from_iter<T: IntoIterator<Item = (EntityId, Signature)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a SignatureStore {
    type Item = (&'a EntityId, &'a Signature);
    type IntoIter = btree_map::Iter<'a, EntityId, Signature>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Computes MinHash signatures with one owned [`HashFamily`].
#[derive(Debug, Clone)]
pub struct SignatureEngine {
    family: HashFamily,
    use_parallel: bool,
    empty_set_policy: EmptySetPolicy,
}

impl SignatureEngine {
    /// Sequential engine that rejects empty sets.
    pub fn new(family: HashFamily) -> Self {
        Self {
            family,
            use_parallel: false,
            empty_set_policy: EmptySetPolicy::Reject,
        }
    }

    /// Build the family and batch options described by `cfg`.
    pub fn from_config(cfg: &MinHashConfig) -> Result<Self, MinHashError> {
        Ok(Self::new(HashFamily::from_config(cfg)?)
            .with_parallel(cfg.use_parallel)
            .with_empty_set_policy(cfg.empty_set_policy))
    }

    pub fn with_parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    pub fn with_empty_set_policy(mut self, policy: EmptySetPolicy) -> Self {
        self.empty_set_policy = policy;
        self
    }

    pub fn family(&self) -> &HashFamily {
        &self.family
    }

    /// Signature length produced by this engine.
    pub fn signature_len(&self) -> usize {
        self.family.len()
    }

    /// Compute the signature of one item set.
    ///
    /// Fails with `EmptySignatureInput` for an empty set and `ItemOutOfRange`
    /// for an item not below the family modulus.
    pub fn compute_signature<S>(&self, set: &S) -> Result<Signature, MinHashError>
    where
        S: ItemSet + ?Sized,
    {
        let prime = self.family.prime();
        let mut mins = vec![u64::MAX; self.family.len()];
        let mut any = false;

        for item in set.items() {
            if item >= prime {
                return Err(MinHashError::ItemOutOfRange { item, prime });
            }
            any = true;
            for (i, slot) in mins.iter_mut().enumerate() {
                let h = self.family.evaluate(item, i);
                if h < *slot {
                    *slot = h;
                }
            }
        }

        if !any {
            return Err(MinHashError::EmptySignatureInput { entity: None });
        }
        Ok(Signature(mins))
    }

    /// Compute signatures for a batch of `(entity, item set)` pairs.
    ///
    /// Entities are processed in ascending id order; the parallel path yields
    /// the same store and, on failure, the same error as the sequential one.
    pub fn compute_store<'a, S, I>(&self, entities: I) -> Result<SignatureStore, MinHashError>
    where
        S: ItemSet + Sync + ?Sized + 'a,
        I: IntoIterator<Item = (EntityId, &'a S)>,
    {
        let mut batch: Vec<(EntityId, &'a S)> = entities.into_iter().collect();
        batch.sort_unstable_by_key(|(id, _)| *id);
        if let Some(pair) = batch.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(MinHashError::InvalidParameter(format!(
                "entity {} appears more than once in the batch",
                pair[0].0
            )));
        }

        let mut store = SignatureStore::new();
        if self.use_parallel {
            let results: Vec<(EntityId, Result<Signature, MinHashError>)> = batch
                .par_iter()
                .map(|&(id, set)| (id, self.compute_signature(set)))
                .collect();
            for (id, result) in results {
                self.accept(&mut store, id, result)?;
            }
        } else {
            for (id, set) in batch {
                self.accept(&mut store, id, self.compute_signature(set))?;
            }
        }
        Ok(store)
    }

    /// Compute signatures for every entity column of a membership matrix in
    /// one pass over its item rows.
    ///
    /// Each non-empty row is hashed once per function with the row's item id,
    /// and the values are folded into a running column minimum for every
    /// member column. The result equals [`Self::compute_store`] over the same
    /// item sets.
    pub fn compute_from_matrix<M>(&self, matrix: &M) -> Result<SignatureStore, MinHashError>
    where
        M: MembershipMatrix + ?Sized,
    {
        let n = self.family.len();
        let prime = self.family.prime();
        let cols = matrix.n_entities();

        let mut table = vec![u64::MAX; n * cols];
        let mut seen = vec![false; cols];
        let mut hashes = Vec::with_capacity(n);

        for row in 0..matrix.n_items() {
            let mut members = matrix.row_members(row).peekable();
            if members.peek().is_none() {
                continue;
            }
            let item = matrix.item_id(row);
            if item >= prime {
                return Err(MinHashError::ItemOutOfRange { item, prime });
            }
            self.family.evaluate_all(item, &mut hashes);
            for col in members {
                seen[col] = true;
                let column = &mut table[col * n..(col + 1) * n];
                for (slot, &h) in column.iter_mut().zip(&hashes) {
                    if h < *slot {
                        *slot = h;
                    }
                }
            }
        }

        let mut store = SignatureStore::new();
        for (col, column) in table.chunks_exact(n).enumerate() {
            let id = matrix.entity_id(col);
            let result = if seen[col] {
                Ok(Signature(column.to_vec()))
            } else {
                Err(MinHashError::EmptySignatureInput { entity: None })
            };
            self.accept(&mut store, id, result)?;
        }
        Ok(store)
    }

    fn accept(
        &self,
        store: &mut SignatureStore,
        id: EntityId,
        result: Result<Signature, MinHashError>,
    ) -> Result<(), MinHashError> {
        match result {
            Ok(signature) => {
                store.insert(id, signature);
                Ok(())
            }
            Err(MinHashError::EmptySignatureInput { .. })
                if self.empty_set_policy == EmptySetPolicy::Skip =>
            {
                warn!(entity = id, "skipping entity with an empty item set");
                Ok(())
            }
            Err(MinHashError::EmptySignatureInput { .. }) => {
                Err(MinHashError::EmptySignatureInput { entity: Some(id) })
            }
            Err(err) => Err(err),
        }
    }
}
