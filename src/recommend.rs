//! Item recommendation from LSH neighbours.

use std::collections::{BTreeMap, HashMap, HashSet};

use bucket::BandedBucketIndex;
use minhash::{EntityId, ItemId, ItemSet};
use serde::Serialize;

use crate::PipelineError;

/// An item suggested for a target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecommendedItem {
    pub item: ItemId,
    /// Number of candidate neighbours holding the item.
    pub support: usize,
}

/// Items held by the LSH candidates of `target` but not by `target` itself.
///
/// Items are ranked by how many candidates hold them, ties broken by
/// ascending item id, and cut to `top_n`. An entity without candidates gets
/// an empty list; an indexed entity missing from `item_sets` is an
/// `InvalidParameter`.
pub fn recommend_items<S>(
    index: &BandedBucketIndex,
    item_sets: &BTreeMap<EntityId, S>,
    target: EntityId,
    top_n: usize,
) -> Result<Vec<RecommendedItem>, PipelineError>
where
    S: ItemSet,
{
    let candidates = index.query_by_entity_id(target)?;
    let owned: HashSet<ItemId> = item_sets
        .get(&target)
        .ok_or_else(|| {
            PipelineError::InvalidParameter(format!("no item set for entity {target}"))
        })?
        .items()
        .collect();

    let mut support: HashMap<ItemId, usize> = HashMap::new();
    for entity in candidates {
        let Some(set) = item_sets.get(&entity) else {
            continue;
        };
        let distinct: HashSet<ItemId> = set.items().collect();
        for item in distinct {
            if !owned.contains(&item) {
                *support.entry(item).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<RecommendedItem> = support
        .into_iter()
        .map(|(item, support)| RecommendedItem { item, support })
        .collect();
    ranked.sort_by(|a, b| b.support.cmp(&a.support).then(a.item.cmp(&b.item)));
    ranked.truncate(top_n);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket::{BucketError, BucketKeyScheme};
    use minhash::{Signature, SignatureStore};
    use std::collections::BTreeSet;

    fn fixture() -> (BandedBucketIndex, BTreeMap<EntityId, BTreeSet<ItemId>>) {
        let store: SignatureStore = [
            (1, Signature::new(vec![1, 1, 5, 5])),
            (2, Signature::new(vec![1, 1, 6, 6])),
            (3, Signature::new(vec![2, 2, 5, 5])),
            (4, Signature::new(vec![9, 9, 9, 9])),
        ]
        .into_iter()
        .collect();
        let mut index = BandedBucketIndex::new(BucketKeyScheme::Exact);
        index.build(&store, 2, 2).unwrap();

        let mut sets = BTreeMap::new();
        sets.insert(1, BTreeSet::from([10, 11]));
        sets.insert(2, BTreeSet::from([10, 12, 13]));
        sets.insert(3, BTreeSet::from([11, 12, 14]));
        sets.insert(4, BTreeSet::from([99]));
        (index, sets)
    }

    #[test]
    fn ranks_by_support_then_item() {
        let (index, sets) = fixture();
        let got = recommend_items(&index, &sets, 1, 10).unwrap();
        assert_eq!(
            got,
            vec![
                RecommendedItem { item: 12, support: 2 },
                RecommendedItem { item: 13, support: 1 },
                RecommendedItem { item: 14, support: 1 },
            ]
        );
        assert_eq!(recommend_items(&index, &sets, 1, 1).unwrap().len(), 1);
    }

    #[test]
    fn isolated_entity_gets_nothing() {
        let (index, sets) = fixture();
        assert!(recommend_items(&index, &sets, 4, 5).unwrap().is_empty());
    }

    #[test]
    fn unknown_target_is_an_error() {
        let (index, sets) = fixture();
        assert_eq!(
            recommend_items(&index, &sets, 42, 5),
            Err(PipelineError::Bucket(BucketError::UnknownEntity(42)))
        );
    }

    #[test]
    fn target_without_item_set_is_an_error() {
        let (index, mut sets) = fixture();
        sets.remove(&1);
        assert!(matches!(
            recommend_items(&index, &sets, 1, 5),
            Err(PipelineError::InvalidParameter(_))
        ));
    }
}
