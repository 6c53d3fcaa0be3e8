//! Characteristic (membership) matrices.
//!
//! Rows are items of a declared universe, columns are entities, and a cell is
//! 1 when the entity's set contains the item. The dense form is an
//! `ndarray::Array2<u8>`; the sparse form keeps a sorted column list per row.
//! Both expose the same (row, col) semantics through [`MembershipMatrix`].

use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;

use crate::config::MinHashError;
use crate::signature::{EntityId, ItemId, ItemSet};

/// Read access shared by dense and sparse membership matrices.
pub trait MembershipMatrix {
    /// Number of item rows.
    fn n_items(&self) -> usize;
    /// Number of entity columns.
    fn n_entities(&self) -> usize;
    /// Item id of a row.
    fn item_id(&self, row: usize) -> ItemId;
    /// Entity id of a column.
    fn entity_id(&self, col: usize) -> EntityId;
    /// Columns with a 1 in `row`, ascending.
    fn row_members(&self, row: usize) -> impl Iterator<Item = usize> + '_;

    fn contains(&self, row: usize, col: usize) -> bool {
        self.row_members(row).any(|c| c == col)
    }

    /// Number of ones in the matrix.
    fn nnz(&self) -> usize {
        (0..self.n_items()).map(|r| self.row_members(r).count()).sum()
    }
}

/// Dense 0/1 matrix of shape `(items, entities)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseMembership {
    items: Vec<ItemId>,
    entities: Vec<EntityId>,
    cells: Array2<u8>,
}

impl DenseMembership {
    pub fn cells(&self) -> &Array2<u8> {
        &self.cells
    }

    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn to_sparse(&self) -> SparseMembership {
        let mut row_offsets = Vec::with_capacity(self.items.len() + 1);
        let mut columns = Vec::new();
        row_offsets.push(0);
        for row in self.cells.rows() {
            columns.extend(
                row.iter()
                    .enumerate()
                    .filter(|(_, &v)| v != 0)
                    .map(|(c, _)| c),
            );
            row_offsets.push(columns.len());
        }
        SparseMembership {
            items: self.items.clone(),
            entities: self.entities.clone(),
            row_offsets,
            columns,
        }
    }
}

impl MembershipMatrix for DenseMembership {
    fn n_items(&self) -> usize {
        self.items.len()
    }

    fn n_entities(&self) -> usize {
        self.entities.len()
    }

    fn item_id(&self, row: usize) -> ItemId {
        self.items[row]
    }

    fn entity_id(&self, col: usize) -> EntityId {
        self.entities[col]
    }

    fn row_members(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .row(row)
            .into_iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(c, _)| c)
    }

    fn contains(&self, row: usize, col: usize) -> bool {
        self.cells[[row, col]] != 0
    }
}

/// Sparse matrix in compressed-row form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseMembership {
    items: Vec<ItemId>,
    entities: Vec<EntityId>,
    row_offsets: Vec<usize>,
    columns: Vec<usize>,
}

impl SparseMembership {
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// All `(row, col)` pairs holding a 1, row-major.
    pub fn coordinates(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.items.len()).flat_map(move |r| self.row_members(r).map(move |c| (r, c)))
    }

    pub fn to_dense(&self) -> DenseMembership {
        let mut cells = Array2::zeros((self.items.len(), self.entities.len()));
        for (r, c) in self.coordinates() {
            cells[[r, c]] = 1;
        }
        DenseMembership {
            items: self.items.clone(),
            entities: self.entities.clone(),
            cells,
        }
    }
}

impl MembershipMatrix for SparseMembership {
    fn n_items(&self) -> usize {
        self.items.len()
    }

    fn n_entities(&self) -> usize {
        self.entities.len()
    }

    fn item_id(&self, row: usize) -> ItemId {
        self.items[row]
    }

    fn entity_id(&self, col: usize) -> EntityId {
        self.entities[col]
    }

    fn row_members(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.columns[self.row_offsets[row]..self.row_offsets[row + 1]]
            .iter()
            .copied()
    }

    fn contains(&self, row: usize, col: usize) -> bool {
        self.columns[self.row_offsets[row]..self.row_offsets[row + 1]]
            .binary_search(&col)
            .is_ok()
    }

    fn nnz(&self) -> usize {
        self.columns.len()
    }
}

/// Builds membership matrices over a fixed item universe.
#[derive(Debug, Clone)]
pub struct CharacteristicMatrixBuilder {
    universe: Vec<ItemId>,
    row_of: HashMap<ItemId, usize>,
}

impl CharacteristicMatrixBuilder {
    /// Declare the universe; rows follow its order. Duplicate items are rejected.
    pub fn new<I>(universe: I) -> Result<Self, MinHashError>
    where
        I: IntoIterator<Item = ItemId>,
    {
        let universe: Vec<ItemId> = universe.into_iter().collect();
        let mut row_of = HashMap::with_capacity(universe.len());
        for (row, &item) in universe.iter().enumerate() {
            if row_of.insert(item, row).is_some() {
                return Err(MinHashError::InvalidParameter(format!(
                    "item {item} appears twice in the universe"
                )));
            }
        }
        Ok(Self { universe, row_of })
    }

    /// Universe made of every item appearing in `sets`, ascending.
    pub fn from_item_sets<'a, S, I>(sets: I) -> Self
    where
        S: ItemSet + ?Sized + 'a,
        I: IntoIterator<Item = (EntityId, &'a S)>,
    {
        let items: BTreeSet<ItemId> = sets.into_iter().flat_map(|(_, s)| s.items()).collect();
        let universe: Vec<ItemId> = items.into_iter().collect();
        let row_of = universe.iter().enumerate().map(|(r, &i)| (i, r)).collect();
        Self { universe, row_of }
    }

    pub fn universe(&self) -> &[ItemId] {
        &self.universe
    }

    /// Dense matrix; columns are entities in ascending id order.
    pub fn build_dense<'a, S, I>(&self, sets: I) -> Result<DenseMembership, MinHashError>
    where
        S: ItemSet + ?Sized + 'a,
        I: IntoIterator<Item = (EntityId, &'a S)>,
    {
        let (entities, members) = self.collect_members(sets)?;
        let mut cells = Array2::zeros((self.universe.len(), entities.len()));
        for (col, rows) in members.iter().enumerate() {
            for &row in rows {
                cells[[row, col]] = 1;
            }
        }
        Ok(DenseMembership {
            items: self.universe.clone(),
            entities,
            cells,
        })
    }

    /// Sparse matrix with the same cells as [`Self::build_dense`].
    pub fn build_sparse<'a, S, I>(&self, sets: I) -> Result<SparseMembership, MinHashError>
    where
        S: ItemSet + ?Sized + 'a,
        I: IntoIterator<Item = (EntityId, &'a S)>,
    {
        let (entities, members) = self.collect_members(sets)?;
        let mut per_row: Vec<Vec<usize>> = vec![Vec::new(); self.universe.len()];
        // Columns are visited in ascending order, so every row list stays sorted.
        for (col, rows) in members.iter().enumerate() {
            for &row in rows {
                per_row[row].push(col);
            }
        }

        let mut row_offsets = Vec::with_capacity(per_row.len() + 1);
        let mut columns = Vec::with_capacity(per_row.iter().map(Vec::len).sum());
        row_offsets.push(0);
        for cols in per_row {
            columns.extend(cols);
            row_offsets.push(columns.len());
        }

        Ok(SparseMembership {
            items: self.universe.clone(),
            entities,
            row_offsets,
            columns,
        })
    }

    /// Sorted entity ids plus, per column, the distinct member rows.
    fn collect_members<'a, S, I>(
        &self,
        sets: I,
    ) -> Result<(Vec<EntityId>, Vec<BTreeSet<usize>>), MinHashError>
    where
        S: ItemSet + ?Sized + 'a,
        I: IntoIterator<Item = (EntityId, &'a S)>,
    {
        let mut sets: Vec<(EntityId, &'a S)> = sets.into_iter().collect();
        sets.sort_unstable_by_key(|(id, _)| *id);

        let mut entities = Vec::with_capacity(sets.len());
        let mut members = Vec::with_capacity(sets.len());
        for (entity, set) in sets {
            if entities.last() == Some(&entity) {
                return Err(MinHashError::InvalidParameter(format!(
                    "entity {entity} appears more than once"
                )));
            }
            let mut rows = BTreeSet::new();
            for item in set.items() {
                let row = *self
                    .row_of
                    .get(&item)
                    .ok_or(MinHashError::UnknownItem { entity, item })?;
                rows.insert(row);
            }
            entities.push(entity);
            members.push(rows);
        }
        Ok((entities, members))
    }
}
