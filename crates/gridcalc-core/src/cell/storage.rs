//! Sparse cell storage
//!
//! Only non-empty cells are stored, in a row-based `BTreeMap` so that
//! rectangular reads can seek straight to the populated rows and columns.

use std::collections::{BTreeMap, BTreeSet};

use super::{CellRange, CellValue};

/// Sparse row-major storage for worksheet cells
///
/// Structure: `BTreeMap<row_index, BTreeMap<col_index, CellValue>>`
#[derive(Debug, Default, Clone)]
pub struct CellStorage {
    rows: BTreeMap<u32, BTreeMap<u16, CellValue>>,
    hidden_rows: BTreeSet<u32>,
    merged_regions: Vec<CellRange>,
}

impl CellStorage {
    /// Create a new empty cell storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cell value
    pub fn get(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.rows.get(&row).and_then(|r| r.get(&col))
    }

    /// Get a mutable cell value
    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut CellValue> {
        self.rows.get_mut(&row).and_then(|r| r.get_mut(&col))
    }

    /// Set a cell value; storing [`CellValue::Empty`] removes the cell
    pub fn set(&mut self, row: u32, col: u16, value: CellValue) {
        if value.is_empty() {
            self.remove(row, col);
        } else {
            self.rows.entry(row).or_default().insert(col, value);
        }
    }

    /// Remove a cell
    pub fn remove(&mut self, row: u32, col: u16) -> Option<CellValue> {
        let row_map = self.rows.get_mut(&row)?;
        let removed = row_map.remove(&col);
        if row_map.is_empty() {
            self.rows.remove(&row);
        }
        removed
    }

    /// Get the number of stored cells
    pub fn cell_count(&self) -> usize {
        self.rows.values().map(|r| r.len()).sum()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bounding rectangle of the stored cells
    pub fn used_bounds(&self) -> Option<CellRange> {
        let min_row = *self.rows.keys().next()?;
        let max_row = *self.rows.keys().next_back()?;

        let mut min_col = u16::MAX;
        let mut max_col = 0u16;
        for cols in self.rows.values() {
            if let (Some(&first), Some(&last)) = (cols.keys().next(), cols.keys().next_back()) {
                min_col = min_col.min(first);
                max_col = max_col.max(last);
            }
        }

        Some(CellRange::from_indices(min_row, min_col, max_row, max_col))
    }

    /// Iterate over all cells in row order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, v)| (row, col, v)))
    }

    /// Iterate over the stored cells inside `range`, row by row
    ///
    /// Cost is proportional to the populated rows and cells in the range,
    /// never to its area.
    pub fn iter_range(&self, range: CellRange) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        let cols = range.start.col..=range.end.col;
        self.rows
            .range(range.start.row..=range.end.row)
            .flat_map(move |(&row, row_map)| {
                row_map
                    .range(cols.clone())
                    .map(move |(&col, v)| (row, col, v))
            })
    }

    /// Check whether a row is hidden
    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.hidden_rows.contains(&row)
    }

    /// Hide or show a row
    pub fn set_row_hidden(&mut self, row: u32, hidden: bool) {
        if hidden {
            self.hidden_rows.insert(row);
        } else {
            self.hidden_rows.remove(&row);
        }
    }

    /// Hidden row indices in ascending order
    pub fn hidden_rows(&self) -> impl Iterator<Item = u32> + '_ {
        self.hidden_rows.iter().copied()
    }

    /// Merged regions
    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged_regions
    }

    /// Add a merged region
    pub fn add_merged_region(&mut self, range: CellRange) {
        self.merged_regions.push(range);
    }

    /// Remove a merged region by index
    pub fn remove_merged_region(&mut self, index: usize) -> Option<CellRange> {
        (index < self.merged_regions.len()).then(|| self.merged_regions.remove(index))
    }

    /// The merged region covering a cell, if any
    pub fn merged_region_at(&self, row: u32, col: u16) -> Option<CellRange> {
        self.merged_regions
            .iter()
            .find(|r| r.contains(row, col))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_cells_not_stored() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, CellValue::Number(1.0));
        storage.set(0, 0, CellValue::Empty);
        assert!(storage.is_empty());
        assert_eq!(storage.get(0, 0), None);
    }

    #[test]
    fn test_used_bounds() {
        let mut storage = CellStorage::new();
        assert_eq!(storage.used_bounds(), None);

        storage.set(5, 3, CellValue::Number(1.0));
        storage.set(2, 7, CellValue::Number(2.0));
        assert_eq!(
            storage.used_bounds(),
            Some(CellRange::from_indices(2, 3, 5, 7))
        );
    }

    #[test]
    fn test_iter_range_is_sparse_and_ordered() {
        let mut storage = CellStorage::new();
        storage.set(1, 0, CellValue::Number(1.0));
        storage.set(0, 1, CellValue::Number(2.0));
        storage.set(900_000, 0, CellValue::Number(3.0));
        storage.set(1, 5, CellValue::Number(4.0));

        let hits: Vec<_> = storage
            .iter_range(CellRange::full_columns(0, 1))
            .map(|(r, c, _)| (r, c))
            .collect();
        assert_eq!(hits, vec![(0, 1), (1, 0), (900_000, 0)]);
    }

    #[test]
    fn test_hidden_rows_and_merges() {
        let mut storage = CellStorage::new();
        storage.set_row_hidden(3, true);
        assert!(storage.is_row_hidden(3));
        storage.set_row_hidden(3, false);
        assert!(!storage.is_row_hidden(3));

        storage.add_merged_region(CellRange::from_indices(0, 0, 1, 2));
        assert_eq!(
            storage.merged_region_at(1, 1),
            Some(CellRange::from_indices(0, 0, 1, 2))
        );
        assert_eq!(storage.merged_region_at(2, 0), None);
    }
}
