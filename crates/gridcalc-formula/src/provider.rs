//! Access to the cell store during evaluation

use crate::error::FormulaResult;
use crate::range::RangeInfo;
use crate::value::FormulaValue;
use ahash::AHashMap;
use gridcalc_core::{CellRange, Workbook};

/// Stable identifier of a worksheet cell
pub type CellId = u64;

/// Pack sheet, row and column into a [`CellId`]
///
/// Columns take the low 16 bits, rows the next 24 and the sheet index the
/// rest, which keeps ids unique for every addressable cell.
pub fn cell_id(sheet: usize, row: u32, col: u16) -> CellId {
    ((sheet as u64) << 40) | ((row as u64) << 16) | col as u64
}

/// Read-only view of the cell store used by the evaluator
///
/// Implementations must be cheap to query cell by cell; range reads go
/// through [`ExcelDataProvider::cells_in`] so sparse stores never visit
/// empty cells.
pub trait ExcelDataProvider {
    /// Index of a worksheet by name (case-insensitive)
    fn sheet_index(&self, name: &str) -> Option<usize>;

    /// Name of a worksheet
    fn sheet_name(&self, sheet: usize) -> Option<&str>;

    /// Effective value of a cell; unstored cells are `Empty`
    fn get_cell_value(&self, sheet: usize, row: u32, col: u16) -> FormulaValue<'static>;

    /// Stored cells inside `range`, row-major
    fn cells_in<'s>(
        &'s self,
        sheet: usize,
        range: CellRange,
    ) -> Box<dyn Iterator<Item = (u32, u16, FormulaValue<'static>)> + 's>;

    /// Bounding rectangle of the stored cells of a sheet
    fn dimension(&self, sheet: usize) -> Option<CellRange>;

    fn is_row_hidden(&self, sheet: usize, row: u32) -> bool;

    /// The merged region covering a cell, if any
    fn merged_range_at(&self, sheet: usize, row: u32, col: u16) -> Option<CellRange>;

    fn get_cell_id(&self, sheet: usize, row: u32, col: u16) -> CellId {
        cell_id(sheet, row, col)
    }
}

impl<'p> dyn ExcelDataProvider + 'p {
    /// Resolve `address` as written in the cell at `from_row`/`from_col` of
    /// `worksheet`
    ///
    /// A sheet prefix inside `address` wins over `worksheet`. An empty
    /// address is the calling cell itself.
    pub fn get_range(
        &self,
        worksheet: usize,
        from_row: u32,
        from_col: u16,
        address: &str,
    ) -> FormulaResult<RangeInfo<'_>> {
        if address.trim().is_empty() {
            let cell = CellRange::from_indices(from_row, from_col, from_row, from_col);
            return Ok(RangeInfo::new(self, worksheet, cell));
        }
        RangeInfo::resolve(self, worksheet, address)
    }
}

/// [`ExcelDataProvider`] over a [`Workbook`]
#[derive(Debug, Clone, Copy)]
pub struct WorkbookDataProvider<'w> {
    workbook: &'w Workbook,
}

impl<'w> WorkbookDataProvider<'w> {
    pub fn new(workbook: &'w Workbook) -> Self {
        Self { workbook }
    }

    pub fn workbook(&self) -> &'w Workbook {
        self.workbook
    }
}

impl ExcelDataProvider for WorkbookDataProvider<'_> {
    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.workbook.sheet_index(name)
    }

    fn sheet_name(&self, sheet: usize) -> Option<&str> {
        self.workbook.worksheet(sheet).map(|ws| ws.name())
    }

    fn get_cell_value(&self, sheet: usize, row: u32, col: u16) -> FormulaValue<'static> {
        self.workbook
            .worksheet(sheet)
            .and_then(|ws| ws.cell_at(row, col))
            .map(FormulaValue::from)
            .unwrap_or(FormulaValue::Empty)
    }

    fn cells_in<'s>(
        &'s self,
        sheet: usize,
        range: CellRange,
    ) -> Box<dyn Iterator<Item = (u32, u16, FormulaValue<'static>)> + 's> {
        match self.workbook.worksheet(sheet) {
            Some(ws) => Box::new(
                ws.cells_in(range)
                    .map(|(row, col, value)| (row, col, FormulaValue::from(value))),
            ),
            None => Box::new(std::iter::empty()),
        }
    }

    fn dimension(&self, sheet: usize) -> Option<CellRange> {
        self.workbook.worksheet(sheet).and_then(|ws| ws.dimension())
    }

    fn is_row_hidden(&self, sheet: usize, row: u32) -> bool {
        self.workbook
            .worksheet(sheet)
            .is_some_and(|ws| ws.is_row_hidden(row))
    }

    fn merged_range_at(&self, sheet: usize, row: u32, col: u16) -> Option<CellRange> {
        self.workbook
            .worksheet(sheet)
            .and_then(|ws| ws.merged_region_at(row, col))
    }
}

/// Interns address strings behind small integer ids
///
/// Used when references are passed around pre-resolved instead of as inline
/// text. Ids are dense and start at 0.
#[derive(Debug, Default, Clone)]
pub struct AddressCache {
    addresses: Vec<String>,
    ids: AHashMap<String, u32>,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an address, returning the id it is stored under
    pub fn add(&mut self, address: &str) -> u32 {
        if let Some(&id) = self.ids.get(address) {
            return id;
        }
        let id = self.addresses.len() as u32;
        self.addresses.push(address.to_string());
        self.ids.insert(address.to_string(), id);
        id
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.addresses.get(id as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
        self.ids.clear();
    }
}
