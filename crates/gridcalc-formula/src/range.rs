//! Lazy views over worksheet ranges
//!
//! A [`RangeInfo`] is an address-bounded window onto the data provider. It
//! copies nothing; cells are read on demand and iteration only visits stored
//! cells inside the range, clipped to the worksheet dimension.

use std::fmt;

use crate::error::{FormulaError, FormulaResult};
use crate::provider::{CellId, ExcelDataProvider};
use crate::value::FormulaValue;
use gridcalc_core::{CellError, CellRange};

/// Read-only view of a rectangular range on one worksheet
#[derive(Clone, Copy)]
pub struct RangeInfo<'a> {
    provider: &'a dyn ExcelDataProvider,
    sheet: usize,
    address: CellRange,
}

impl<'a> RangeInfo<'a> {
    pub fn new(provider: &'a dyn ExcelDataProvider, sheet: usize, address: CellRange) -> Self {
        Self {
            provider,
            sheet,
            address,
        }
    }

    /// Resolve an address such as `A1:B3`, `C:C` or `'My Sheet'!A1`
    ///
    /// Unqualified addresses resolve against `current_sheet`.
    pub fn resolve(
        provider: &'a dyn ExcelDataProvider,
        current_sheet: usize,
        address: &str,
    ) -> FormulaResult<Self> {
        let (sheet_name, local) = split_sheet_address(address);
        let sheet = match sheet_name {
            Some(name) => provider
                .sheet_index(&name)
                .ok_or_else(|| FormulaError::InvalidReference(address.to_string()))?,
            None => current_sheet,
        };
        let range = CellRange::parse(local)?;
        Ok(Self::new(provider, sheet, range))
    }

    pub fn provider(&self) -> &'a dyn ExcelDataProvider {
        self.provider
    }

    pub fn sheet(&self) -> usize {
        self.sheet
    }

    /// The declared rectangle, before any clipping
    pub fn address(&self) -> CellRange {
        self.address
    }

    pub fn row_count(&self) -> u32 {
        self.address.row_count()
    }

    pub fn col_count(&self) -> u16 {
        self.address.col_count()
    }

    /// Same anchor, different size
    pub fn resize(&self, rows: u32, cols: u16) -> Self {
        let start = self.address.start;
        let end_row = (start.row + rows.max(1) - 1).min(gridcalc_core::MAX_ROWS - 1);
        let end_col = (start.col as u32 + cols.max(1) as u32 - 1)
            .min(gridcalc_core::MAX_COLS as u32 - 1) as u16;
        Self::new(
            self.provider,
            self.sheet,
            CellRange::from_indices(start.row, start.col, end_row, end_col),
        )
    }

    /// The declared rectangle intersected with the worksheet dimension
    ///
    /// `None` when no stored cell can fall inside the range.
    pub fn effective_address(&self) -> Option<CellRange> {
        self.provider
            .dimension(self.sheet)
            .and_then(|dim| dim.intersect(&self.address))
    }

    /// Value of an absolute cell position; unstored cells are `Empty`
    pub fn get_value(&self, row: u32, col: u16) -> FormulaValue<'static> {
        self.provider.get_cell_value(self.sheet, row, col)
    }

    /// Value at an offset from the top-left corner, `None` outside the range
    pub fn get_offset(&self, row_offset: u32, col_offset: u16) -> Option<FormulaValue<'static>> {
        if row_offset >= self.row_count() || col_offset >= self.col_count() {
            return None;
        }
        Some(self.get_value(
            self.address.start.row + row_offset,
            self.address.start.col + col_offset,
        ))
    }

    /// Value at an offset, read through the worksheet's merge index
    ///
    /// A cell covered by a merged region reports the region's top-left value.
    pub fn merged_anchor_value(
        &self,
        row_offset: u32,
        col_offset: u16,
    ) -> Option<FormulaValue<'static>> {
        self.get_offset(row_offset, col_offset)?;
        let row = self.address.start.row + row_offset;
        let col = self.address.start.col + col_offset;
        Some(match self.provider.merged_range_at(self.sheet, row, col) {
            Some(merge) => self.get_value(merge.start.row, merge.start.col),
            None => self.get_value(row, col),
        })
    }

    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.provider.is_row_hidden(self.sheet, row)
    }

    pub fn cell_id(&self, row: u32, col: u16) -> CellId {
        self.provider.get_cell_id(self.sheet, row, col)
    }

    /// Stored cells inside the range, row-major
    pub fn iter(&self) -> impl Iterator<Item = CellInfo> + 'a {
        let provider = self.provider;
        let sheet = self.sheet;
        let cells = match self.effective_address() {
            Some(clipped) => provider.cells_in(sheet, clipped),
            None => Box::new(std::iter::empty()),
        };
        cells.map(move |(row, col, value)| CellInfo {
            row,
            col,
            value,
            id: provider.get_cell_id(sheet, row, col),
            is_hidden_row: provider.is_row_hidden(sheet, row),
        })
    }

    /// Scalar seen by an operator at `anchor`: implicit intersection
    ///
    /// A single cell yields its value. A one-column range yields the cell on
    /// the anchor's row, a one-row range the cell in the anchor's column.
    /// Anything else is `#VALUE!`.
    pub fn implicit_intersection(&self, anchor: Option<(u32, u16)>) -> FormulaValue<'static> {
        let start = self.address.start;
        if self.address.is_single_cell() {
            return self.get_value(start.row, start.col);
        }
        let Some((row, col)) = anchor else {
            return FormulaValue::Error(CellError::Value);
        };
        if self.col_count() == 1 && row >= start.row && row <= self.address.end.row {
            return self.get_value(row, start.col);
        }
        if self.row_count() == 1 && col >= start.col && col <= self.address.end.col {
            return self.get_value(start.row, col);
        }
        FormulaValue::Error(CellError::Value)
    }
}

impl fmt::Debug for RangeInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeInfo")
            .field("sheet", &self.sheet)
            .field("address", &self.address.to_a1_string())
            .finish()
    }
}

impl PartialEq for RangeInfo<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.sheet == other.sheet && self.address == other.address
    }
}

/// Split `Sheet!A1` / `'My Sheet'!A1` into sheet name and local address
pub fn split_sheet_address(address: &str) -> (Option<String>, &str) {
    match address.rsplit_once('!') {
        Some((sheet, local)) => {
            let name = sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
                .map(|s| s.replace("''", "'"))
                .unwrap_or_else(|| sheet.to_string());
            (Some(name), local)
        }
        None => (None, address),
    }
}

/// One stored cell visited while iterating a [`RangeInfo`]
#[derive(Debug, Clone, PartialEq)]
pub struct CellInfo {
    pub row: u32,
    pub col: u16,
    pub value: FormulaValue<'static>,
    pub id: CellId,
    pub is_hidden_row: bool,
}

impl CellInfo {
    /// Numeric content, `None` for text, booleans, errors and blanks
    pub fn value_double(&self) -> Option<f64> {
        self.value.as_number()
    }

    pub fn is_excel_error(&self) -> bool {
        self.value.is_error()
    }
}

/// Either a worksheet range or a single inline value, never both
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOrValue<'a> {
    Range(RangeInfo<'a>),
    Value(FormulaValue<'a>),
}

impl<'a> RangeOrValue<'a> {
    pub fn from_value(value: &FormulaValue<'a>) -> Self {
        match value {
            FormulaValue::Range(r) => RangeOrValue::Range(*r),
            other => RangeOrValue::Value(other.clone()),
        }
    }

    /// Rows and columns covered
    pub fn shape(&self) -> (u32, u16) {
        match self {
            RangeOrValue::Range(r) => (r.row_count(), r.col_count()),
            RangeOrValue::Value(FormulaValue::Array(rows)) => (
                rows.len() as u32,
                rows.first().map_or(0, |row| row.len() as u16),
            ),
            RangeOrValue::Value(_) => (1, 1),
        }
    }

    /// Value at an offset from the top-left corner, `None` outside
    pub fn get_offset(&self, row_offset: u32, col_offset: u16) -> Option<FormulaValue<'static>> {
        match self {
            RangeOrValue::Range(r) => r.get_offset(row_offset, col_offset),
            RangeOrValue::Value(FormulaValue::Array(rows)) => rows
                .get(row_offset as usize)
                .and_then(|row| row.get(col_offset as usize))
                .map(|v| v.clone().into_scalar()),
            RangeOrValue::Value(v) if row_offset == 0 && col_offset == 0 => {
                Some(v.clone().into_scalar())
            }
            RangeOrValue::Value(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::provider::WorkbookDataProvider;
    use gridcalc_core::Workbook;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_workbook() -> Workbook {
        let mut wb = Workbook::new();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_value("A1", 1.0).unwrap();
        ws.set_cell_value("A2", "two").unwrap();
        ws.set_cell_value("B3", 3.0).unwrap();
        ws.set_row_hidden(1, true);
        wb
    }

    #[test]
    fn test_iteration_is_sparse_and_clipped() {
        let wb = sample_workbook();
        let provider = WorkbookDataProvider::new(&wb);
        let range = RangeInfo::resolve(&provider, 0, "A:B").unwrap();

        let cells: Vec<_> = range.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (2, 1)]);
        assert_eq!(range.effective_address(), CellRange::parse("A1:B3").ok());

        let hidden: Vec<_> = range.iter().filter(|c| c.is_hidden_row).collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].value, FormulaValue::String("two".into()));
    }

    #[test]
    fn test_get_offset_bounds() {
        let wb = sample_workbook();
        let provider = WorkbookDataProvider::new(&wb);
        let range = RangeInfo::resolve(&provider, 0, "A1:B2").unwrap();

        assert_eq!(range.get_offset(0, 0), Some(FormulaValue::Number(1.0)));
        assert_eq!(range.get_offset(1, 1), Some(FormulaValue::Empty));
        assert_eq!(range.get_offset(2, 0), None);
        assert_eq!(range.get_offset(0, 2), None);
    }

    #[test]
    fn test_merged_anchor_value() {
        let mut wb = sample_workbook();
        wb.worksheet_mut(0)
            .unwrap()
            .merge_cells(&CellRange::parse("A1:C1").unwrap())
            .unwrap();
        let provider = WorkbookDataProvider::new(&wb);
        let range = RangeInfo::resolve(&provider, 0, "B1:C1").unwrap();

        assert_eq!(range.get_offset(0, 1), Some(FormulaValue::Empty));
        assert_eq!(
            range.merged_anchor_value(0, 1),
            Some(FormulaValue::Number(1.0))
        );
    }

    #[test]
    fn test_implicit_intersection() {
        let wb = sample_workbook();
        let provider = WorkbookDataProvider::new(&wb);
        let column = RangeInfo::resolve(&provider, 0, "A1:A3").unwrap();

        assert_eq!(
            column.implicit_intersection(Some((0, 4))),
            FormulaValue::Number(1.0)
        );
        assert_eq!(
            column.implicit_intersection(Some((9, 4))),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            column.implicit_intersection(None),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_resolve_sheet_qualified() {
        let mut wb = sample_workbook();
        wb.add_worksheet_with_name("My Sheet").unwrap();
        let provider = WorkbookDataProvider::new(&wb);

        let range = RangeInfo::resolve(&provider, 0, "'My Sheet'!B2").unwrap();
        assert_eq!(range.sheet(), 1);
        assert!(RangeInfo::resolve(&provider, 0, "Nope!A1").is_err());
        assert_eq!(
            split_sheet_address("'O''Brien'!A1"),
            (Some("O'Brien".to_string()), "A1")
        );
    }
}
