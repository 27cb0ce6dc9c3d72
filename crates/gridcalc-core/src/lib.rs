//! # gridcalc-core
//!
//! Sparse cell store used by the gridcalc formula engine.
//!
//! This crate provides the data the evaluator reads from:
//! - [`CellValue`] and [`CellError`] - cell contents and Excel error codes
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing, including
//!   full-column (`A:C`) and full-row (`2:5`) ranges
//! - [`Worksheet`] - sparse cells, hidden rows, merged regions and the used
//!   dimension
//! - [`Workbook`] - an ordered set of worksheets
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_formula("A2", "=A1*2").unwrap();
//! sheet.set_row_hidden(0, true);
//!
//! assert_eq!(sheet.get_value_at(0, 0), CellValue::Number(10.0));
//! ```

pub mod cell;
pub mod error;
pub mod workbook;
pub mod worksheet;

pub use cell::{CellAddress, CellError, CellRange, CellStorage, CellValue, SharedString};
pub use error::{Error, Result};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
