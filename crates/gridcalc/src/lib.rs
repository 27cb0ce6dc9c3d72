//! # gridcalc
//!
//! Excel-compatible formula evaluation over an in-memory workbook.
//!
//! The workspace is split in three:
//! - `gridcalc-core` holds cells, addresses and the sparse worksheet store
//! - `gridcalc-formula` parses and evaluates formulas and carries the
//!   built-in function library
//! - this crate ties them together and adds workbook-wide calculation
//!   ([`WorkbookCalculationExt`])
//!
//! ## Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 20.0).unwrap();
//! sheet.set_cell_formula("A3", "=SUBTOTAL(9,A1:A2)").unwrap();
//!
//! let stats = workbook.calculate().unwrap();
//! assert_eq!(stats.cells_calculated, 1);
//!
//! let sheet = workbook.worksheet(0).unwrap();
//! assert_eq!(sheet.get_calculated_value_at(2, 0), Some(&CellValue::Number(30.0)));
//! ```

pub mod calculation;
pub mod prelude;

use thiserror::Error;

pub use calculation::{CalculationOptions, CalculationStats, WorkbookCalculationExt};

pub use gridcalc_core::{
    CellAddress, CellError, CellRange, CellValue, Workbook, Worksheet, MAX_COLS, MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};

pub use gridcalc_formula::{
    evaluate, evaluate_at, evaluate_formula, parse_formula, parse_formula_with, CellKey,
    CompileResult, DependencyGraph, ExcelDataProvider, ExpressionGraph, FormulaError,
    FormulaResult, FormulaValue, FunctionRegistry, ParsingConfiguration, ParsingContext,
    PrecisionAndRoundingStrategy, RangeInfo, WorkbookDataProvider,
};

/// Result type of the workbook-level API
pub type Result<T> = std::result::Result<T, Error>;

/// Errors of the workbook-level API
#[derive(Debug, Error)]
pub enum Error {
    /// Failure in the cell store
    #[error(transparent)]
    Core(#[from] gridcalc_core::Error),

    /// Failure while parsing or evaluating a formula
    #[error(transparent)]
    Formula(#[from] FormulaError),
}
