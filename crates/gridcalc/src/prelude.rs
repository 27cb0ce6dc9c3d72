//! Common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Calculation
    CalculationOptions,
    CalculationStats,
    WorkbookCalculationExt,

    // Cells
    CellAddress,
    CellError,
    CellRange,
    CellValue,

    // Errors
    Error,
    Result,

    // Formulas
    FormulaValue,
    ParsingConfiguration,
    PrecisionAndRoundingStrategy,

    // Store
    Workbook,
    Worksheet,
};
