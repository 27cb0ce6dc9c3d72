//! # gridcalc-formula
//!
//! Formula evaluation core for gridcalc.
//!
//! This crate provides:
//! - an expression graph built from formula text, compiled by local
//!   rewrites ([`graph`])
//! - a lazy, read-only view of worksheet ranges ([`RangeInfo`])
//! - the per-evaluation [`ParsingContext`] with its scope stack and the
//!   SUBTOTAL/AGGREGATE bookkeeping
//! - a registry of built-in math and statistical functions
//! - dependency tracking for calculation chains
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::Workbook;
//! use gridcalc_formula::{evaluate_formula, FormulaValue, ParsingContext, WorkbookDataProvider};
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 32.0).unwrap();
//!
//! let provider = WorkbookDataProvider::new(&workbook);
//! let mut ctx = ParsingContext::new(&provider);
//! let result = evaluate_formula("=SUM(A1:A2)/2", &mut ctx).unwrap();
//! assert_eq!(result.result, FormulaValue::Number(21.0));
//! ```

pub mod context;
pub mod convert;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod graph;
pub mod provider;
pub mod range;
pub mod value;

pub use context::{
    ParsingConfiguration, ParsingContext, ParsingScope, ParsingScopes,
    PrecisionAndRoundingStrategy, SubtotalAddresses,
};
pub use dependency::{CellKey, DependencyGraph};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, evaluate_at, evaluate_formula, parse_formula, parse_formula_with};
pub use functions::{FunctionConfig, FunctionDef, FunctionMetadata, FunctionRegistry};
pub use graph::ExpressionGraph;
pub use provider::{AddressCache, CellId, ExcelDataProvider, WorkbookDataProvider};
pub use range::{CellInfo, RangeInfo, RangeOrValue};
pub use value::{CompileResult, DataType, FormulaValue, FunctionArgument};
