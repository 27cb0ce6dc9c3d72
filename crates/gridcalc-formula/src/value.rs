//! Values flowing through an evaluation
//!
//! Every compiled expression resolves to exactly one [`FormulaValue`]. Range
//! values borrow the data provider; everything else is owned.

use crate::convert;
use crate::range::RangeInfo;
use gridcalc_core::{CellError, CellValue};

/// Coarse type tag of an evaluated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Number,
    String,
    Boolean,
    ExcelError,
    Empty,
    /// A worksheet range that has not been dereferenced
    ExcelRange,
    /// An inline array literal
    Enumerable,
}

/// A value produced while evaluating a formula
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue<'a> {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    Empty,
    /// A lazy view over worksheet cells
    Range(RangeInfo<'a>),
    /// Array literal such as `{1,2;3,4}`; rows of scalar values
    Array(Vec<Vec<FormulaValue<'a>>>),
}

impl<'a> FormulaValue<'a> {
    /// The type tag of this value
    pub fn data_type(&self) -> DataType {
        match self {
            FormulaValue::Number(_) => DataType::Number,
            FormulaValue::String(_) => DataType::String,
            FormulaValue::Boolean(_) => DataType::Boolean,
            FormulaValue::Error(_) => DataType::ExcelError,
            FormulaValue::Empty => DataType::Empty,
            FormulaValue::Range(_) => DataType::ExcelRange,
            FormulaValue::Array(_) => DataType::Enumerable,
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// The number held by a `Number` value
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Drop the borrow on the data provider
    ///
    /// Scalars are kept; a range cannot outlive its provider and becomes
    /// `#VALUE!`; an array collapses to its top-left element.
    pub fn into_scalar(self) -> FormulaValue<'static> {
        match self {
            FormulaValue::Number(n) => FormulaValue::Number(n),
            FormulaValue::String(s) => FormulaValue::String(s),
            FormulaValue::Boolean(b) => FormulaValue::Boolean(b),
            FormulaValue::Error(e) => FormulaValue::Error(e),
            FormulaValue::Empty => FormulaValue::Empty,
            FormulaValue::Range(_) => FormulaValue::Error(CellError::Value),
            FormulaValue::Array(rows) => rows
                .into_iter()
                .next()
                .and_then(|row| row.into_iter().next())
                .map(FormulaValue::into_scalar)
                .unwrap_or(FormulaValue::Empty),
        }
    }

    /// Convert to a value that can be stored in a cell
    ///
    /// A single-cell range yields that cell's value; larger ranges do not
    /// spill and become `#VALUE!`.
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            FormulaValue::Number(n) if n.is_finite() => CellValue::Number(*n),
            FormulaValue::Number(_) => CellValue::Error(CellError::Num),
            FormulaValue::String(s) => CellValue::string(s.as_str()),
            FormulaValue::Boolean(b) => CellValue::Boolean(*b),
            FormulaValue::Error(e) => CellValue::Error(*e),
            FormulaValue::Empty => CellValue::Number(0.0),
            FormulaValue::Range(r) if r.address().is_single_cell() => {
                match r.get_offset(0, 0) {
                    Some(FormulaValue::Empty) | None => CellValue::Number(0.0),
                    Some(v) => v.to_cell_value(),
                }
            }
            FormulaValue::Range(_) => CellValue::Error(CellError::Value),
            FormulaValue::Array(_) => self.clone().into_scalar().to_cell_value(),
        }
    }

    /// Render the value the way the `&` operator and text functions see it
    pub fn as_text(&self) -> String {
        match self {
            FormulaValue::Number(n) => convert::format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Range(_) | FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }
}

impl From<&CellValue> for FormulaValue<'static> {
    fn from(value: &CellValue) -> Self {
        match value.effective_value() {
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::String(s) => FormulaValue::String(s.as_str().to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
            CellValue::Empty | CellValue::Formula { .. } => FormulaValue::Empty,
        }
    }
}

impl From<f64> for FormulaValue<'static> {
    fn from(n: f64) -> Self {
        FormulaValue::Number(n)
    }
}

impl From<CellError> for FormulaValue<'static> {
    fn from(e: CellError) -> Self {
        FormulaValue::Error(e)
    }
}

/// One evaluated operand passed to a function
///
/// The type tag is computed once at construction; functions dispatch on it
/// before coercing.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArgument<'a> {
    value: FormulaValue<'a>,
    data_type: DataType,
}

impl<'a> FunctionArgument<'a> {
    pub fn new(value: FormulaValue<'a>) -> Self {
        let data_type = value.data_type();
        Self { value, data_type }
    }

    pub fn value(&self) -> &FormulaValue<'a> {
        &self.value
    }

    pub fn into_value(self) -> FormulaValue<'a> {
        self.value
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// True when the argument is an unevaluated worksheet range
    pub fn is_excel_range(&self) -> bool {
        self.data_type == DataType::ExcelRange
    }

    /// True when the argument is an array literal
    pub fn is_enumerable_of_func_args(&self) -> bool {
        self.data_type == DataType::Enumerable
    }

    pub fn is_excel_error(&self) -> bool {
        self.data_type == DataType::ExcelError
    }

    pub fn as_range(&self) -> Option<&RangeInfo<'a>> {
        match &self.value {
            FormulaValue::Range(r) => Some(r),
            _ => None,
        }
    }
}

impl<'a> From<FormulaValue<'a>> for FunctionArgument<'a> {
    fn from(value: FormulaValue<'a>) -> Self {
        Self::new(value)
    }
}

/// Outcome of compiling an expression or invoking a function
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult<'a> {
    pub result: FormulaValue<'a>,
    pub data_type: DataType,
    /// Set when the value came from a SUBTOTAL/AGGREGATE host
    pub is_result_of_subtotal: bool,
}

impl<'a> CompileResult<'a> {
    pub fn new(result: FormulaValue<'a>) -> Self {
        let data_type = result.data_type();
        Self {
            result,
            data_type,
            is_result_of_subtotal: false,
        }
    }

    /// A numeric result; NaN and infinities become `#NUM!`
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Self::new(FormulaValue::Number(n))
        } else {
            Self::error(CellError::Num)
        }
    }

    pub fn string<S: Into<String>>(s: S) -> Self {
        Self::new(FormulaValue::String(s.into()))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(FormulaValue::Boolean(b))
    }

    pub fn error(e: CellError) -> Self {
        Self::new(FormulaValue::Error(e))
    }

    pub fn empty() -> Self {
        Self::new(FormulaValue::Empty)
    }

    /// Mark the result as produced by a SUBTOTAL/AGGREGATE host
    pub fn from_subtotal(mut self) -> Self {
        self.is_result_of_subtotal = true;
        self
    }

    pub fn is_error(&self) -> bool {
        self.data_type == DataType::ExcelError
    }

    /// Turn the result into an argument for an enclosing function call
    pub fn into_argument(self) -> FunctionArgument<'a> {
        FunctionArgument::new(self.result)
    }

    /// The value to store in the formula's cell
    pub fn to_cell_value(&self) -> CellValue {
        self.result.to_cell_value()
    }
}
