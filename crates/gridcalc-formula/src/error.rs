//! Formula error types

use gridcalc_core::CellError;
use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula parsing or evaluation
///
/// [`FormulaError::Excel`] is the in-band signal that a calculation cannot
/// continue and must render as a cell error. The function dispatcher turns it
/// into an error result, so it never escapes a function call.
#[derive(Debug, Error)]
pub enum FormulaError {
    /// Formula parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// The calculation produced an Excel error value
    #[error("Excel error {0}")]
    Excel(CellError),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Unknown function
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Reference that does not resolve to a worksheet range
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Circular reference
    #[error("Circular reference detected")]
    CircularReference,

    /// Broken prev/next links in an expression chain
    #[error("Expression graph corrupted: {0}")]
    Graph(String),
}

impl FormulaError {
    /// The cell error this failure renders as, if it renders as one at all
    pub fn as_cell_error(&self) -> Option<CellError> {
        match self {
            FormulaError::Excel(e) => Some(*e),
            FormulaError::ArgumentCount { .. } => Some(CellError::Value),
            FormulaError::UnknownFunction(_) => Some(CellError::Name),
            FormulaError::InvalidReference(_) => Some(CellError::Ref),
            FormulaError::Parse(_) | FormulaError::CircularReference | FormulaError::Graph(_) => {
                None
            }
        }
    }
}

impl From<CellError> for FormulaError {
    fn from(e: CellError) -> Self {
        FormulaError::Excel(e)
    }
}

impl From<gridcalc_core::Error> for FormulaError {
    fn from(e: gridcalc_core::Error) -> Self {
        FormulaError::InvalidReference(e.to_string())
    }
}
