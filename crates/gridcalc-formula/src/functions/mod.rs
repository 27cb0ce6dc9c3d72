//! Built-in Excel functions
//!
//! Every function is registered with its arity, an implementation and a bit
//! of metadata. Dispatch happens in the expression compiler: the registry is
//! only a lookup table.

pub mod combinatorics;
pub mod criteria;
pub mod helpers;
pub mod info;
pub mod logical;
pub mod math;
pub mod multi_criteria;
pub mod ranking;
pub mod rounding;
pub mod statistical;
pub mod subtotal;
pub mod trig;

use std::fmt;
use std::sync::OnceLock;

use ahash::AHashMap;

use crate::context::ParsingContext;
use crate::error::{FormulaError, FormulaResult};
use crate::value::{CompileResult, FunctionArgument};

/// Library version a function first shipped in
pub const INITIAL_VERSION: &str = "0.1.0";

/// Function implementation signature
///
/// Arguments are fully evaluated; ranges arrive as lazy [`RangeInfo`]
/// values. Returning `Err(FormulaError::Excel(e))` renders `e` in the cell.
///
/// [`RangeInfo`]: crate::RangeInfo
pub type FunctionImpl = for<'a> fn(
    &[FunctionArgument<'a>],
    &mut ParsingContext<'a>,
    FunctionConfig,
) -> FormulaResult<CompileResult<'a>>;

/// Runs in a freshly pushed scope before the arguments are evaluated
pub type BeforeInvokeHook = fn(&mut ParsingContext<'_>);

/// Per-call switches for the shared aggregation helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FunctionConfig {
    /// Skip cells on hidden rows
    pub ignore_hidden: bool,
    /// Skip error values instead of propagating them
    pub ignore_errors: bool,
    /// Skip cells that host a SUBTOTAL or AGGREGATE call
    pub ignore_nested_subtotals: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCategory {
    Math,
    Rounding,
    Trigonometry,
    Combinatorics,
    Statistical,
    Logical,
    Information,
}

impl fmt::Display for FunctionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionCategory::Math => "Math",
            FunctionCategory::Rounding => "Rounding",
            FunctionCategory::Trigonometry => "Trigonometry",
            FunctionCategory::Combinatorics => "Combinatorics",
            FunctionCategory::Statistical => "Statistical",
            FunctionCategory::Logical => "Logical",
            FunctionCategory::Information => "Information",
        };
        f.write_str(name)
    }
}

/// First Excel release that has a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExcelVersion {
    Excel2007,
    Excel2010,
    Excel2013,
    Excel2019,
}

/// Descriptive data, used for introspection only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub category: FunctionCategory,
    pub introduced_in: &'static str,
    pub excel_version: ExcelVersion,
}

impl FunctionMetadata {
    pub fn new(category: FunctionCategory) -> Self {
        Self {
            category,
            introduced_in: INITIAL_VERSION,
            excel_version: ExcelVersion::Excel2007,
        }
    }
}

/// Function definition
#[derive(Clone)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub implementation: FunctionImpl,
    /// Is volatile (recalculates every time)
    pub volatile: bool,
    pub before_invoke: Option<BeforeInvokeHook>,
    pub metadata: FunctionMetadata,
}

impl FunctionDef {
    pub fn new(
        name: &'static str,
        min_args: usize,
        max_args: Option<usize>,
        implementation: FunctionImpl,
        category: FunctionCategory,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args,
            implementation,
            volatile: false,
            before_invoke: None,
            metadata: FunctionMetadata::new(category),
        }
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    pub fn before_invoke(mut self, hook: BeforeInvokeHook) -> Self {
        self.before_invoke = Some(hook);
        self
    }

    pub fn since(mut self, version: ExcelVersion) -> Self {
        self.metadata.excel_version = version;
        self
    }

    /// `ArgumentCount` unless `count` fits the declared arity
    pub fn check_arity(&self, count: usize) -> FormulaResult<()> {
        let too_many = self.max_args.is_some_and(|max| count > max);
        if count < self.min_args || too_many {
            let expected = match self.max_args {
                Some(max) if max == self.min_args => max.to_string(),
                Some(max) => format!("{} to {}", self.min_args, max),
                None => format!("at least {}", self.min_args),
            };
            return Err(FormulaError::ArgumentCount {
                function: self.name.to_string(),
                expected,
                actual: count,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("volatile", &self.volatile)
            .field("before_invoke", &self.before_invoke.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Arity check for implementations called outside the dispatcher
pub fn validate_arguments(
    name: &str,
    args: &[FunctionArgument<'_>],
    min_args: usize,
) -> FormulaResult<()> {
    if args.len() < min_args {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected: format!("at least {}", min_args),
            actual: args.len(),
        });
    }
    Ok(())
}

static GLOBAL_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

/// Function registry
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self::empty();
        math::register(&mut registry);
        rounding::register(&mut registry);
        trig::register(&mut registry);
        combinatorics::register(&mut registry);
        statistical::register(&mut registry);
        ranking::register(&mut registry);
        multi_criteria::register(&mut registry);
        subtotal::register(&mut registry);
        logical::register(&mut registry);
        info::register(&mut registry);
        registry
    }

    /// A registry without any functions
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Shared registry of built-in functions
    pub fn global() -> &'static FunctionRegistry {
        GLOBAL_REGISTRY.get_or_init(FunctionRegistry::new)
    }

    /// Look up a function by name
    ///
    /// Case-insensitive; the `_xlfn.` prefix of newer functions is ignored.
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        let upper = name.to_uppercase();
        let key = upper.strip_prefix("_XLFN.").unwrap_or(&upper);
        self.functions.get(key)
    }

    /// Register a function, replacing any previous one of the same name
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names of all registered functions, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::ParsingContext;
    use crate::evaluator::evaluate_formula;
    use crate::provider::WorkbookDataProvider;
    use crate::value::FormulaValue;
    use gridcalc_core::{CellValue, Workbook};

    /// Workbook whose first sheet holds `cells` as (address, value) pairs
    pub fn workbook_with(cells: &[(&str, CellValue)]) -> Workbook {
        let mut wb = Workbook::new();
        if let Some(ws) = wb.worksheet_mut(0) {
            for (address, value) in cells {
                ws.set_cell_value(address, value.clone()).unwrap();
            }
        }
        wb
    }

    pub fn eval_in(wb: &Workbook, formula: &str) -> FormulaValue<'static> {
        let provider = WorkbookDataProvider::new(wb);
        let mut ctx = ParsingContext::new(&provider);
        evaluate_formula(formula, &mut ctx)
            .unwrap()
            .result
            .into_scalar()
    }

    pub fn eval(formula: &str) -> FormulaValue<'static> {
        eval_in(&Workbook::new(), formula)
    }

    pub fn num(formula: &str) -> f64 {
        match eval(formula) {
            FormulaValue::Number(n) => n,
            other => panic!("{} evaluated to {:?}", formula, other),
        }
    }

    pub fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9 * expected.abs().max(1.0),
            "expected {}, got {}",
            expected,
            actual
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_is_case_insensitive_and_strips_prefix() {
        let registry = FunctionRegistry::global();
        assert!(registry.contains("sum"));
        assert!(registry.contains("_xlfn.STDEV.S"));
        assert_eq!(
            registry.get("_xlfn.aggregate").map(|d| d.name),
            Some("AGGREGATE")
        );
        assert!(!registry.contains("NOPE"));
    }

    #[test]
    fn test_metadata_and_flags() {
        let registry = FunctionRegistry::global();
        let rand = registry.get("RAND").unwrap();
        assert!(rand.volatile);
        assert_eq!(rand.metadata.category, FunctionCategory::Math);

        let subtotal = registry.get("SUBTOTAL").unwrap();
        assert!(subtotal.before_invoke.is_some());
        assert_eq!(
            registry.get("PERCENTILE.EXC").unwrap().metadata.excel_version,
            ExcelVersion::Excel2010
        );
        assert_eq!(
            registry.get("ARABIC").unwrap().metadata,
            FunctionMetadata {
                category: FunctionCategory::Combinatorics,
                introduced_in: INITIAL_VERSION,
                excel_version: ExcelVersion::Excel2013,
            }
        );
    }

    #[test]
    fn test_arity_messages() {
        let registry = FunctionRegistry::global();
        let err = registry.get("ROUND").unwrap().check_arity(3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Wrong number of arguments for ROUND: expected 2, got 3"
        );
        assert!(registry.get("SUM").unwrap().check_arity(30).is_ok());
        assert!(validate_arguments("SUM", &[], 1).is_err());
    }

    #[test]
    fn test_names_are_sorted() {
        let names = FunctionRegistry::global().names();
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.len() > 120);
    }
}
