//! Per-evaluation state
//!
//! A [`ParsingContext`] lives for one formula evaluation. It owns the scope
//! stack used by SUBTOTAL/AGGREGATE re-entrancy and carries the set of host
//! cells already counted as subtotals, which the calculation driver moves
//! from one context to the next.

use ahash::AHashSet;

use crate::dependency::CellKey;
use crate::error::FormulaResult;
use crate::functions::rounding::round_to_significant_fig;
use crate::functions::FunctionRegistry;
use crate::provider::{AddressCache, CellId, ExcelDataProvider};
use crate::range::RangeInfo;
use crate::value::{CompileResult, FormulaValue};

/// Ids of the cells hosting a SUBTOTAL or AGGREGATE call
pub type SubtotalAddresses = AHashSet<CellId>;

/// How numeric function results are rounded before they are returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrecisionAndRoundingStrategy {
    /// Full double precision
    #[default]
    DotNet,
    /// Round to 15 significant figures, as Excel does
    Excel,
}

/// Options that apply to every formula parsed and evaluated with them
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParsingConfiguration {
    pub precision_and_rounding: PrecisionAndRoundingStrategy,
    /// Deepest allowed nesting of parentheses, calls and arrays
    pub max_nesting_depth: usize,
    /// Emit references as ids into the context's [`AddressCache`]
    pub intern_references: bool,
}

impl Default for ParsingConfiguration {
    fn default() -> Self {
        Self {
            precision_and_rounding: PrecisionAndRoundingStrategy::DotNet,
            max_nesting_depth: 64,
            intern_references: false,
        }
    }
}

impl ParsingConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_precision_and_rounding(mut self, strategy: PrecisionAndRoundingStrategy) -> Self {
        self.precision_and_rounding = strategy;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_intern_references(mut self, intern: bool) -> Self {
        self.intern_references = intern;
        self
    }
}

/// One frame of the scope stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsingScope {
    /// The cell whose formula is being evaluated
    pub address: Option<CellKey>,
    /// Set while a SUBTOTAL or AGGREGATE call is executing in this frame
    pub is_subtotal: bool,
}

impl ParsingScope {
    pub fn new(address: Option<CellKey>) -> Self {
        Self {
            address,
            is_subtotal: false,
        }
    }
}

/// Stack of [`ParsingScope`]s; the parent of a frame is the one below it
#[derive(Debug, Clone, Default)]
pub struct ParsingScopes {
    stack: Vec<ParsingScope>,
}

impl ParsingScopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, address: Option<CellKey>) -> &mut ParsingScope {
        self.stack.push(ParsingScope::new(address));
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    pub fn pop(&mut self) -> Option<ParsingScope> {
        self.stack.pop()
    }

    pub fn current(&self) -> Option<&ParsingScope> {
        self.stack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ParsingScope> {
        self.stack.last_mut()
    }

    /// The frame below the current one
    pub fn parent(&self) -> Option<&ParsingScope> {
        self.stack.iter().rev().nth(1)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// State of one formula evaluation
pub struct ParsingContext<'a> {
    provider: &'a dyn ExcelDataProvider,
    registry: &'a FunctionRegistry,
    configuration: ParsingConfiguration,
    default_sheet: usize,
    pub scopes: ParsingScopes,
    pub subtotal_addresses: SubtotalAddresses,
    pub address_cache: AddressCache,
}

impl<'a> ParsingContext<'a> {
    /// A context using the built-in functions and default configuration
    pub fn new(provider: &'a dyn ExcelDataProvider) -> Self {
        Self {
            provider,
            registry: FunctionRegistry::global(),
            configuration: ParsingConfiguration::default(),
            default_sheet: 0,
            scopes: ParsingScopes::new(),
            subtotal_addresses: SubtotalAddresses::default(),
            address_cache: AddressCache::new(),
        }
    }

    pub fn with_configuration(mut self, configuration: ParsingConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_registry(mut self, registry: &'a FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sheet that unqualified references resolve against when no cell
    /// scope is active
    pub fn with_sheet(mut self, sheet: usize) -> Self {
        self.default_sheet = sheet;
        self
    }

    /// Continue a calculation run with the hosts registered so far
    pub fn with_subtotal_addresses(mut self, addresses: SubtotalAddresses) -> Self {
        self.subtotal_addresses = addresses;
        self
    }

    /// Hand the registered hosts on to the next context of the run
    pub fn into_subtotal_addresses(self) -> SubtotalAddresses {
        self.subtotal_addresses
    }

    pub fn provider(&self) -> &'a dyn ExcelDataProvider {
        self.provider
    }

    pub fn registry(&self) -> &'a FunctionRegistry {
        self.registry
    }

    pub fn configuration(&self) -> &ParsingConfiguration {
        &self.configuration
    }

    /// Cell of the innermost scope that has one
    pub fn current_cell(&self) -> Option<CellKey> {
        self.scopes.current().and_then(|scope| scope.address)
    }

    pub fn current_sheet(&self) -> usize {
        self.current_cell()
            .map_or(self.default_sheet, |cell| cell.sheet)
    }

    /// Record the current cell as a SUBTOTAL/AGGREGATE host
    pub fn register_subtotal_host(&mut self) {
        if let Some(cell) = self.current_cell() {
            let id = self.provider.get_cell_id(cell.sheet, cell.row, cell.col);
            self.subtotal_addresses.insert(id);
        }
    }

    /// True when the enclosing call frame belongs to a SUBTOTAL/AGGREGATE
    pub fn is_nested_in_subtotal(&self) -> bool {
        self.scopes.parent().is_some_and(|scope| scope.is_subtotal)
    }

    /// Resolve an address on a named worksheet, or on the current sheet
    ///
    /// The sheet prefix inside `address` wins over `worksheet`.
    pub fn get_range(
        &self,
        worksheet: Option<&str>,
        address: &str,
    ) -> FormulaResult<RangeInfo<'a>> {
        let sheet = self.current_sheet();
        match worksheet {
            Some(name) if !address.contains('!') => {
                let qualified = format!("'{}'!{}", name.replace('\'', "''"), address);
                RangeInfo::resolve(self.provider, sheet, &qualified)
            }
            _ => RangeInfo::resolve(self.provider, sheet, address),
        }
    }

    /// Apply the configured rounding to a function result
    pub fn apply_precision(&self, result: CompileResult<'a>) -> CompileResult<'a> {
        match (self.configuration.precision_and_rounding, &result.result) {
            (PrecisionAndRoundingStrategy::Excel, FormulaValue::Number(n)) => {
                let subtotal = result.is_result_of_subtotal;
                let mut rounded = CompileResult::number(round_to_significant_fig(*n, 15, true));
                rounded.is_result_of_subtotal = subtotal;
                rounded
            }
            _ => result,
        }
    }
}
