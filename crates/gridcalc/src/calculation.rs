//! Workbook calculation
//!
//! Evaluates every formula cell of a workbook in dependency order and stores
//! the results as the cells' cached values. One set of SUBTOTAL/AGGREGATE
//! host cells is carried through the whole run, so a host calculated earlier
//! is skipped by every later aggregation that covers it.
//!
//! # Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_value("A2", 20.0).unwrap();
//! sheet.set_cell_formula("A3", "=A1+A2").unwrap();
//!
//! let stats = workbook.calculate().unwrap();
//! assert_eq!(stats.formula_count, 1);
//! ```

use crate::{CellAddress, CellError, CellValue, Result, Workbook};
use gridcalc_formula::context::SubtotalAddresses;
use gridcalc_formula::{
    evaluate_at, parse_formula_with, CellKey, DependencyGraph, ExpressionGraph, FormulaResult,
    FunctionRegistry, ParsingConfiguration, ParsingContext, WorkbookDataProvider,
};
use std::collections::{HashMap, HashSet};

/// Options for workbook calculation
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Resolve circular references by iterating instead of storing `#REF!`
    pub iterative: bool,
    /// Maximum iterations for circular references (default: 100)
    pub max_iterations: u32,
    /// Largest change between iterations that counts as converged (default: 0.001)
    pub max_change: f64,
    /// Recalculate cells calling volatile functions (RAND, RANDBETWEEN).
    /// When off, volatile cells that already hold a result keep it.
    pub calculate_volatile: bool,
    /// Configuration used to parse and evaluate every formula
    pub parsing: ParsingConfiguration,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            iterative: false,
            max_iterations: 100,
            max_change: 0.001,
            calculate_volatile: true,
            parsing: ParsingConfiguration::default(),
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationStats {
    /// Number of formula cells that parsed
    pub formula_count: usize,
    /// Number of cells calculated
    pub cells_calculated: usize,
    /// Number of iterations performed
    pub iterations: u32,
    /// Number of cells sitting on a circular reference
    pub circular_references: usize,
    /// Number of cells calling a volatile function
    pub volatile_cells: usize,
    /// Unparseable formulas, failed evaluations and unresolved circular cells
    pub errors: usize,
    /// Whether iterative calculation converged
    pub converged: bool,
}

/// Extension trait for Workbook to add calculation methods
pub trait WorkbookCalculationExt {
    /// Calculate all formulas in the workbook with default options
    fn calculate(&mut self) -> Result<CalculationStats>;

    /// Calculate all formulas with custom options
    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<CalculationStats>;
}

impl WorkbookCalculationExt for Workbook {
    fn calculate(&mut self) -> Result<CalculationStats> {
        self.calculate_with_options(&CalculationOptions::default())
    }

    fn calculate_with_options(&mut self, options: &CalculationOptions) -> Result<CalculationStats> {
        let mut engine = CalculationEngine::new(options.clone());
        engine.calculate_all(self)
    }
}

struct CalculationEngine {
    options: CalculationOptions,
    dependency_graph: DependencyGraph,
    parsed_formulas: HashMap<CellKey, ExpressionGraph>,
    unparseable: Vec<CellKey>,
    volatile_cells: HashSet<CellKey>,
    circular_cells: HashSet<CellKey>,
    subtotal_addresses: SubtotalAddresses,
}

impl CalculationEngine {
    fn new(options: CalculationOptions) -> Self {
        Self {
            options,
            dependency_graph: DependencyGraph::new(),
            parsed_formulas: HashMap::new(),
            unparseable: Vec::new(),
            volatile_cells: HashSet::new(),
            circular_cells: HashSet::new(),
            subtotal_addresses: SubtotalAddresses::default(),
        }
    }

    fn calculate_all(&mut self, workbook: &mut Workbook) -> Result<CalculationStats> {
        let mut stats = CalculationStats::default();

        // Phase 1: parse every formula and link precedents to dependents
        self.collect_formulas(workbook, &mut stats);
        self.link_dependencies(workbook);
        for key in std::mem::take(&mut self.unparseable) {
            store_result(workbook, key, CellValue::Error(CellError::Value))?;
        }

        if stats.formula_count == 0 {
            return Ok(stats);
        }

        // Phase 2: cycles
        self.detect_circular_references();
        stats.circular_references = self.circular_cells.len();

        // Phase 3: evaluate, precedents first
        let order = self.calculation_order();
        if self.circular_cells.is_empty() || !self.options.iterative {
            self.calculate_cells_simple(workbook, &order, &mut stats)?;
        } else {
            self.calculate_cells_iterative(workbook, &order, &mut stats)?;
        }

        Ok(stats)
    }

    fn collect_formulas(&mut self, workbook: &Workbook, stats: &mut CalculationStats) {
        for (sheet_idx, sheet) in workbook.worksheets().enumerate() {
            for (row, col, formula_text) in sheet.formula_cells() {
                let cell_key = CellKey::new(sheet_idx, row, col);

                let graph = match parse_formula_with(formula_text, &self.options.parsing, None) {
                    Ok(graph) => graph,
                    Err(e) => {
                        log::warn!(
                            "Failed to parse formula at {}!{}: {}",
                            sheet.name(),
                            CellAddress::new(row, col),
                            e
                        );
                        self.unparseable.push(cell_key);
                        stats.errors += 1;
                        continue;
                    }
                };

                if contains_volatile_function(&graph) {
                    self.volatile_cells.insert(cell_key);
                }
                self.parsed_formulas.insert(cell_key, graph);
                stats.formula_count += 1;
            }
        }
        stats.volatile_cells = self.volatile_cells.len();
    }

    /// Precedents are limited to formula cells; constants never need ordering
    fn link_dependencies(&mut self, workbook: &Workbook) {
        let formula_cells: Vec<CellKey> = self.parsed_formulas.keys().copied().collect();
        for (&cell_key, graph) in &self.parsed_formulas {
            let precedents = formula_precedents(graph, cell_key.sheet, workbook, &formula_cells);
            self.dependency_graph.set_precedents(cell_key, precedents);
        }
    }

    fn detect_circular_references(&mut self) {
        for &cell_key in self.parsed_formulas.keys() {
            if self.dependency_graph.has_circular_reference(cell_key) {
                self.circular_cells.insert(cell_key);
            }
        }
    }

    fn calculation_order(&self) -> Vec<CellKey> {
        let all_cells: Vec<CellKey> = self.parsed_formulas.keys().copied().collect();
        let mut order = self.dependency_graph.get_recalc_order(&all_cells);
        order.retain(|k| self.parsed_formulas.contains_key(k));
        order
    }

    fn keeps_cached_volatile(&self, workbook: &Workbook, cell_key: CellKey) -> bool {
        !self.options.calculate_volatile
            && self.volatile_cells.contains(&cell_key)
            && matches!(
                workbook
                    .worksheet(cell_key.sheet)
                    .and_then(|ws| ws.cell_at(cell_key.row, cell_key.col)),
                Some(CellValue::Formula {
                    cached_value: Some(_),
                    ..
                })
            )
    }

    fn calculate_cells_simple(
        &mut self,
        workbook: &mut Workbook,
        order: &[CellKey],
        stats: &mut CalculationStats,
    ) -> Result<()> {
        for &cell_key in order {
            let Some(graph) = self.parsed_formulas.get(&cell_key) else {
                continue;
            };

            if self.circular_cells.contains(&cell_key) {
                log::warn!(
                    "Circular reference at sheet {} {}",
                    cell_key.sheet,
                    CellAddress::new(cell_key.row, cell_key.col)
                );
                store_result(workbook, cell_key, CellValue::Error(CellError::Ref))?;
                stats.errors += 1;
                continue;
            }

            if self.keeps_cached_volatile(workbook, cell_key) {
                continue;
            }

            let result = evaluate_cell(
                workbook,
                cell_key,
                graph,
                &self.options.parsing,
                &mut self.subtotal_addresses,
            );
            let value = match result {
                Ok(value) => value,
                Err(e) => {
                    log::warn!(
                        "Evaluation failed at sheet {} {}: {}",
                        cell_key.sheet,
                        CellAddress::new(cell_key.row, cell_key.col),
                        e
                    );
                    stats.errors += 1;
                    CellValue::Error(CellError::Value)
                }
            };
            store_result(workbook, cell_key, value)?;
            stats.cells_calculated += 1;
        }

        stats.iterations = 1;
        stats.converged = true;
        Ok(())
    }

    fn calculate_cells_iterative(
        &mut self,
        workbook: &mut Workbook,
        order: &[CellKey],
        stats: &mut CalculationStats,
    ) -> Result<()> {
        // Starting point: whatever the circular cells hold now, blanks as 0
        let mut prev_values: HashMap<CellKey, f64> = self
            .circular_cells
            .iter()
            .map(|&key| {
                let current = workbook
                    .worksheet(key.sheet)
                    .and_then(|ws| ws.get_calculated_value_at(key.row, key.col))
                    .and_then(CellValue::as_number)
                    .unwrap_or(0.0);
                (key, current)
            })
            .collect();
        let mut converged = false;

        for iteration in 0..self.options.max_iterations {
            stats.iterations = iteration + 1;
            let mut max_change: f64 = 0.0;

            for &cell_key in order {
                let Some(graph) = self.parsed_formulas.get(&cell_key) else {
                    continue;
                };
                if self.keeps_cached_volatile(workbook, cell_key) {
                    continue;
                }

                let value = evaluate_cell(
                    workbook,
                    cell_key,
                    graph,
                    &self.options.parsing,
                    &mut self.subtotal_addresses,
                )
                .unwrap_or_else(|e| {
                    log::warn!(
                        "Evaluation failed at sheet {} {}: {}",
                        cell_key.sheet,
                        CellAddress::new(cell_key.row, cell_key.col),
                        e
                    );
                    CellValue::Error(CellError::Value)
                });

                if self.circular_cells.contains(&cell_key) {
                    if let CellValue::Number(new_val) = value {
                        if let Some(old_val) = prev_values.insert(cell_key, new_val) {
                            max_change = max_change.max((new_val - old_val).abs());
                        }
                    }
                }

                store_result(workbook, cell_key, value)?;
                if iteration == 0 {
                    stats.cells_calculated += 1;
                }
            }

            if max_change <= self.options.max_change {
                converged = true;
                break;
            }
        }

        if !converged {
            log::warn!(
                "Iterative calculation stopped after {} iterations without converging",
                stats.iterations
            );
        }
        stats.converged = converged;
        Ok(())
    }
}

/// Evaluate one formula cell against the current state of the workbook
///
/// The run's SUBTOTAL/AGGREGATE hosts move into the cell's context and
/// back out again, including the host this cell may have registered.
fn evaluate_cell(
    workbook: &Workbook,
    cell_key: CellKey,
    graph: &ExpressionGraph,
    parsing: &ParsingConfiguration,
    subtotal_addresses: &mut SubtotalAddresses,
) -> FormulaResult<CellValue> {
    let provider = WorkbookDataProvider::new(workbook);
    let mut ctx = ParsingContext::new(&provider)
        .with_configuration(parsing.clone())
        .with_sheet(cell_key.sheet)
        .with_subtotal_addresses(std::mem::take(subtotal_addresses));
    let result = evaluate_at(graph, &mut ctx, cell_key).map(|result| result.to_cell_value());
    *subtotal_addresses = ctx.into_subtotal_addresses();
    result
}

fn store_result(workbook: &mut Workbook, cell_key: CellKey, value: CellValue) -> Result<()> {
    let sheet_count = workbook.sheet_count();
    let sheet = workbook
        .worksheet_mut(cell_key.sheet)
        .ok_or(gridcalc_core::Error::SheetOutOfBounds(cell_key.sheet, sheet_count))?;
    sheet.set_formula_result(cell_key.row, cell_key.col, value)?;
    Ok(())
}

/// Formula cells read by `graph`
///
/// References to unknown sheets are dropped; they evaluate to `#REF!`
/// without needing any ordering.
fn formula_precedents(
    graph: &ExpressionGraph,
    current_sheet: usize,
    workbook: &Workbook,
    formula_cells: &[CellKey],
) -> Vec<CellKey> {
    let mut precedents = Vec::new();
    for (sheet_name, range) in graph.references() {
        let sheet_idx = match sheet_name {
            Some(name) => match workbook.sheet_index(name) {
                Some(idx) => idx,
                None => continue,
            },
            None => current_sheet,
        };
        precedents.extend(
            formula_cells
                .iter()
                .filter(|key| key.sheet == sheet_idx && range.contains(key.row, key.col))
                .copied(),
        );
    }
    precedents
}

/// Check if a formula calls any volatile function
fn contains_volatile_function(graph: &ExpressionGraph) -> bool {
    let registry = FunctionRegistry::global();
    graph
        .function_names()
        .any(|name| registry.get(name).is_some_and(|def| def.volatile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_formula::parse_formula;
    use pretty_assertions::assert_eq;

    fn calculated(workbook: &Workbook, sheet: usize, address: &str) -> CellValue {
        let addr = CellAddress::parse(address).unwrap();
        workbook
            .worksheet(sheet)
            .unwrap()
            .get_calculated_value_at(addr.row, addr.col)
            .cloned()
            .unwrap_or(CellValue::Empty)
    }

    #[test]
    fn test_simple_calculation() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 10.0).unwrap();
        sheet.set_cell_value("A2", 20.0).unwrap();
        sheet.set_cell_formula("A3", "=A1+A2").unwrap();

        let stats = workbook.calculate().unwrap();

        assert_eq!(stats.formula_count, 1);
        assert_eq!(stats.cells_calculated, 1);
        assert_eq!(stats.errors, 0);
        assert_eq!(calculated(&workbook, 0, "A3"), CellValue::Number(30.0));
    }

    #[test]
    fn test_chain_calculation() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        // Declared out of order on purpose
        sheet.set_cell_formula("A4", "=A3*A1").unwrap();
        sheet.set_cell_formula("A3", "=A2+10").unwrap();
        sheet.set_cell_formula("A2", "=A1*2").unwrap();
        sheet.set_cell_value("A1", 5.0).unwrap();

        let stats = workbook.calculate().unwrap();

        assert_eq!(stats.formula_count, 3);
        assert_eq!(stats.cells_calculated, 3);
        assert_eq!(calculated(&workbook, 0, "A2"), CellValue::Number(10.0));
        assert_eq!(calculated(&workbook, 0, "A3"), CellValue::Number(20.0));
        assert_eq!(calculated(&workbook, 0, "A4"), CellValue::Number(100.0));
    }

    #[test]
    fn test_range_precedents_are_ordered() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_formula("B1", "=SUM(A:A)").unwrap();
        sheet.set_cell_value("A1", 1.0).unwrap();
        sheet.set_cell_formula("A2", "=A1*3").unwrap();

        workbook.calculate().unwrap();

        assert_eq!(calculated(&workbook, 0, "B1"), CellValue::Number(4.0));
    }

    #[test]
    fn test_circular_reference_detection() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_formula("A1", "=B1").unwrap();
        sheet.set_cell_formula("B1", "=A1").unwrap();
        sheet.set_cell_formula("C1", "=1+1").unwrap();

        let stats = workbook.calculate().unwrap();

        assert_eq!(stats.circular_references, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(calculated(&workbook, 0, "A1"), CellValue::Error(CellError::Ref));
        assert_eq!(calculated(&workbook, 0, "C1"), CellValue::Number(2.0));
    }

    #[test]
    fn test_iterative_calculation() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        // Fixed point at 1
        sheet.set_cell_formula("B1", "=A1").unwrap();
        sheet.set_cell_formula("A1", "=B1/2+0.5").unwrap();

        let options = CalculationOptions {
            iterative: true,
            max_iterations: 100,
            max_change: 0.0001,
            ..Default::default()
        };
        let stats = workbook.calculate_with_options(&options).unwrap();

        assert!(stats.converged);
        assert!(stats.iterations > 1);
        match calculated(&workbook, 0, "A1") {
            CellValue::Number(n) => assert!((n - 1.0).abs() < 0.001, "{}", n),
            other => panic!("expected a number, got {:?}", other),
        }
    }

    #[test]
    fn test_unparseable_formula_stores_value_error() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_formula("A1", "=SUM(1").unwrap();

        let stats = workbook.calculate().unwrap();

        assert_eq!(stats.formula_count, 0);
        assert_eq!(stats.errors, 1);
        assert_eq!(calculated(&workbook, 0, "A1"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_volatile_function_detection() {
        let graph = parse_formula("=RAND()").unwrap();
        assert!(contains_volatile_function(&graph));

        let graph = parse_formula("=IF(A1>0,RANDBETWEEN(1,6),0)").unwrap();
        assert!(contains_volatile_function(&graph));

        let graph = parse_formula("=SUM(A1:A10)").unwrap();
        assert!(!contains_volatile_function(&graph));
    }

    #[test]
    fn test_volatile_cells_keep_their_value_when_skipped() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_formula("A1", "=RAND()").unwrap();
        sheet.set_cell_formula("A2", "=A1*2").unwrap();

        let stats = workbook.calculate().unwrap();
        assert_eq!(stats.volatile_cells, 1);
        let first = calculated(&workbook, 0, "A1");

        let options = CalculationOptions {
            calculate_volatile: false,
            ..Default::default()
        };
        let stats = workbook.calculate_with_options(&options).unwrap();

        assert_eq!(stats.cells_calculated, 1);
        assert_eq!(calculated(&workbook, 0, "A1"), first);
    }

    #[test]
    fn test_multiple_sheets() {
        let mut workbook = Workbook::new();
        workbook
            .worksheet_mut(0)
            .unwrap()
            .set_cell_value("A1", 100.0)
            .unwrap();
        workbook.add_worksheet_with_name("Sheet2").unwrap();
        let sheet2 = workbook.worksheet_mut(1).unwrap();
        sheet2.set_cell_value("A1", 50.0).unwrap();
        sheet2.set_cell_formula("A2", "=Sheet1!A1+A1").unwrap();

        let stats = workbook.calculate().unwrap();

        assert_eq!(stats.formula_count, 1);
        assert_eq!(calculated(&workbook, 1, "A2"), CellValue::Number(150.0));
    }

    #[test]
    fn test_formula_precedents() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet_with_name("Data").unwrap();
        let formula_cells = [
            CellKey::new(0, 0, 0),
            CellKey::new(0, 2, 0),
            CellKey::new(1, 0, 0),
        ];

        let graph = parse_formula("=SUM(A1:A5)").unwrap();
        let precedents = formula_precedents(&graph, 0, &workbook, &formula_cells);
        assert_eq!(precedents, vec![CellKey::new(0, 0, 0), CellKey::new(0, 2, 0)]);

        let graph = parse_formula("=Data!A1+Missing!A1+B7").unwrap();
        let precedents = formula_precedents(&graph, 0, &workbook, &formula_cells);
        assert_eq!(precedents, vec![CellKey::new(1, 0, 0)]);
    }

    #[test]
    fn test_subtotal_hosts_carry_across_cells() {
        let mut workbook = Workbook::new();
        let sheet = workbook.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", 10.0).unwrap();
        sheet.set_cell_value("A2", 20.0).unwrap();
        sheet.set_cell_value("A3", 30.0).unwrap();
        sheet.set_cell_formula("A4", "=SUBTOTAL(9,A1:A3)").unwrap();
        sheet.set_cell_formula("A5", "=SUBTOTAL(9,A1:A4)").unwrap();
        sheet.set_cell_formula("A6", "=SUM(A1:A4)").unwrap();

        workbook.calculate().unwrap();

        assert_eq!(calculated(&workbook, 0, "A4"), CellValue::Number(60.0));
        assert_eq!(calculated(&workbook, 0, "A5"), CellValue::Number(60.0));
        assert_eq!(calculated(&workbook, 0, "A6"), CellValue::Number(120.0));
    }
}
