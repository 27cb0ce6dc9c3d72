//! Formula parsing and evaluation entry points

use crate::context::{ParsingConfiguration, ParsingContext};
use crate::dependency::CellKey;
use crate::error::FormulaResult;
use crate::graph::{compile_chain, ExpressionGraph, GraphBuilder};
use crate::provider::AddressCache;
use crate::value::CompileResult;

/// Parse formula text with the default configuration
///
/// # Example
/// ```rust
/// use gridcalc_formula::parse_formula;
///
/// let graph = parse_formula("=SUM(A1:A10)*2").unwrap();
/// assert_eq!(graph.function_names().collect::<Vec<_>>(), vec!["SUM"]);
/// ```
pub fn parse_formula(formula: &str) -> FormulaResult<ExpressionGraph> {
    parse_formula_with(formula, &ParsingConfiguration::default(), None)
}

/// Parse formula text, interning references into `cache` when the
/// configuration asks for it
pub fn parse_formula_with(
    formula: &str,
    configuration: &ParsingConfiguration,
    cache: Option<&mut AddressCache>,
) -> FormulaResult<ExpressionGraph> {
    GraphBuilder::new(formula, configuration, cache).build()
}

/// Evaluate a parsed formula
///
/// The graph is left untouched; compilation works on a copy.
pub fn evaluate<'a>(
    graph: &ExpressionGraph,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    let mut working = graph.clone();
    let root = working.root();
    compile_chain(&mut working, root, ctx)
}

/// Evaluate a parsed formula as the content of `cell`
///
/// Relative sheet resolution, implicit intersection and SUBTOTAL host
/// registration all use `cell`.
pub fn evaluate_at<'a>(
    graph: &ExpressionGraph,
    ctx: &mut ParsingContext<'a>,
    cell: CellKey,
) -> FormulaResult<CompileResult<'a>> {
    ctx.scopes.push(Some(cell));
    let result = evaluate(graph, ctx);
    ctx.scopes.pop();
    result
}

/// Parse and evaluate in one step, using the context's configuration
/// and address cache
pub fn evaluate_formula<'a>(
    formula: &str,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    let configuration = ctx.configuration().clone();
    let graph = parse_formula_with(formula, &configuration, Some(&mut ctx.address_cache))?;
    evaluate(&graph, ctx)
}
