//! Expression compiler
//!
//! Chains are reduced by walking them once per precedence level and merging
//! neighbours left to right. Nodes are compiled lazily, the first time a
//! merge or the caller needs their value.

use log::debug;

use super::strategy::CompileStrategyFactory;
use super::{ExpressionGraph, ExpressionKind, NodeId, Operator};
use crate::context::ParsingContext;
use crate::convert::to_number;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionConfig;
use crate::range::RangeInfo;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

/// Reduce the chain starting at `head` to a single result
pub fn compile_chain<'a>(
    graph: &mut ExpressionGraph,
    head: NodeId,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    let mut head = head;
    for level in 0..Operator::LEVELS {
        let mut current = head;
        while let Some(next) = graph.node(current).next {
            let operator = graph.node(current).operator.ok_or_else(|| {
                FormulaError::Graph(format!("node {} has no operator", current.index()))
            })?;
            if operator.precedence() != level {
                current = next;
                continue;
            }
            let merged = CompileStrategyFactory::create(operator).compile(graph, current, ctx)?;
            if graph.node(merged).prev.is_none() {
                head = merged;
            }
            current = merged;
        }
        #[cfg(debug_assertions)]
        graph.validate_chain(head)?;
    }
    compile_node(graph, head, ctx)
}

/// Evaluate a single node, applying its unary minus and percent flags
///
/// Failures that render as cell errors become error results here; only
/// parse and graph errors are returned as `Err`.
pub fn compile_node<'a>(
    graph: &mut ExpressionGraph,
    id: NodeId,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    let result = match compile_kind(graph, id, ctx) {
        Ok(result) => result,
        Err(e) => match e.as_cell_error() {
            Some(cell_error) => CompileResult::error(cell_error),
            None => return Err(e),
        },
    };

    let node = graph.node(id);
    if !node.negated && node.percent == 0 {
        return Ok(result);
    }
    let (negated, percent) = (node.negated, node.percent);
    let scalar = to_scalar(result.result, ctx);
    Ok(match to_number(&scalar) {
        Ok(mut n) => {
            if negated {
                n = -n;
            }
            for _ in 0..percent {
                n /= 100.0;
            }
            CompileResult::number(n)
        }
        Err(e) => CompileResult::error(e),
    })
}

/// Evaluate a node as the scalar operand of a binary operator
pub(crate) fn compile_operand<'a>(
    graph: &mut ExpressionGraph,
    id: NodeId,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<FormulaValue<'static>> {
    let result = compile_node(graph, id, ctx)?;
    Ok(to_scalar(result.result, ctx))
}

/// Ranges resolve by implicit intersection with the current cell; arrays
/// are not valid operands
fn to_scalar(value: FormulaValue<'_>, ctx: &ParsingContext<'_>) -> FormulaValue<'static> {
    match value {
        FormulaValue::Range(range) => {
            let anchor = ctx
                .current_cell()
                .filter(|cell| cell.sheet == range.sheet())
                .map(|cell| (cell.row, cell.col));
            range.implicit_intersection(anchor)
        }
        FormulaValue::Array(_) => FormulaValue::Error(CellError::Value),
        other => other.into_scalar(),
    }
}

fn compile_kind<'a>(
    graph: &mut ExpressionGraph,
    id: NodeId,
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    match graph.node(id).kind.clone() {
        ExpressionKind::Constant(value) => Ok(CompileResult::new(value)),
        ExpressionKind::Reference { sheet, range } => {
            let sheet_index = match sheet {
                Some(name) => ctx
                    .provider()
                    .sheet_index(&name)
                    .ok_or(FormulaError::InvalidReference(name))?,
                None => ctx.current_sheet(),
            };
            let info = RangeInfo::new(ctx.provider(), sheet_index, range);
            Ok(CompileResult::new(FormulaValue::Range(info)))
        }
        ExpressionKind::CachedReference(key) => {
            let address = ctx
                .address_cache
                .get(key)
                .ok_or_else(|| FormulaError::InvalidReference(format!("address id {}", key)))?
                .to_string();
            let info = ctx.get_range(None, &address)?;
            Ok(CompileResult::new(FormulaValue::Range(info)))
        }
        ExpressionKind::Name(name) => {
            debug!("defined name {} is not supported", name);
            Ok(CompileResult::error(CellError::Name))
        }
        ExpressionKind::Function { name, args } => invoke_function(graph, &name, &args, ctx),
        ExpressionKind::Group(head) => compile_chain(graph, head, ctx),
        ExpressionKind::Array(rows) => {
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                let mut cells = Vec::with_capacity(row.len());
                for head in row {
                    let element = compile_chain(graph, head, ctx)?;
                    cells.push(to_scalar(element.result, ctx));
                }
                values.push(cells);
            }
            Ok(CompileResult::new(FormulaValue::Array(values)))
        }
    }
}

/// Look up, check arity, run the hook, evaluate arguments and execute
fn invoke_function<'a>(
    graph: &mut ExpressionGraph,
    name: &str,
    args: &[NodeId],
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<CompileResult<'a>> {
    let Some(def) = ctx.registry().get(name) else {
        debug!("unknown function {}", name);
        return Err(FormulaError::UnknownFunction(name.to_string()));
    };
    if let Err(e) = def.check_arity(args.len()) {
        debug!("{}", e);
        return Err(e);
    }

    let scoped = match def.before_invoke {
        Some(hook) => {
            let cell = ctx.current_cell();
            ctx.scopes.push(cell);
            hook(ctx);
            true
        }
        None => false,
    };

    let outcome = evaluate_arguments(graph, args, ctx)
        .and_then(|arguments| (def.implementation)(&arguments, ctx, FunctionConfig::default()));

    if scoped {
        ctx.scopes.pop();
    }

    let result = match outcome {
        Ok(result) => result,
        Err(e) => match e.as_cell_error() {
            Some(cell_error) => CompileResult::error(cell_error),
            None => return Err(e),
        },
    };
    Ok(ctx.apply_precision(result))
}

fn evaluate_arguments<'a>(
    graph: &mut ExpressionGraph,
    args: &[NodeId],
    ctx: &mut ParsingContext<'a>,
) -> FormulaResult<Vec<FunctionArgument<'a>>> {
    let mut arguments = Vec::with_capacity(args.len());
    for &head in args {
        arguments.push(compile_chain(graph, head, ctx)?.into_argument());
    }
    Ok(arguments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ParsingConfiguration;
    use crate::graph::GraphBuilder;
    use crate::provider::WorkbookDataProvider;
    use gridcalc_core::Workbook;
    use pretty_assertions::assert_eq;

    fn eval(formula: &str) -> FormulaValue<'static> {
        let wb = Workbook::new();
        let provider = WorkbookDataProvider::new(&wb);
        let mut ctx = ParsingContext::new(&provider);
        let mut graph = GraphBuilder::new(formula, &ParsingConfiguration::default(), None)
            .build()
            .unwrap();
        let root = graph.root();
        let result = compile_chain(&mut graph, root, &mut ctx).unwrap();
        graph.validate().unwrap();
        result.result.into_scalar()
    }

    #[test]
    fn test_precedence_levels() {
        assert_eq!(eval("=1+2*3"), FormulaValue::Number(7.0));
        assert_eq!(eval("=(1+2)*3"), FormulaValue::Number(9.0));
        assert_eq!(eval("=2*3^2"), FormulaValue::Number(18.0));
        assert_eq!(eval("=10-4-3"), FormulaValue::Number(3.0));
        assert_eq!(eval("=2^3^2"), FormulaValue::Number(64.0));
        assert_eq!(eval("=1+2=3"), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_unary_flags() {
        assert_eq!(eval("=-2^2"), FormulaValue::Number(4.0));
        assert_eq!(eval("=50%"), FormulaValue::Number(0.5));
        assert_eq!(eval("=--3"), FormulaValue::Number(3.0));
        assert_eq!(eval("=-(1+2)*2"), FormulaValue::Number(-6.0));
    }

    #[test]
    fn test_concat_binds_looser_than_arithmetic() {
        assert_eq!(
            eval("=\"a\"&1+2&TRUE"),
            FormulaValue::String("a3TRUE".into())
        );
        assert_eq!(eval("=1&2=\"12\""), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_unknown_function_is_name_error() {
        assert_eq!(eval("=NOPE(1)"), FormulaValue::Error(CellError::Name));
        assert_eq!(eval("=1+NOPE()"), FormulaValue::Error(CellError::Name));
    }

    #[test]
    fn test_arity_violation_is_value_error() {
        assert_eq!(eval("=ABS()"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=ABS(1,2)"), FormulaValue::Error(CellError::Value));
    }
}
