//! Local rewrites merging a node with its right neighbour

use log::trace;

use super::compiler::compile_operand;
use super::{ExpressionGraph, ExpressionNode, NodeId, Operator};
use crate::context::ParsingContext;
use crate::convert::to_text;
use crate::error::{FormulaError, FormulaResult};
use crate::value::FormulaValue;

/// One rewrite step of the expression compiler
///
/// `compile` merges `node` with its `next` neighbour using the operator on
/// `node` and returns the id of the node that now stands for both. The
/// chain must stay valid afterwards.
pub trait CompileStrategy: Sync {
    fn compile<'a>(
        &self,
        graph: &mut ExpressionGraph,
        node: NodeId,
        ctx: &mut ParsingContext<'a>,
    ) -> FormulaResult<NodeId>;
}

fn operands(graph: &ExpressionGraph, node: NodeId) -> FormulaResult<(Operator, NodeId)> {
    let n = graph.node(node);
    match (n.operator, n.next) {
        (Some(op), Some(next)) => Ok((op, next)),
        _ => Err(FormulaError::Graph(format!(
            "node {} has no operator to compile",
            node.index()
        ))),
    }
}

/// Compiles both operands to scalars and stores the result in the left node
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCompileStrategy;

impl CompileStrategy for DefaultCompileStrategy {
    fn compile<'a>(
        &self,
        graph: &mut ExpressionGraph,
        node: NodeId,
        ctx: &mut ParsingContext<'a>,
    ) -> FormulaResult<NodeId> {
        let (op, next) = operands(graph, node)?;
        let left = compile_operand(graph, node, ctx)?;
        let right = compile_operand(graph, next, ctx)?;
        let result = op.apply(&left, &right);
        trace!("merge {} {} {} -> {:?}", node.index(), op, next.index(), result);
        graph.merge_into(node, result)?;
        Ok(node)
    }
}

/// Compiles `&` by first replacing the left operand with its text form
///
/// The text lives in a fresh node spliced into the chain where the operand
/// was, which is then merged with the right neighbour.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringConcatStrategy;

impl CompileStrategy for StringConcatStrategy {
    fn compile<'a>(
        &self,
        graph: &mut ExpressionGraph,
        node: NodeId,
        ctx: &mut ParsingContext<'a>,
    ) -> FormulaResult<NodeId> {
        let (op, next) = operands(graph, node)?;
        let left = compile_operand(graph, node, ctx)?;
        let text = match to_text(&left) {
            Ok(text) => FormulaValue::String(text),
            Err(e) => FormulaValue::Error(e),
        };

        let replacement = graph.add(ExpressionNode::constant(text.clone()));
        graph.splice_replace(node, replacement);
        trace!("splice {} -> {} for {}", node.index(), replacement.index(), op);

        let right = compile_operand(graph, next, ctx)?;
        let result = op.apply(&text, &right);
        trace!(
            "merge {} {} {} -> {:?}",
            replacement.index(),
            op,
            next.index(),
            result
        );
        graph.merge_into(replacement, result)?;
        Ok(replacement)
    }
}

static DEFAULT_STRATEGY: DefaultCompileStrategy = DefaultCompileStrategy;
static CONCAT_STRATEGY: StringConcatStrategy = StringConcatStrategy;

/// Picks the strategy for an operator
pub struct CompileStrategyFactory;

impl CompileStrategyFactory {
    pub fn create(operator: Operator) -> &'static dyn CompileStrategy {
        match operator {
            Operator::Concat => &CONCAT_STRATEGY,
            _ => &DEFAULT_STRATEGY,
        }
    }
}
