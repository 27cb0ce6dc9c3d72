//! Expression graph
//!
//! A parsed formula is an arena of [`ExpressionNode`]s. Operands at one
//! nesting level form a doubly linked chain; each node carries the operator
//! that joins it to its `next` neighbour. Parentheses, function arguments and
//! array elements hold the heads of their own chains.
//!
//! Compilation rewrites chains in place: a [`CompileStrategy`] merges a node
//! with its right neighbour, one precedence level at a time, until a single
//! node remains.

mod builder;
mod compiler;
mod operators;
mod strategy;

pub use builder::GraphBuilder;
pub use compiler::{compile_chain, compile_node};
pub use operators::{compare_values, Operator};
pub use strategy::{
    CompileStrategy, CompileStrategyFactory, DefaultCompileStrategy, StringConcatStrategy,
};

use crate::error::{FormulaError, FormulaResult};
use crate::value::FormulaValue;
use gridcalc_core::CellRange;

/// Index of a node in its [`ExpressionGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node evaluates
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Constant(FormulaValue<'static>),
    /// Inline reference; `sheet` is the unquoted sheet name
    Reference {
        sheet: Option<String>,
        range: CellRange,
    },
    /// Reference interned into an [`AddressCache`](crate::AddressCache)
    CachedReference(u32),
    /// Defined name; names are not supported and evaluate to `#NAME?`
    Name(String),
    /// Function call with the head of each argument chain
    Function { name: String, args: Vec<NodeId> },
    /// Parenthesized chain
    Group(NodeId),
    /// Array literal, rows of element chain heads
    Array(Vec<Vec<NodeId>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionNode {
    pub kind: ExpressionKind,
    /// Operator joining this node to `next`
    pub operator: Option<Operator>,
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    /// Unary minus, applied when the node is compiled
    pub negated: bool,
    /// Number of postfix `%` signs
    pub percent: u8,
}

impl ExpressionNode {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            operator: None,
            prev: None,
            next: None,
            negated: false,
            percent: 0,
        }
    }

    pub fn constant(value: FormulaValue<'static>) -> Self {
        Self::new(ExpressionKind::Constant(value))
    }
}

/// Arena holding every node of a parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionGraph {
    nodes: Vec<ExpressionNode>,
    root: NodeId,
}

impl ExpressionGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: NodeId(0),
        }
    }

    /// Head of the top-level chain
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, node: ExpressionNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &ExpressionNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ExpressionNode {
        &mut self.nodes[id.0]
    }

    /// Join `left` to `right` with `operator`
    pub fn link(&mut self, left: NodeId, operator: Operator, right: NodeId) {
        let l = self.node_mut(left);
        l.operator = Some(operator);
        l.next = Some(right);
        self.node_mut(right).prev = Some(left);
    }

    /// Replace `left` and its right neighbour by `left` holding `value`
    ///
    /// `left` takes over the neighbour's operator and successor; the
    /// neighbour is detached from the chain.
    pub fn merge_into(&mut self, left: NodeId, value: FormulaValue<'static>) -> FormulaResult<()> {
        let right = self
            .node(left)
            .next
            .ok_or_else(|| FormulaError::Graph(format!("node {} has no successor", left.0)))?;
        let (operator, successor) = {
            let r = self.node_mut(right);
            let detached = (r.operator.take(), r.next.take());
            r.prev = None;
            detached
        };

        let l = self.node_mut(left);
        l.kind = ExpressionKind::Constant(value);
        l.negated = false;
        l.percent = 0;
        l.operator = operator;
        l.next = successor;
        if let Some(s) = successor {
            self.node_mut(s).prev = Some(left);
        }
        Ok(())
    }

    /// Put `new` where `old` is in its chain and detach `old`
    pub fn splice_replace(&mut self, old: NodeId, new: NodeId) {
        let (prev, next, operator) = {
            let o = self.node_mut(old);
            (o.prev.take(), o.next.take(), o.operator.take())
        };

        let n = self.node_mut(new);
        n.prev = prev;
        n.next = next;
        n.operator = operator;
        if let Some(p) = prev {
            self.node_mut(p).next = Some(new);
        }
        if let Some(s) = next {
            self.node_mut(s).prev = Some(new);
        }
    }

    /// Check the links of the chain starting at `head`
    ///
    /// Every `next` must point back through `prev`, the head must have no
    /// predecessor and every node but the last must carry an operator.
    pub fn validate_chain(&self, head: NodeId) -> FormulaResult<()> {
        if let Some(prev) = self.node(head).prev {
            return Err(FormulaError::Graph(format!(
                "chain head {} has predecessor {}",
                head.0, prev.0
            )));
        }
        let mut current = head;
        let mut steps = 0;
        while let Some(next) = self.node(current).next {
            if self.node(next).prev != Some(current) {
                return Err(FormulaError::Graph(format!(
                    "node {} does not link back to {}",
                    next.0, current.0
                )));
            }
            if self.node(current).operator.is_none() {
                return Err(FormulaError::Graph(format!(
                    "node {} has a successor but no operator",
                    current.0
                )));
            }
            steps += 1;
            if steps > self.nodes.len() {
                return Err(FormulaError::Graph("cycle in expression chain".into()));
            }
            current = next;
        }
        Ok(())
    }

    /// Validate every chain reachable from the root
    pub fn validate(&self) -> FormulaResult<()> {
        let mut heads = vec![self.root];
        while let Some(head) = heads.pop() {
            self.validate_chain(head)?;
            let mut current = Some(head);
            while let Some(id) = current {
                heads.extend(self.child_heads(id));
                current = self.node(id).next;
            }
        }
        Ok(())
    }

    fn child_heads(&self, id: NodeId) -> Vec<NodeId> {
        match &self.node(id).kind {
            ExpressionKind::Function { args, .. } => args.clone(),
            ExpressionKind::Group(head) => vec![*head],
            ExpressionKind::Array(rows) => rows.iter().flatten().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Inline references of the formula, in node order
    pub fn references(&self) -> impl Iterator<Item = (Option<&str>, CellRange)> + '_ {
        self.nodes.iter().filter_map(|node| match &node.kind {
            ExpressionKind::Reference { sheet, range } => Some((sheet.as_deref(), *range)),
            _ => None,
        })
    }

    /// Names of every function called by the formula
    pub fn function_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes.iter().filter_map(|node| match &node.kind {
            ExpressionKind::Function { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chain_of(values: &[f64]) -> (ExpressionGraph, Vec<NodeId>) {
        let mut graph = ExpressionGraph::new();
        let ids: Vec<_> = values
            .iter()
            .map(|&v| graph.add(ExpressionNode::constant(FormulaValue::Number(v))))
            .collect();
        for pair in ids.windows(2) {
            graph.link(pair[0], Operator::Add, pair[1]);
        }
        graph.set_root(ids[0]);
        (graph, ids)
    }

    #[test]
    fn test_merge_keeps_chain_valid() {
        let (mut graph, ids) = chain_of(&[1.0, 2.0, 3.0]);
        graph.merge_into(ids[0], FormulaValue::Number(3.0)).unwrap();

        graph.validate_chain(ids[0]).unwrap();
        assert_eq!(graph.node(ids[0]).next, Some(ids[2]));
        assert_eq!(graph.node(ids[2]).prev, Some(ids[0]));
        assert_eq!(graph.node(ids[1]).prev, None);
    }

    #[test]
    fn test_splice_replace_repoints_neighbours() {
        let (mut graph, ids) = chain_of(&[1.0, 2.0, 3.0]);
        let new = graph.add(ExpressionNode::constant(FormulaValue::String("2".into())));
        graph.splice_replace(ids[1], new);

        graph.validate_chain(ids[0]).unwrap();
        assert_eq!(graph.node(ids[0]).next, Some(new));
        assert_eq!(graph.node(ids[2]).prev, Some(new));
        assert_eq!(graph.node(new).operator, Some(Operator::Add));
        assert_eq!(graph.node(ids[1]).next, None);
    }

    #[test]
    fn test_validate_chain_detects_broken_links() {
        let (mut graph, ids) = chain_of(&[1.0, 2.0]);
        graph.node_mut(ids[1]).prev = None;
        assert!(matches!(
            graph.validate_chain(ids[0]),
            Err(FormulaError::Graph(_))
        ));
    }
}
