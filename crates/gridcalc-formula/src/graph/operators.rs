//! Binary operators and their scalar semantics

use std::cmp::Ordering;
use std::fmt;

use crate::convert::{to_number, to_text};
use crate::value::FormulaValue;
use gridcalc_core::CellError;

/// Operator joining a node to its right neighbour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Concat,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Operator {
    /// Number of precedence levels, tightest first
    pub const LEVELS: u8 = 5;

    /// Precedence level; 0 binds tightest
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Power => 0,
            Operator::Multiply | Operator::Divide => 1,
            Operator::Add | Operator::Subtract => 2,
            Operator::Concat => 3,
            Operator::Equal
            | Operator::NotEqual
            | Operator::Less
            | Operator::LessEqual
            | Operator::Greater
            | Operator::GreaterEqual => 4,
        }
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 4
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Power => "^",
            Operator::Concat => "&",
            Operator::Equal => "=",
            Operator::NotEqual => "<>",
            Operator::Less => "<",
            Operator::LessEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterEqual => ">=",
        }
    }

    /// Apply the operator to two scalar operands
    ///
    /// Errors in the left operand win over errors in the right one.
    pub fn apply(self, left: &FormulaValue<'_>, right: &FormulaValue<'_>) -> FormulaValue<'static> {
        let outcome = match self {
            Operator::Concat => concat(left, right),
            op if op.is_comparison() => compare(op, left, right),
            op => arithmetic(op, left, right),
        };
        outcome.unwrap_or_else(FormulaValue::Error)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn arithmetic(
    op: Operator,
    left: &FormulaValue<'_>,
    right: &FormulaValue<'_>,
) -> Result<FormulaValue<'static>, CellError> {
    let l = to_number(left)?;
    let r = to_number(right)?;
    let result = match op {
        Operator::Add => l + r,
        Operator::Subtract => l - r,
        Operator::Multiply => l * r,
        Operator::Divide => {
            if r == 0.0 {
                return Err(CellError::Div0);
            }
            l / r
        }
        Operator::Power => power(l, r)?,
        _ => return Err(CellError::Value),
    };
    if result.is_finite() {
        Ok(FormulaValue::Number(result))
    } else {
        Err(CellError::Num)
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, CellError> {
    if base == 0.0 && exponent == 0.0 {
        return Err(CellError::Num);
    }
    if base == 0.0 && exponent < 0.0 {
        return Err(CellError::Div0);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(CellError::Num);
    }
    Ok(base.powf(exponent))
}

fn concat(
    left: &FormulaValue<'_>,
    right: &FormulaValue<'_>,
) -> Result<FormulaValue<'static>, CellError> {
    let mut text = to_text(left)?;
    text.push_str(&to_text(right)?);
    Ok(FormulaValue::String(text))
}

fn compare(
    op: Operator,
    left: &FormulaValue<'_>,
    right: &FormulaValue<'_>,
) -> Result<FormulaValue<'static>, CellError> {
    if let Some(e) = left.get_error().or_else(|| right.get_error()) {
        return Err(e);
    }
    let ordering = compare_values(left, right).ok_or(CellError::Value)?;
    let result = match op {
        Operator::Equal => ordering == Ordering::Equal,
        Operator::NotEqual => ordering != Ordering::Equal,
        Operator::Less => ordering == Ordering::Less,
        Operator::LessEqual => ordering != Ordering::Greater,
        Operator::Greater => ordering == Ordering::Greater,
        Operator::GreaterEqual => ordering != Ordering::Less,
        _ => return Err(CellError::Value),
    };
    Ok(FormulaValue::Boolean(result))
}

fn type_rank(value: &FormulaValue<'_>) -> Option<u8> {
    match value {
        FormulaValue::Number(_) => Some(0),
        FormulaValue::String(_) => Some(1),
        FormulaValue::Boolean(_) => Some(2),
        _ => None,
    }
}

/// Excel ordering of two scalars
///
/// Numbers sort before text and text before booleans; text compares
/// case-insensitively. A blank takes the other side's zero value, so it
/// equals 0, "" and FALSE. Errors, ranges and arrays have no order.
pub fn compare_values(left: &FormulaValue<'_>, right: &FormulaValue<'_>) -> Option<Ordering> {
    match (left, right) {
        (FormulaValue::Empty, FormulaValue::Empty) => Some(Ordering::Equal),
        (FormulaValue::Empty, other) => compare_values(&blank_like(other)?, other),
        (other, FormulaValue::Empty) => compare_values(other, &blank_like(other)?),
        (FormulaValue::Number(a), FormulaValue::Number(b)) => a.partial_cmp(b),
        (FormulaValue::String(a), FormulaValue::String(b)) => {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        }
        (FormulaValue::Boolean(a), FormulaValue::Boolean(b)) => Some(a.cmp(b)),
        (a, b) => Some(type_rank(a)?.cmp(&type_rank(b)?)),
    }
}

fn blank_like(value: &FormulaValue<'_>) -> Option<FormulaValue<'static>> {
    match value {
        FormulaValue::Number(_) => Some(FormulaValue::Number(0.0)),
        FormulaValue::String(_) => Some(FormulaValue::String(String::new())),
        FormulaValue::Boolean(_) => Some(FormulaValue::Boolean(false)),
        _ => None,
    }
}
