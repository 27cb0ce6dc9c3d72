//! Criteria matching for SUMIF, COUNTIF, AVERAGEIF and related functions
//!
//! Excel criteria can be:
//! - A number, boolean or error value: exact match
//! - A text string: case-insensitive match (e.g., "apple")
//! - A comparison expression: ">5", ">=10", "<100", "<=50", "<>0", "=5"
//! - Wildcards: "*" matches any characters, "?" a single one, "~" escapes
//! - An operator without operand: "=" matches blank cells, "<>" non-blank ones

use std::cmp::Ordering;

use lazy_regex::regex_captures;
use regex::{Regex, RegexBuilder};

use crate::convert::{try_parse_date_string, try_parse_numeric};
use crate::value::FormulaValue;
use gridcalc_core::CellError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl ComparisonOp {
    fn parse(symbol: &str) -> Self {
        match symbol {
            "<>" => ComparisonOp::NotEqual,
            "<" => ComparisonOp::LessThan,
            "<=" => ComparisonOp::LessEqual,
            ">" => ComparisonOp::GreaterThan,
            ">=" => ComparisonOp::GreaterEqual,
            _ => ComparisonOp::Equal,
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug)]
enum Operand {
    Number(f64),
    Boolean(bool),
    Error(CellError),
    /// Lowercased text plus a matcher when it carries wildcards or escapes
    Text(String, Option<Regex>),
    Blank,
}

/// A parsed criteria, evaluated against many cells
#[derive(Debug)]
pub struct CriteriaEvaluator {
    op: ComparisonOp,
    operand: Operand,
}

impl CriteriaEvaluator {
    /// Parse a criteria value
    ///
    /// A blank criteria (typically a reference to an empty cell) is 0.
    pub fn new(criteria: &FormulaValue<'_>) -> Self {
        let operand = match criteria {
            FormulaValue::Number(n) => Operand::Number(*n),
            FormulaValue::Boolean(b) => Operand::Boolean(*b),
            FormulaValue::Error(e) => Operand::Error(*e),
            FormulaValue::String(s) => return Self::parse_string(s),
            FormulaValue::Empty | FormulaValue::Range(_) | FormulaValue::Array(_) => {
                Operand::Number(0.0)
            }
        };
        Self {
            op: ComparisonOp::Equal,
            operand,
        }
    }

    fn parse_string(text: &str) -> Self {
        let (symbol, rest) = match regex_captures!(r"^(<>|<=|>=|<|>|=)?(.*)$"s, text) {
            Some((_, symbol, rest)) => (symbol, rest),
            None => ("", text),
        };
        let op = ComparisonOp::parse(symbol);
        let operand = if rest.is_empty() {
            Operand::Blank
        } else if let Some(n) = try_parse_numeric(rest).or_else(|| try_parse_date_string(rest)) {
            Operand::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") {
            Operand::Boolean(true)
        } else if rest.eq_ignore_ascii_case("FALSE") {
            Operand::Boolean(false)
        } else if let Some(e) = CellError::parse(rest) {
            Operand::Error(e)
        } else {
            Operand::Text(rest.to_lowercase(), wildcard_regex(rest))
        };
        Self { op, operand }
    }

    /// Check if a cell value satisfies the criteria
    ///
    /// With `convert_numeric_string`, text such as "5" in the cell takes
    /// part in numeric comparisons.
    pub fn matches(&self, value: &FormulaValue<'_>, convert_numeric_string: bool) -> bool {
        let ordering = match &self.operand {
            Operand::Blank => {
                let blank = matches!(value, FormulaValue::Empty)
                    || matches!(value, FormulaValue::String(s) if s.is_empty());
                return match self.op {
                    ComparisonOp::Equal => blank,
                    ComparisonOp::NotEqual => !blank,
                    _ => false,
                };
            }
            Operand::Number(criteria) => {
                let number = match value {
                    FormulaValue::Number(n) => Some(*n),
                    FormulaValue::String(s) if convert_numeric_string => {
                        try_parse_numeric(s).or_else(|| try_parse_date_string(s))
                    }
                    _ => None,
                };
                number.and_then(|n| {
                    if (n - criteria).abs() < 1e-10 {
                        Some(Ordering::Equal)
                    } else {
                        n.partial_cmp(criteria)
                    }
                })
            }
            Operand::Boolean(criteria) => match value {
                FormulaValue::Boolean(b) => Some(b.cmp(criteria)),
                _ => None,
            },
            Operand::Error(criteria) => match value {
                FormulaValue::Error(e) if e == criteria => Some(Ordering::Equal),
                FormulaValue::Error(_) => Some(Ordering::Less),
                _ => None,
            },
            Operand::Text(criteria, pattern) => match value {
                FormulaValue::String(s) => match (self.op, pattern) {
                    (ComparisonOp::Equal | ComparisonOp::NotEqual, Some(regex)) => {
                        if regex.is_match(s) {
                            Some(Ordering::Equal)
                        } else {
                            Some(Ordering::Less)
                        }
                    }
                    _ => Some(s.to_lowercase().as_str().cmp(criteria.as_str())),
                },
                _ => None,
            },
        };
        match ordering {
            Some(ordering) => self.op.test(ordering),
            // values of another type only satisfy "not equal"
            None => self.op == ComparisonOp::NotEqual,
        }
    }
}

/// Case-insensitive, anchored regex for text with `*`, `?` or `~`
fn wildcard_regex(text: &str) -> Option<Regex> {
    if !text.contains(|c: char| matches!(c, '*' | '?' | '~')) {
        return None;
    }
    let mut pattern = String::from("^");
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '~' => match chars.next() {
                Some(escaped) => pattern.push_str(&regex::escape(&escaped.to_string())),
                None => pattern.push_str(&regex::escape("~")),
            },
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> FormulaValue<'static> {
        FormulaValue::String(s.into())
    }

    fn matcher(criteria: &str) -> CriteriaEvaluator {
        CriteriaEvaluator::new(&text(criteria))
    }

    #[test]
    fn test_number_criteria() {
        let m = CriteriaEvaluator::new(&FormulaValue::Number(5.0));
        assert!(m.matches(&FormulaValue::Number(5.0), true));
        assert!(!m.matches(&FormulaValue::Number(4.0), true));
        assert!(m.matches(&text("5"), true));
        assert!(!m.matches(&text("5"), false));
        assert!(!m.matches(&FormulaValue::Empty, true));
    }

    #[test]
    fn test_comparison_criteria() {
        let m = matcher(">5");
        assert!(m.matches(&FormulaValue::Number(6.0), true));
        assert!(!m.matches(&FormulaValue::Number(5.0), true));
        assert!(!m.matches(&text("apple"), true));

        let m = matcher("<=5");
        assert!(m.matches(&FormulaValue::Number(5.0), true));
        assert!(!m.matches(&FormulaValue::Number(6.0), true));

        let m = matcher("<>5");
        assert!(m.matches(&FormulaValue::Number(6.0), true));
        assert!(!m.matches(&FormulaValue::Number(5.0), true));
        assert!(m.matches(&text("apple"), true));
        assert!(m.matches(&FormulaValue::Empty, true));

        let m = matcher(">=2024-01-01");
        assert!(m.matches(&FormulaValue::Number(45300.0), true));
        assert!(!m.matches(&FormulaValue::Number(45000.0), true));
    }

    #[test]
    fn test_text_criteria() {
        let m = matcher("apple");
        assert!(m.matches(&text("APPLE"), true));
        assert!(!m.matches(&text("banana"), true));
        assert!(!m.matches(&FormulaValue::Number(1.0), true));

        let m = matcher("<>apple");
        assert!(m.matches(&text("banana"), true));
        assert!(!m.matches(&text("Apple"), true));

        let m = matcher(">m");
        assert!(m.matches(&text("Pear"), true));
        assert!(!m.matches(&text("apple"), true));
    }

    #[test]
    fn test_wildcard_criteria() {
        let m = matcher("a*e");
        assert!(m.matches(&text("Apple"), true));
        assert!(m.matches(&text("ae"), true));
        assert!(!m.matches(&text("apples"), true));

        let m = matcher("a?ple");
        assert!(m.matches(&text("apple"), true));
        assert!(!m.matches(&text("aple"), true));

        let m = matcher("what~?");
        assert!(m.matches(&text("what?"), true));
        assert!(!m.matches(&text("whats"), true));

        let m = matcher("<>*x*");
        assert!(m.matches(&text("abc"), true));
        assert!(!m.matches(&text("box"), true));
    }

    #[test]
    fn test_blank_criteria() {
        let m = matcher("");
        assert!(m.matches(&FormulaValue::Empty, true));
        assert!(m.matches(&text(""), true));
        assert!(!m.matches(&FormulaValue::Number(0.0), true));

        let m = matcher("<>");
        assert!(m.matches(&FormulaValue::Number(0.0), true));
        assert!(!m.matches(&FormulaValue::Empty, true));

        let m = CriteriaEvaluator::new(&FormulaValue::Empty);
        assert!(m.matches(&FormulaValue::Number(0.0), true));
        assert!(!m.matches(&FormulaValue::Empty, true));
    }

    #[test]
    fn test_boolean_and_error_criteria() {
        let m = matcher("TRUE");
        assert!(m.matches(&FormulaValue::Boolean(true), true));
        assert!(!m.matches(&FormulaValue::Number(1.0), true));

        let m = matcher("#N/A");
        assert!(m.matches(&FormulaValue::Error(CellError::Na), true));
        assert!(!m.matches(&FormulaValue::Error(CellError::Value), true));
    }
}
