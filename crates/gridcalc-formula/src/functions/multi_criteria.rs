//! Conditional aggregation: SUMIF(S), COUNTIF(S), AVERAGEIF(S), MAXIFS, MINIFS
//!
//! Every (range, criteria) pair is turned into the ordered list of matching
//! positions, linear and row-major within the declared rectangle. The lists
//! are intersected and the value range is read at the surviving positions.

use ahash::AHashSet;

use super::criteria::CriteriaEvaluator;
use super::helpers::{dense_shape, is_omitted, scalar};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::range::RangeOrValue;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

/// Excel accepts at most 127 range/criteria pairs
pub const MAX_CRITERIA_PAIRS: usize = 127;

/// Matching positions of the pairs plus the layout they index into
struct Matches<'a> {
    indexes: Vec<usize>,
    first_range: RangeOrValue<'a>,
}

impl Matches<'_> {
    fn shape(&self) -> (u32, u16) {
        self.first_range.shape()
    }
}

fn range_argument<'a>(arg: &FunctionArgument<'a>) -> FormulaResult<RangeOrValue<'a>> {
    if let FormulaValue::Error(e) = arg.value() {
        return Err((*e).into());
    }
    Ok(RangeOrValue::from_value(arg.value()))
}

/// Rows and columns actually scanned; whole columns stop at the dimension
fn scan_shape(range: &RangeOrValue<'_>) -> (u32, u16) {
    match range {
        RangeOrValue::Range(r) => dense_shape(r),
        other => other.shape(),
    }
}

fn matching_indexes(
    range: &RangeOrValue<'_>,
    criteria: &FormulaValue<'_>,
    convert_numeric_string: bool,
) -> Vec<usize> {
    let evaluator = CriteriaEvaluator::new(criteria);
    let width = range.shape().1.max(1) as usize;
    let (rows, cols) = scan_shape(range);
    let mut indexes = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            let value = range.get_offset(r, c).unwrap_or(FormulaValue::Empty);
            if evaluator.matches(&value, convert_numeric_string) {
                indexes.push(r as usize * width + c as usize);
            }
        }
    }
    indexes
}

/// Positions present in every list, in the order of the first one
fn intersect(lists: Vec<Vec<usize>>) -> Vec<usize> {
    let mut lists = lists.into_iter();
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let others: Vec<AHashSet<usize>> = lists.map(|l| l.into_iter().collect()).collect();
    first
        .into_iter()
        .filter(|i| others.iter().all(|set| set.contains(i)))
        .collect()
}

/// Evaluate (range, criteria) pairs
///
/// With `expected_shape`, every criteria range must have exactly that shape.
fn match_pairs<'a>(
    pairs: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    expected_shape: Option<(u32, u16)>,
    convert_numeric_string: bool,
) -> FormulaResult<Matches<'a>> {
    if pairs.is_empty() || pairs.len() % 2 != 0 || pairs.len() / 2 > MAX_CRITERIA_PAIRS {
        return Err(CellError::Value.into());
    }
    let mut lists = Vec::with_capacity(pairs.len() / 2);
    let mut first_range = None;
    for pair in pairs.chunks_exact(2) {
        let range = range_argument(&pair[0])?;
        let shape = range.shape();
        let required = expected_shape.or_else(|| first_range.as_ref().map(RangeOrValue::shape));
        if required.is_some_and(|required| required != shape) {
            return Err(CellError::Value.into());
        }
        let criteria = scalar(&pair[1], ctx);
        lists.push(matching_indexes(&range, &criteria, convert_numeric_string));
        first_range.get_or_insert(range);
    }
    let first_range = first_range.ok_or(CellError::Value)?;
    Ok(Matches {
        indexes: intersect(lists),
        first_range,
    })
}

/// Single-pair form: `[sum_range]` anchors at its top-left cell and takes the
/// criteria range's size
fn match_single<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    convert_numeric_string: bool,
) -> FormulaResult<(Matches<'a>, RangeOrValue<'a>)> {
    let matches = match_pairs(args.get(..2).unwrap_or(&[]), ctx, None, convert_numeric_string)?;
    let values = if is_omitted(args, 2) {
        matches.first_range.clone()
    } else {
        let (rows, cols) = matches.shape();
        match range_argument(&args[2])? {
            RangeOrValue::Range(r) => RangeOrValue::Range(r.resize(rows, cols)),
            other => other,
        }
    };
    Ok((matches, values))
}

/// Multi-pair form: the value range comes first and fixes the shape
fn match_multiple<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
) -> FormulaResult<(Matches<'a>, RangeOrValue<'a>)> {
    let values = range_argument(args.first().ok_or(CellError::Value)?)?;
    let pairs = args.get(1..).unwrap_or(&[]);
    let matches = match_pairs(pairs, ctx, Some(values.shape()), true)?;
    Ok((matches, values))
}

/// Numbers of the value range at the matched positions
///
/// Text, booleans and blanks are skipped; an error stops the reduction.
fn matched_numbers(matches: &Matches<'_>, values: &RangeOrValue<'_>) -> FormulaResult<Vec<f64>> {
    let width = matches.shape().1.max(1) as usize;
    let mut numbers = Vec::with_capacity(matches.indexes.len());
    for &index in &matches.indexes {
        let row = (index / width) as u32;
        let col = (index % width) as u16;
        match values.get_offset(row, col) {
            Some(FormulaValue::Number(n)) => numbers.push(n),
            Some(FormulaValue::Error(e)) => return Err(e.into()),
            _ => {}
        }
    }
    Ok(numbers)
}

#[derive(Debug, Clone, Copy)]
enum Reduction {
    Sum,
    Average,
    Max,
    Min,
}

fn reduce<'a>(numbers: &[f64], reduction: Reduction) -> FormulaResult<CompileResult<'a>> {
    let result = match reduction {
        Reduction::Sum => numbers.iter().sum(),
        Reduction::Average => {
            if numbers.is_empty() {
                return Err(CellError::Div0.into());
            }
            numbers.iter().sum::<f64>() / numbers.len() as f64
        }
        Reduction::Max => numbers.iter().copied().reduce(f64::max).unwrap_or(0.0),
        Reduction::Min => numbers.iter().copied().reduce(f64::min).unwrap_or(0.0),
    };
    Ok(CompileResult::number(result))
}

/// SUMIF(range, criteria, [sum_range]) - Sums the cells that meet a criteria
pub fn fn_sumif<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_single(args, ctx, true)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Sum)
}

/// SUMIFS(sum_range, criteria_range1, criteria1, ...) - Sums cells meeting
/// every criteria
pub fn fn_sumifs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_multiple(args, ctx)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Sum)
}

/// COUNTIF(range, criteria)
///
/// Numeric text in the range does not match a numeric criteria.
pub fn fn_countif<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let matches = match_pairs(args, ctx, None, false)?;
    Ok(CompileResult::number(matches.indexes.len() as f64))
}

/// COUNTIFS(criteria_range1, criteria1, ...) - Counts rows meeting every
/// criteria
pub fn fn_countifs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let matches = match_pairs(args, ctx, None, false)?;
    Ok(CompileResult::number(matches.indexes.len() as f64))
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn fn_averageif<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_single(args, ctx, true)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Average)
}

/// AVERAGEIFS(average_range, criteria_range1, criteria1, ...)
pub fn fn_averageifs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_multiple(args, ctx)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Average)
}

/// MAXIFS(max_range, criteria_range1, criteria1, ...) - 0 when nothing matches
pub fn fn_maxifs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_multiple(args, ctx)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Max)
}

/// MINIFS(min_range, criteria_range1, criteria1, ...) - 0 when nothing matches
pub fn fn_minifs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (matches, values) = match_multiple(args, ctx)?;
    reduce(&matched_numbers(&matches, &values)?, Reduction::Min)
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2019;
    use FunctionCategory::{Math, Statistical};

    let max_ifs = Some(1 + 2 * MAX_CRITERIA_PAIRS);
    registry.register(FunctionDef::new("SUMIF", 2, Some(3), fn_sumif, Math));
    registry.register(FunctionDef::new("SUMIFS", 3, max_ifs, fn_sumifs, Math));
    registry.register(FunctionDef::new("COUNTIF", 2, Some(2), fn_countif, Statistical));
    registry.register(FunctionDef::new(
        "COUNTIFS",
        2,
        Some(2 * MAX_CRITERIA_PAIRS),
        fn_countifs,
        Statistical,
    ));
    registry.register(FunctionDef::new("AVERAGEIF", 2, Some(3), fn_averageif, Statistical));
    registry.register(FunctionDef::new(
        "AVERAGEIFS",
        3,
        max_ifs,
        fn_averageifs,
        Statistical,
    ));
    registry.register(FunctionDef::new("MAXIFS", 3, max_ifs, fn_maxifs, Statistical).since(Excel2019));
    registry.register(FunctionDef::new("MINIFS", 3, max_ifs, fn_minifs, Statistical).since(Excel2019));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{eval_in, workbook_with};
    use gridcalc_core::{CellValue, Workbook};
    use pretty_assertions::assert_eq;

    /// Region in A, product in B, amount in C, rows 1..=5
    fn sales() -> Workbook {
        workbook_with(&[
            ("A1", CellValue::string("East")),
            ("B1", CellValue::string("Apple")),
            ("C1", CellValue::Number(10.0)),
            ("A2", CellValue::string("West")),
            ("B2", CellValue::string("Apple")),
            ("C2", CellValue::Number(20.0)),
            ("A3", CellValue::string("East")),
            ("B3", CellValue::string("Pear")),
            ("C3", CellValue::Number(30.0)),
            ("A4", CellValue::string("East")),
            ("B4", CellValue::string("Apple")),
            ("C4", CellValue::Number(40.0)),
            ("A5", CellValue::string("West")),
            ("B5", CellValue::string("Pear")),
            ("C5", CellValue::string("n/a")),
        ])
    }

    fn number(wb: &Workbook, formula: &str) -> f64 {
        match eval_in(wb, formula) {
            FormulaValue::Number(n) => n,
            other => panic!("{} evaluated to {:?}", formula, other),
        }
    }

    #[test]
    fn test_single_criteria() {
        let wb = sales();
        assert_eq!(number(&wb, "=SUMIF(A1:A5,\"East\",C1:C5)"), 80.0);
        assert_eq!(number(&wb, "=SUMIF(C1:C5,\">15\")"), 90.0);
        assert_eq!(number(&wb, "=COUNTIF(B1:B5,\"a*\")"), 3.0);
        assert_eq!(number(&wb, "=AVERAGEIF(A1:A5,\"West\",C1:C5)"), 20.0);
        assert_eq!(
            eval_in(&wb, "=AVERAGEIF(A1:A5,\"North\",C1:C5)"),
            FormulaValue::Error(CellError::Div0)
        );
    }

    #[test]
    fn test_sum_range_takes_criteria_size() {
        let wb = sales();
        assert_eq!(number(&wb, "=SUMIF(A1:A5,\"East\",C1)"), 80.0);
        assert_eq!(number(&wb, "=SUMIF(A:A,\"East\",C:C)"), 80.0);
    }

    #[test]
    fn test_every_criteria_must_hold() {
        let wb = sales();
        assert_eq!(
            number(&wb, "=SUMIFS(C1:C5,A1:A5,\"East\",B1:B5,\"Apple\",C1:C5,\">15\")"),
            40.0
        );
        assert_eq!(
            number(&wb, "=COUNTIFS(A1:A5,\"East\",B1:B5,\"Apple\",C1:C5,\">15\")"),
            1.0
        );
        assert_eq!(number(&wb, "=MAXIFS(C1:C5,A1:A5,\"East\")"), 40.0);
        assert_eq!(number(&wb, "=MINIFS(C1:C5,B1:B5,\"Apple\")"), 10.0);
        assert_eq!(number(&wb, "=MAXIFS(C1:C5,A1:A5,\"North\")"), 0.0);
        assert_eq!(number(&wb, "=AVERAGEIFS(C1:C5,B1:B5,\"Apple\")"), 70.0 / 3.0);
    }

    #[test]
    fn test_shape_and_pair_errors() {
        let wb = sales();
        assert_eq!(
            eval_in(&wb, "=SUMIFS(C1:C5,A1:A4,\"East\")"),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            eval_in(&wb, "=SUMIFS(C1:C5,A1:A5,\"East\",B1:B5)"),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            eval_in(&wb, "=COUNTIFS(A1:A5,\"East\",B1:B4,\"Apple\")"),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_criteria_pair_limit() {
        let wb = sales();
        let pairs = |count: usize| vec!["A1:A5,\"East\""; count].join(",");

        let at_limit = pairs(MAX_CRITERIA_PAIRS);
        assert_eq!(number(&wb, &format!("=COUNTIFS({})", at_limit)), 3.0);
        assert_eq!(number(&wb, &format!("=SUMIFS(C1:C5,{})", at_limit)), 80.0);

        let over_limit = pairs(MAX_CRITERIA_PAIRS + 1);
        assert_eq!(
            eval_in(&wb, &format!("=COUNTIFS({})", over_limit)),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(
            eval_in(&wb, &format!("=SUMIFS(C1:C5,{})", over_limit)),
            FormulaValue::Error(CellError::Value)
        );
    }

    #[test]
    fn test_numeric_text_counts_for_sum_but_not_count() {
        let wb = workbook_with(&[
            ("A1", CellValue::string("5")),
            ("A2", CellValue::Number(5.0)),
            ("B1", CellValue::Number(1.0)),
            ("B2", CellValue::Number(2.0)),
        ]);
        assert_eq!(number(&wb, "=SUMIFS(B1:B2,A1:A2,5)"), 3.0);
        assert_eq!(number(&wb, "=COUNTIFS(A1:A2,5)"), 1.0);
        assert_eq!(number(&wb, "=SUMIF(A1:A2,5,B1:B2)"), 3.0);
        assert_eq!(number(&wb, "=COUNTIF(A1:A2,5)"), 1.0);
    }

    #[test]
    fn test_blank_criteria_and_blank_cells() {
        let wb = workbook_with(&[
            ("A1", CellValue::Number(1.0)),
            ("A3", CellValue::Number(0.0)),
        ]);
        assert_eq!(number(&wb, "=COUNTIF(A1:A3,\"\")"), 1.0);
        assert_eq!(number(&wb, "=COUNTIF(A1:A3,\"<>\")"), 2.0);
        // a reference to an empty cell matches zero
        assert_eq!(number(&wb, "=COUNTIF(A1:A3,B9)"), 1.0);
    }

    #[test]
    fn test_errors_in_value_range_propagate() {
        let wb = workbook_with(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::Number(2.0)),
            ("B1", CellValue::Number(1.0)),
            ("B2", CellValue::Error(CellError::Na)),
        ]);
        assert_eq!(number(&wb, "=SUMIF(A1:A2,1,B1:B2)"), 1.0);
        assert_eq!(
            eval_in(&wb, "=SUMIF(A1:A2,\">0\",B1:B2)"),
            FormulaValue::Error(CellError::Na)
        );
    }

    #[test]
    fn test_intersection_keeps_first_order() {
        assert_eq!(
            intersect(vec![vec![4, 1, 3], vec![1, 3, 4], vec![3, 4]]),
            vec![4, 3]
        );
        assert!(intersect(Vec::new()).is_empty());
    }
}
