//! Argument coercion and value collection shared by the built-in functions

use crate::context::ParsingContext;
use crate::convert::{to_bool, to_number, to_text, try_parse_date_string, try_parse_numeric};
use crate::error::{FormulaError, FormulaResult};
use crate::range::RangeInfo;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

use super::FunctionConfig;

/// Where a visited value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Typed directly as an argument
    Direct,
    /// A cell of a worksheet range
    Range,
    /// An element of an array literal
    Array,
}

/// How non-numeric values count in a numeric aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberMode {
    /// Only numbers inside ranges and arrays; direct arguments coerce
    Numbers,
    /// The `*A` variants: text counts as 0 and booleans as 1/0 everywhere
    AllValues,
}

/// Visit every value of `args`, honouring the config's skip rules
///
/// Range iteration is sparse, so blank cells are not visited.
pub fn visit_values<'a, F>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    mut visit: F,
) -> FormulaResult<()>
where
    F: FnMut(ValueSource, &FormulaValue<'_>) -> FormulaResult<()>,
{
    for arg in args {
        match arg.value() {
            FormulaValue::Range(range) => {
                for cell in range.iter() {
                    if config.ignore_hidden && cell.is_hidden_row {
                        continue;
                    }
                    if config.ignore_nested_subtotals && ctx.subtotal_addresses.contains(&cell.id)
                    {
                        continue;
                    }
                    if config.ignore_errors && cell.is_excel_error() {
                        continue;
                    }
                    visit(ValueSource::Range, &cell.value)?;
                }
            }
            FormulaValue::Array(rows) => {
                for value in rows.iter().flatten() {
                    if config.ignore_errors && value.is_error() {
                        continue;
                    }
                    visit(ValueSource::Array, value)?;
                }
            }
            value => {
                if config.ignore_errors && value.is_error() {
                    continue;
                }
                visit(ValueSource::Direct, value)?;
            }
        }
    }
    Ok(())
}

/// Collect the numbers an aggregation works on
///
/// Errors propagate unless the config ignores them. A direct text argument
/// that is not a number is `#VALUE!`.
pub fn collect_numbers<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    mode: NumberMode,
) -> FormulaResult<Vec<f64>> {
    let mut numbers = Vec::new();
    visit_values(args, ctx, config, |source, value| {
        if let Some(n) = number_of(source, value, mode)? {
            numbers.push(n);
        }
        Ok(())
    })?;
    Ok(numbers)
}

fn number_of(
    source: ValueSource,
    value: &FormulaValue<'_>,
    mode: NumberMode,
) -> FormulaResult<Option<f64>> {
    let bool_value = |b: bool| if b { 1.0 } else { 0.0 };
    match (value, source, mode) {
        (FormulaValue::Error(e), _, _) => Err(FormulaError::Excel(*e)),
        (FormulaValue::Number(n), _, _) => Ok(Some(*n)),
        (FormulaValue::Boolean(b), ValueSource::Direct, _)
        | (FormulaValue::Boolean(b), _, NumberMode::AllValues) => Ok(Some(bool_value(*b))),
        (FormulaValue::String(s), ValueSource::Direct, _) => try_parse_numeric(s)
            .or_else(|| try_parse_date_string(s))
            .map(Some)
            .ok_or(FormulaError::Excel(CellError::Value)),
        (FormulaValue::String(_), _, NumberMode::AllValues) => Ok(Some(0.0)),
        (FormulaValue::Empty, ValueSource::Direct, _) => Ok(Some(0.0)),
        _ => Ok(None),
    }
}

/// Count values the way COUNT does: numbers, plus direct booleans and
/// numeric text; errors are never counted and never propagate
pub fn count_numbers<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<usize> {
    let mut count = 0;
    visit_values(args, ctx, config, |source, value| {
        let counted = match (value, source) {
            (FormulaValue::Number(_), _) => true,
            (FormulaValue::Boolean(_), ValueSource::Direct) => true,
            (FormulaValue::String(s), ValueSource::Direct) => {
                try_parse_numeric(s).or_else(|| try_parse_date_string(s)).is_some()
            }
            _ => false,
        };
        if counted {
            count += 1;
        }
        Ok(())
    })?;
    Ok(count)
}

/// Count non-blank values the way COUNTA does
pub fn count_non_empty<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<usize> {
    let mut count = 0;
    visit_values(args, ctx, config, |_, value| {
        if !matches!(value, FormulaValue::Empty) {
            count += 1;
        }
        Ok(())
    })?;
    Ok(count)
}

/// Scalar value of an argument
///
/// Ranges resolve by implicit intersection with the current cell, arrays to
/// their top-left element.
pub fn scalar<'a>(arg: &FunctionArgument<'a>, ctx: &ParsingContext<'a>) -> FormulaValue<'static> {
    match arg.value() {
        FormulaValue::Range(range) => {
            let anchor = ctx
                .current_cell()
                .filter(|cell| cell.sheet == range.sheet())
                .map(|cell| (cell.row, cell.col));
            range.implicit_intersection(anchor)
        }
        other => other.clone().into_scalar(),
    }
}

fn excel(e: CellError) -> FormulaError {
    FormulaError::Excel(e)
}

fn required<'b, 'a>(
    args: &'b [FunctionArgument<'a>],
    index: usize,
) -> FormulaResult<&'b FunctionArgument<'a>> {
    args.get(index).ok_or(FormulaError::Excel(CellError::Value))
}

/// Numeric argument at `index`
pub fn arg_number<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
) -> FormulaResult<f64> {
    to_number(&scalar(required(args, index)?, ctx)).map_err(excel)
}

/// Numeric argument truncated toward zero
pub fn arg_int<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
) -> FormulaResult<f64> {
    arg_number(args, index, ctx).map(f64::trunc)
}

pub fn arg_bool<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
) -> FormulaResult<bool> {
    to_bool(&scalar(required(args, index)?, ctx)).map_err(excel)
}

pub fn arg_text<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
) -> FormulaResult<String> {
    to_text(&scalar(required(args, index)?, ctx)).map_err(excel)
}

/// Apply `f` to the single numeric argument
pub fn unary_number<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    f: impl FnOnce(f64) -> Result<f64, CellError>,
) -> FormulaResult<CompileResult<'a>> {
    let n = arg_number(args, 0, ctx)?;
    Ok(CompileResult::number(f(n)?))
}

/// True when the argument is missing or was left empty (`f(1,)`)
pub fn is_omitted(args: &[FunctionArgument<'_>], index: usize) -> bool {
    args.get(index)
        .map_or(true, |arg| matches!(arg.value(), FormulaValue::Empty))
}

pub fn opt_number<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
    default: f64,
) -> FormulaResult<f64> {
    if is_omitted(args, index) {
        Ok(default)
    } else {
        arg_number(args, index, ctx)
    }
}

pub fn opt_bool<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
    default: bool,
) -> FormulaResult<bool> {
    if is_omitted(args, index) {
        Ok(default)
    } else {
        arg_bool(args, index, ctx)
    }
}

/// Range argument; anything else is `#VALUE!`
pub fn arg_range<'a>(args: &[FunctionArgument<'a>], index: usize) -> FormulaResult<RangeInfo<'a>> {
    required(args, index)?
        .as_range()
        .copied()
        .ok_or(FormulaError::Excel(CellError::Value))
}

/// Every element of an argument as a scalar, blanks included for arrays
/// and scalars, skipped for ranges
pub fn flatten_values<'a>(arg: &FunctionArgument<'a>) -> Vec<FormulaValue<'static>> {
    match arg.value() {
        FormulaValue::Range(range) => range.iter().map(|cell| cell.value).collect(),
        FormulaValue::Array(rows) => rows
            .iter()
            .flatten()
            .map(|v| v.clone().into_scalar())
            .collect(),
        other => vec![other.clone().into_scalar()],
    }
}

/// Declared shape of a range, with whole rows and columns cut at the
/// worksheet dimension
pub fn dense_shape(range: &RangeInfo<'_>) -> (u32, u16) {
    let address = range.address();
    if !address.is_full_column() && !address.is_full_row() {
        return (range.row_count(), range.col_count());
    }
    match range.effective_address() {
        Some(clipped) => (
            clipped.end.row - address.start.row + 1,
            clipped.end.col - address.start.col + 1,
        ),
        None => (0, 0),
    }
}

/// Values of an argument laid out as a dense grid, blanks included
pub fn dense_values<'a>(arg: &FunctionArgument<'a>) -> (usize, usize, Vec<FormulaValue<'static>>) {
    match arg.value() {
        FormulaValue::Range(range) => {
            let (rows, cols) = dense_shape(range);
            let mut values = Vec::with_capacity(rows as usize * cols as usize);
            for r in 0..rows {
                for c in 0..cols {
                    values.push(range.get_offset(r, c).unwrap_or(FormulaValue::Empty));
                }
            }
            (rows as usize, cols as usize, values)
        }
        FormulaValue::Array(rows) => {
            let width = rows.first().map_or(0, Vec::len);
            let values = rows
                .iter()
                .flatten()
                .map(|v| v.clone().into_scalar())
                .collect();
            (rows.len(), width, values)
        }
        other => (1, 1, vec![other.clone().into_scalar()]),
    }
}
