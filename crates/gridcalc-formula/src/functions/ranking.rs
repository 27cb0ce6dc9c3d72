//! Percentiles, quartiles and ranks
//!
//! `percentile` and `quartile` take the collected numbers so AGGREGATE can
//! call them with its own skip rules.

use rust_decimal::RoundingStrategy;

use super::helpers::{arg_number, collect_numbers, opt_number, NumberMode};
use super::rounding::{round_digits, round_to_significant_fig};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FunctionArgument};
use gridcalc_core::CellError;

/// Value at a fractional zero-based position of sorted data
fn interpolate(sorted: &[f64], position: f64) -> f64 {
    let position = position.max(0.0);
    let lower = position.floor() as usize;
    let fraction = position - position.floor();
    match sorted.get(lower + 1) {
        Some(upper) if fraction > 0.0 => sorted[lower] + fraction * (upper - sorted[lower]),
        _ => sorted[lower],
    }
}

/// k-th percentile; sorts `numbers` in place
///
/// Inclusive: `k` in [0, 1]. Exclusive: `k` in [1/(n+1), n/(n+1)].
pub fn percentile(numbers: &mut [f64], k: f64, exclusive: bool) -> Result<f64, CellError> {
    let n = numbers.len();
    if n == 0 || k.is_nan() {
        return Err(CellError::Num);
    }
    numbers.sort_by(f64::total_cmp);
    if exclusive {
        let count = n as f64;
        if k < 1.0 / (count + 1.0) || k > count / (count + 1.0) {
            return Err(CellError::Num);
        }
        Ok(interpolate(numbers, k * (count + 1.0) - 1.0))
    } else {
        if !(0.0..=1.0).contains(&k) {
            return Err(CellError::Num);
        }
        Ok(interpolate(numbers, k * (n - 1) as f64))
    }
}

/// Quartile `quart` (truncated): 0 to 4 inclusive, 1 to 3 exclusive
pub fn quartile(numbers: &mut [f64], quart: f64, exclusive: bool) -> Result<f64, CellError> {
    let quart = quart.trunc();
    let valid = if exclusive {
        (1.0..=3.0).contains(&quart)
    } else {
        (0.0..=4.0).contains(&quart)
    };
    if !valid {
        return Err(CellError::Num);
    }
    percentile(numbers, quart / 4.0, exclusive)
}

fn data_and_selector<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<(Vec<f64>, f64)> {
    let array = args.get(..1).unwrap_or(&[]);
    let numbers = collect_numbers(array, ctx, config, NumberMode::Numbers)?;
    let selector = arg_number(args, 1, ctx)?;
    Ok((numbers, selector))
}

/// PERCENTILE / PERCENTILE.INC(array, k)
pub fn fn_percentile_inc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (mut numbers, k) = data_and_selector(args, ctx, config)?;
    Ok(CompileResult::number(percentile(&mut numbers, k, false)?))
}

/// PERCENTILE.EXC(array, k)
pub fn fn_percentile_exc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (mut numbers, k) = data_and_selector(args, ctx, config)?;
    Ok(CompileResult::number(percentile(&mut numbers, k, true)?))
}

/// QUARTILE / QUARTILE.INC(array, quart)
pub fn fn_quartile_inc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (mut numbers, quart) = data_and_selector(args, ctx, config)?;
    Ok(CompileResult::number(quartile(&mut numbers, quart, false)?))
}

/// QUARTILE.EXC(array, quart)
pub fn fn_quartile_exc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (mut numbers, quart) = data_and_selector(args, ctx, config)?;
    Ok(CompileResult::number(quartile(&mut numbers, quart, true)?))
}

/// 1-based positions of the first and last occurrence of `number`
fn rank_positions(
    number: f64,
    numbers: &mut [f64],
    ascending: bool,
) -> Result<(usize, usize), CellError> {
    if ascending {
        numbers.sort_by(f64::total_cmp);
    } else {
        numbers.sort_by(|a, b| b.total_cmp(a));
    }
    let first = numbers
        .iter()
        .position(|&n| n == number)
        .ok_or(CellError::Na)?;
    let last = numbers
        .iter()
        .rposition(|&n| n == number)
        .ok_or(CellError::Na)?;
    Ok((first + 1, last + 1))
}

fn rank<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    average: bool,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let reference = args.get(1..2).unwrap_or(&[]);
    let mut numbers = collect_numbers(reference, ctx, config, NumberMode::Numbers)?;
    let ascending = opt_number(args, 2, ctx, 0.0)? != 0.0;
    let (first, last) = rank_positions(number, &mut numbers, ascending)?;
    let result = if average {
        (first + last) as f64 / 2.0
    } else {
        first as f64
    };
    Ok(CompileResult::number(result))
}

/// RANK / RANK.EQ(number, ref, [order]) - Descending unless order is non-zero;
/// ties share the best rank
pub fn fn_rank_eq<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    rank(args, ctx, config, false)
}

/// RANK.AVG(number, ref, [order]) - Ties get the average of their ranks
pub fn fn_rank_avg<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    rank(args, ctx, config, true)
}

/// Relative standing of a value present in the sorted data
fn exact_percent_rank(sorted: &[f64], x: f64, exclusive: bool) -> f64 {
    let below = sorted.iter().filter(|&&n| n < x).count() as f64;
    if exclusive {
        return (below + 1.0) / (sorted.len() as f64 + 1.0);
    }
    let above = sorted.iter().filter(|&&n| n > x).count() as f64;
    if below + above == 0.0 {
        1.0
    } else {
        below / (below + above)
    }
}

/// Percent rank of `x`; values between two data points interpolate
/// between their ranks
pub fn percent_rank(
    numbers: &mut [f64],
    x: f64,
    significance: f64,
    exclusive: bool,
) -> Result<f64, CellError> {
    if numbers.is_empty() {
        return Err(CellError::Num);
    }
    let significance = significance.trunc();
    if significance < 1.0 {
        return Err(CellError::Num);
    }
    numbers.sort_by(f64::total_cmp);
    let (min, max) = (numbers[0], numbers[numbers.len() - 1]);
    if x < min || x > max {
        return Err(CellError::Na);
    }

    let rank = if numbers.contains(&x) {
        exact_percent_rank(numbers, x, exclusive)
    } else {
        let lower = numbers.iter().copied().filter(|&n| n < x).fold(min, f64::max);
        let upper = numbers.iter().copied().filter(|&n| n > x).fold(max, f64::min);
        let lower_rank = exact_percent_rank(numbers, lower, exclusive);
        let upper_rank = exact_percent_rank(numbers, upper, exclusive);
        lower_rank + (x - lower) / (upper - lower) * (upper_rank - lower_rank)
    };
    let cleaned = round_to_significant_fig(rank, 15, true);
    Ok(round_digits(cleaned, significance as i32, RoundingStrategy::ToZero))
}

fn percent_rank_fn<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    exclusive: bool,
) -> FormulaResult<CompileResult<'a>> {
    let (mut numbers, x) = data_and_selector(args, ctx, config)?;
    let significance = opt_number(args, 2, ctx, 3.0)?;
    Ok(CompileResult::number(percent_rank(
        &mut numbers,
        x,
        significance,
        exclusive,
    )?))
}

/// PERCENTRANK / PERCENTRANK.INC(array, x, [significance])
pub fn fn_percentrank_inc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    percent_rank_fn(args, ctx, config, false)
}

/// PERCENTRANK.EXC(array, x, [significance])
pub fn fn_percentrank_exc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    percent_rank_fn(args, ctx, config, true)
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2010;
    use FunctionCategory::Statistical;

    let selectors: [(&'static str, super::FunctionImpl); 6] = [
        ("PERCENTILE", fn_percentile_inc),
        ("PERCENTILE.INC", fn_percentile_inc),
        ("PERCENTILE.EXC", fn_percentile_exc),
        ("QUARTILE", fn_quartile_inc),
        ("QUARTILE.INC", fn_quartile_inc),
        ("QUARTILE.EXC", fn_quartile_exc),
    ];
    let ranks: [(&'static str, super::FunctionImpl); 6] = [
        ("RANK", fn_rank_eq),
        ("RANK.EQ", fn_rank_eq),
        ("RANK.AVG", fn_rank_avg),
        ("PERCENTRANK", fn_percentrank_inc),
        ("PERCENTRANK.INC", fn_percentrank_inc),
        ("PERCENTRANK.EXC", fn_percentrank_exc),
    ];
    let defs = selectors
        .into_iter()
        .map(|(name, f)| FunctionDef::new(name, 2, Some(2), f, Statistical))
        .chain(
            ranks
                .into_iter()
                .map(|(name, f)| FunctionDef::new(name, 2, Some(3), f, Statistical)),
        );
    for def in defs {
        let def = if def.name.contains('.') {
            def.since(Excel2010)
        } else {
            def
        };
        registry.register(def);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{assert_close, eval, num};
    use crate::value::FormulaValue;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_percentiles() {
        assert_close(num("=PERCENTILE({1,2,3,4},0.3)"), 1.9);
        assert_close(num("=PERCENTILE.INC({1,3,2,4},0.75)"), 3.25);
        assert_close(num("=PERCENTILE.EXC({1,2,3,4},0.25)"), 1.25);
        assert_eq!(eval("=PERCENTILE({1,2},1.5)"), FormulaValue::Error(CellError::Num));
        assert_eq!(
            eval("=PERCENTILE.EXC({1,2,3,4},0.1)"),
            FormulaValue::Error(CellError::Num)
        );
    }

    #[test]
    fn test_quartiles() {
        assert_close(num("=QUARTILE({1,2,4,7,8,9,10,12},1)"), 3.5);
        assert_close(num("=QUARTILE.INC({1,2,4,7,8,9,10,12},4)"), 12.0);
        assert_close(num("=QUARTILE.EXC({6,7,15,36,39,40,41,42,43,47,49},1)"), 15.0);
        assert_close(num("=QUARTILE.EXC({6,7,15,36,39,40,41,42,43,47,49},3.9)"), 43.0);
        assert_eq!(eval("=QUARTILE.EXC({1,2,3},4)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=QUARTILE.EXC({1,2},1)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=QUARTILE.EXC({1,2},3)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=QUARTILE({1,2},5)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_ranks() {
        assert_eq!(num("=RANK(5,{1,3,5,5,7},0)"), 2.0);
        assert_eq!(num("=RANK.EQ(5,{1,3,5,5,7})"), 2.0);
        assert_eq!(num("=RANK.AVG(5,{1,3,5,5,7},0)"), 2.5);
        assert_eq!(num("=RANK(5,{1,3,5,5,7},1)"), 3.0);
        assert_eq!(num("=RANK.AVG(5,{1,3,5,5,7},1)"), 3.5);
        assert_eq!(eval("=RANK(4,{1,3,5})"), FormulaValue::Error(CellError::Na));
    }

    #[test]
    fn test_percent_ranks() {
        assert_close(num("=PERCENTRANK({1,2,3,4,5,6,7,8,9,10},4)"), 0.333);
        assert_close(num("=PERCENTRANK.INC({1,2,3,4,5,6,7,8,9,10},4.5)"), 0.388);
        assert_close(num("=PERCENTRANK.INC({1,2,3,4,5,6,7,8,9,10},4,2)"), 0.33);
        assert_close(num("=PERCENTRANK.EXC({1,2,3,4,5,6,7,8,9,10},4)"), 0.363);
        assert_close(num("=PERCENTRANK.INC({1,5},1)"), 0.0);
        assert_eq!(
            eval("=PERCENTRANK({1,2,3},4)"),
            FormulaValue::Error(CellError::Na)
        );
        assert_eq!(
            eval("=PERCENTRANK({1,2,3},2,0)"),
            FormulaValue::Error(CellError::Num)
        );
    }

    proptest! {
        #[test]
        fn percentile_bounds_are_min_and_max(
            values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..50),
        ) {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mut data = values.clone();
            prop_assert_eq!(percentile(&mut data, 0.0, false).unwrap(), min);
            prop_assert_eq!(percentile(&mut data, 1.0, false).unwrap(), max);
            let mid = percentile(&mut data, 0.5, false).unwrap();
            prop_assert!(min <= mid && mid <= max);
        }
    }
}
