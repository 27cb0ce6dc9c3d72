//! Statistical functions
//!
//! The numeric kernels (`mean`, `variance`, `median`, ...) work on already
//! collected numbers so that SUBTOTAL and AGGREGATE can reuse them with their
//! own [`FunctionConfig`].

use ahash::AHashMap;

use super::helpers::{
    arg_number, arg_range, collect_numbers, count_non_empty, count_numbers, NumberMode,
};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

pub fn mean(numbers: &[f64]) -> Result<f64, CellError> {
    if numbers.is_empty() {
        return Err(CellError::Div0);
    }
    Ok(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

fn sum_squared_deviations(numbers: &[f64]) -> Result<f64, CellError> {
    let m = mean(numbers)?;
    Ok(numbers.iter().map(|x| (x - m) * (x - m)).sum())
}

/// Sample (`n - 1`) or population (`n`) variance
pub fn variance(numbers: &[f64], sample: bool) -> Result<f64, CellError> {
    let n = numbers.len();
    let divisor = if sample { n.saturating_sub(1) } else { n };
    if divisor == 0 {
        return Err(CellError::Div0);
    }
    Ok(sum_squared_deviations(numbers)? / divisor as f64)
}

pub fn std_dev(numbers: &[f64], sample: bool) -> Result<f64, CellError> {
    variance(numbers, sample).map(f64::sqrt)
}

/// Median; sorts `numbers` in place
pub fn median(numbers: &mut [f64]) -> Result<f64, CellError> {
    if numbers.is_empty() {
        return Err(CellError::Num);
    }
    numbers.sort_by(f64::total_cmp);
    let mid = numbers.len() / 2;
    if numbers.len() % 2 == 0 {
        Ok((numbers[mid - 1] + numbers[mid]) / 2.0)
    } else {
        Ok(numbers[mid])
    }
}

/// Most frequent value; ties go to the value seen first
pub fn mode(numbers: &[f64]) -> Result<f64, CellError> {
    let mut counts: AHashMap<u64, usize> = AHashMap::new();
    for n in numbers {
        *counts.entry(n.to_bits()).or_insert(0) += 1;
    }
    let mut best: Option<(f64, usize)> = None;
    for n in numbers {
        let count = counts.get(&n.to_bits()).copied().unwrap_or(0);
        if count > 1 && best.map_or(true, |(_, c)| count > c) {
            best = Some((*n, count));
        }
    }
    best.map(|(n, _)| n).ok_or(CellError::Na)
}

/// k-th largest (`largest = true`) or smallest value, k counted from 1
pub fn kth(numbers: &mut [f64], k: f64, largest: bool) -> Result<f64, CellError> {
    let k = k.ceil();
    if k < 1.0 || k > numbers.len() as f64 {
        return Err(CellError::Num);
    }
    numbers.sort_by(f64::total_cmp);
    let index = k as usize - 1;
    Ok(if largest {
        numbers[numbers.len() - 1 - index]
    } else {
        numbers[index]
    })
}

fn number_result<'a>(value: Result<f64, CellError>) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::number(value?))
}

/// AVERAGE function
pub fn fn_average<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    number_result(mean(&numbers))
}

/// AVERAGEA - Text in ranges counts as 0, booleans as 1/0
pub fn fn_averagea<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::AllValues)?;
    number_result(mean(&numbers))
}

/// COUNT function
pub fn fn_count<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let count = count_numbers(args, ctx, config)?;
    Ok(CompileResult::number(count as f64))
}

/// COUNTA(value1, [value2], ...) - Counts the number of non-empty values
/// Unlike COUNT, text, errors and booleans are counted too.
pub fn fn_counta<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let count = count_non_empty(args, ctx, config)?;
    Ok(CompileResult::number(count as f64))
}

/// COUNTBLANK(range) - Counts empty cells in a range
///
/// Cells holding an empty string count as blank.
pub fn fn_countblank<'a>(
    args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let range = arg_range(args, 0)?;
    let filled = range
        .iter()
        .filter(|cell| match &cell.value {
            FormulaValue::Empty => false,
            FormulaValue::String(s) => !s.is_empty(),
            _ => true,
        })
        .count() as u64;
    let total = range.address().cell_count();
    Ok(CompileResult::number(total.saturating_sub(filled) as f64))
}

fn extreme<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    mode: NumberMode,
    max: bool,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, mode)?;
    let pick = if max { f64::max } else { f64::min };
    let result = numbers.into_iter().reduce(pick).unwrap_or(0.0);
    Ok(CompileResult::number(result))
}

/// MAX function; 0 when there are no numbers
pub fn fn_max<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    extreme(args, ctx, config, NumberMode::Numbers, true)
}

/// MAXA function
pub fn fn_maxa<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    extreme(args, ctx, config, NumberMode::AllValues, true)
}

/// MIN function; 0 when there are no numbers
pub fn fn_min<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    extreme(args, ctx, config, NumberMode::Numbers, false)
}

/// MINA function
pub fn fn_mina<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    extreme(args, ctx, config, NumberMode::AllValues, false)
}

/// MEDIAN(number1, [number2], ...) - Returns the median of the given numbers
/// If there's an even count, returns the average of the two middle values.
pub fn fn_median<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let mut numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    number_result(median(&mut numbers))
}

/// MODE / MODE.SNGL - Most frequent number, #N/A without repeats
pub fn fn_mode<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    number_result(mode(&numbers))
}

fn kth_value<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
    largest: bool,
) -> FormulaResult<CompileResult<'a>> {
    let array = args.get(..1).unwrap_or(&[]);
    let mut numbers = collect_numbers(array, ctx, config, NumberMode::Numbers)?;
    let k = arg_number(args, 1, ctx)?;
    number_result(kth(&mut numbers, k, largest))
}

/// LARGE(array, k) - Returns the k-th largest value in a data set
pub fn fn_large<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    kth_value(args, ctx, config, true)
}

/// SMALL(array, k) - Returns the k-th smallest value in a data set
pub fn fn_small<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    kth_value(args, ctx, config, false)
}

/// Declares a dispersion function: collection mode, then the kernel
macro_rules! dispersion_fn {
    ($(#[$doc:meta])* $name:ident, $mode:expr, $kernel:expr) => {
        $(#[$doc])*
        pub fn $name<'a>(
            args: &[FunctionArgument<'a>],
            ctx: &mut ParsingContext<'a>,
            config: FunctionConfig,
        ) -> FormulaResult<CompileResult<'a>> {
            let numbers = collect_numbers(args, ctx, config, $mode)?;
            let kernel: fn(&[f64]) -> Result<f64, CellError> = $kernel;
            number_result(kernel(&numbers))
        }
    };
}

dispersion_fn!(
    /// STDEV / STDEV.S - Sample standard deviation
    fn_stdev_s,
    NumberMode::Numbers,
    |n| std_dev(n, true)
);
dispersion_fn!(
    /// STDEV.P / STDEVP - Population standard deviation
    fn_stdev_p,
    NumberMode::Numbers,
    |n| std_dev(n, false)
);
dispersion_fn!(
    /// STDEVA - Sample standard deviation, text and booleans included
    fn_stdeva,
    NumberMode::AllValues,
    |n| std_dev(n, true)
);
dispersion_fn!(
    /// STDEVPA
    fn_stdevpa,
    NumberMode::AllValues,
    |n| std_dev(n, false)
);
dispersion_fn!(
    /// VAR / VAR.S - Sample variance
    fn_var_s,
    NumberMode::Numbers,
    |n| variance(n, true)
);
dispersion_fn!(
    /// VAR.P / VARP - Population variance
    fn_var_p,
    NumberMode::Numbers,
    |n| variance(n, false)
);
dispersion_fn!(
    /// VARA
    fn_vara,
    NumberMode::AllValues,
    |n| variance(n, true)
);
dispersion_fn!(
    /// VARPA
    fn_varpa,
    NumberMode::AllValues,
    |n| variance(n, false)
);
dispersion_fn!(
    /// AVEDEV - Mean absolute deviation from the mean
    fn_avedev,
    NumberMode::Numbers,
    |n| {
        let m = mean(n).map_err(|_| CellError::Num)?;
        Ok(n.iter().map(|x| (x - m).abs()).sum::<f64>() / n.len() as f64)
    }
);
dispersion_fn!(
    /// DEVSQ - Sum of squared deviations
    fn_devsq,
    NumberMode::Numbers,
    |n| sum_squared_deviations(n).map_err(|_| CellError::Num)
);
dispersion_fn!(
    /// GEOMEAN - All numbers must be positive
    fn_geomean,
    NumberMode::Numbers,
    |n| {
        if n.is_empty() || n.iter().any(|x| *x <= 0.0) {
            return Err(CellError::Num);
        }
        Ok((n.iter().map(|x| x.ln()).sum::<f64>() / n.len() as f64).exp())
    }
);
dispersion_fn!(
    /// HARMEAN - All numbers must be positive
    fn_harmean,
    NumberMode::Numbers,
    |n| {
        if n.is_empty() || n.iter().any(|x| *x <= 0.0) {
            return Err(CellError::Num);
        }
        Ok(n.len() as f64 / n.iter().map(|x| 1.0 / x).sum::<f64>())
    }
);
dispersion_fn!(
    /// KURT - Sample excess kurtosis, needs at least four values
    fn_kurt,
    NumberMode::Numbers,
    kurtosis
);
dispersion_fn!(
    /// SKEW - Sample skewness, needs at least three values
    fn_skew,
    NumberMode::Numbers,
    skewness
);

fn kurtosis(numbers: &[f64]) -> Result<f64, CellError> {
    let n = numbers.len() as f64;
    if n < 4.0 {
        return Err(CellError::Div0);
    }
    let m = mean(numbers)?;
    let s = std_dev(numbers, true)?;
    if s == 0.0 {
        return Err(CellError::Div0);
    }
    let fourth: f64 = numbers.iter().map(|x| ((x - m) / s).powi(4)).sum();
    let scale = n * (n + 1.0) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
    let correction = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
    Ok(scale * fourth - correction)
}

fn skewness(numbers: &[f64]) -> Result<f64, CellError> {
    let n = numbers.len() as f64;
    if n < 3.0 {
        return Err(CellError::Div0);
    }
    let m = mean(numbers)?;
    let s = std_dev(numbers, true)?;
    if s == 0.0 {
        return Err(CellError::Div0);
    }
    let third: f64 = numbers.iter().map(|x| ((x - m) / s).powi(3)).sum();
    Ok(n / ((n - 1.0) * (n - 2.0)) * third)
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2010;
    use FunctionCategory::Statistical;

    let functions: [(&'static str, super::FunctionImpl); 29] = [
        ("AVERAGE", fn_average),
        ("AVERAGEA", fn_averagea),
        ("COUNT", fn_count),
        ("COUNTA", fn_counta),
        ("MAX", fn_max),
        ("MAXA", fn_maxa),
        ("MIN", fn_min),
        ("MINA", fn_mina),
        ("MEDIAN", fn_median),
        ("MODE", fn_mode),
        ("STDEV", fn_stdev_s),
        ("STDEVP", fn_stdev_p),
        ("STDEVA", fn_stdeva),
        ("STDEVPA", fn_stdevpa),
        ("VAR", fn_var_s),
        ("VARP", fn_var_p),
        ("VARA", fn_vara),
        ("VARPA", fn_varpa),
        ("AVEDEV", fn_avedev),
        ("DEVSQ", fn_devsq),
        ("GEOMEAN", fn_geomean),
        ("HARMEAN", fn_harmean),
        ("KURT", fn_kurt),
        ("SKEW", fn_skew),
        ("MODE.SNGL", fn_mode),
        ("STDEV.S", fn_stdev_s),
        ("STDEV.P", fn_stdev_p),
        ("VAR.S", fn_var_s),
        ("VAR.P", fn_var_p),
    ];
    for (name, implementation) in functions {
        let mut def = FunctionDef::new(name, 1, None, implementation, Statistical);
        if name.contains('.') {
            def = def.since(Excel2010);
        }
        registry.register(def);
    }
    registry.register(FunctionDef::new("COUNTBLANK", 1, Some(1), fn_countblank, Statistical));
    registry.register(FunctionDef::new("LARGE", 2, Some(2), fn_large, Statistical));
    registry.register(FunctionDef::new("SMALL", 2, Some(2), fn_small, Statistical));
}
