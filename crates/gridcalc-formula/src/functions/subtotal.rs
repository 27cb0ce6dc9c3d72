//! SUBTOTAL and AGGREGATE
//!
//! Both run one of the ordinary aggregations with their own
//! [`FunctionConfig`]. Their `before_invoke` hook marks the pushed scope and
//! records the host cell, so that:
//! - a SUBTOTAL/AGGREGATE directly inside another one evaluates to 0
//! - cells hosting one are skipped by an enclosing range aggregation

use super::helpers::{arg_int, opt_number};
use super::math::{fn_product, fn_sum};
use super::ranking::{fn_percentile_exc, fn_percentile_inc, fn_quartile_exc, fn_quartile_inc};
use super::statistical::{
    fn_average, fn_count, fn_counta, fn_large, fn_max, fn_median, fn_min, fn_mode, fn_small,
    fn_stdev_p, fn_stdev_s, fn_var_p, fn_var_s,
};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionImpl, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FunctionArgument};
use gridcalc_core::CellError;

/// Marks the call's scope and registers the calling cell as a host
pub fn subtotal_before_invoke(ctx: &mut ParsingContext<'_>) {
    if let Some(scope) = ctx.scopes.current_mut() {
        scope.is_subtotal = true;
    }
    ctx.register_subtotal_host();
}

/// Shared by SUBTOTAL (1-11) and AGGREGATE (1-19)
fn aggregation(function_num: f64) -> Option<FunctionImpl> {
    let f: FunctionImpl = match function_num as i64 {
        1 => fn_average,
        2 => fn_count,
        3 => fn_counta,
        4 => fn_max,
        5 => fn_min,
        6 => fn_product,
        7 => fn_stdev_s,
        8 => fn_stdev_p,
        9 => fn_sum,
        10 => fn_var_s,
        11 => fn_var_p,
        12 => fn_median,
        13 => fn_mode,
        14 => fn_large,
        15 => fn_small,
        16 => fn_percentile_inc,
        17 => fn_quartile_inc,
        18 => fn_percentile_exc,
        19 => fn_quartile_exc,
        _ => return None,
    };
    Some(f)
}

/// SUBTOTAL(function_num, ref1, [ref2], ...)
///
/// 1-11 include hidden rows, 101-111 skip them. Nested subtotals are always
/// skipped.
pub fn fn_subtotal<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    if ctx.is_nested_in_subtotal() {
        return Ok(CompileResult::number(0.0).from_subtotal());
    }
    let function_num = arg_int(args, 0, ctx)?;
    let (base, ignore_hidden) = match function_num {
        n if (1.0..=11.0).contains(&n) => (n, false),
        n if (101.0..=111.0).contains(&n) => (n - 100.0, true),
        _ => return Err(CellError::Value.into()),
    };
    let implementation = aggregation(base).ok_or(CellError::Value)?;
    let config = FunctionConfig {
        ignore_hidden,
        ignore_errors: false,
        ignore_nested_subtotals: true,
    };
    let refs = args.get(1..).unwrap_or(&[]);
    Ok(implementation(refs, ctx, config)?.from_subtotal())
}

/// Skip rules of the AGGREGATE `options` argument, `None` outside 0-7
///
/// Host cells of other SUBTOTAL/AGGREGATE calls are skipped for every option.
fn aggregate_config(options: f64) -> Option<FunctionConfig> {
    if !(0.0..=7.0).contains(&options) {
        return None;
    }
    let options = options as u8;
    Some(FunctionConfig {
        ignore_hidden: matches!(options, 1 | 3 | 5 | 7),
        ignore_errors: matches!(options, 2 | 3 | 6 | 7),
        ignore_nested_subtotals: true,
    })
}

/// AGGREGATE(function_num, options, ref1, [ref2], ...) or
/// AGGREGATE(function_num, options, array, k) for 14-19
pub fn fn_aggregate<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    if ctx.is_nested_in_subtotal() {
        return Ok(CompileResult::number(0.0).from_subtotal());
    }
    let function_num = arg_int(args, 0, ctx)?;
    let options = opt_number(args, 1, ctx, 0.0)?.trunc();
    let config = aggregate_config(options).ok_or(CellError::Value)?;
    let implementation = aggregation(function_num).ok_or(CellError::Value)?;
    // 0-3: ignore nested SUBTOTAL/AGGREGATE
    if options <= 3.0 {
        ctx.register_subtotal_host();
    }
    let refs = args.get(2..).unwrap_or(&[]);
    Ok(implementation(refs, ctx, config)?.from_subtotal())
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2010;
    use FunctionCategory::Math;

    registry.register(
        FunctionDef::new("SUBTOTAL", 2, None, fn_subtotal, Math)
            .before_invoke(subtotal_before_invoke),
    );
    registry.register(
        FunctionDef::new("AGGREGATE", 3, None, fn_aggregate, Math)
            .before_invoke(subtotal_before_invoke)
            .since(Excel2010),
    );
}
