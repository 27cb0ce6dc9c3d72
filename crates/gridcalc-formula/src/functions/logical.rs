//! Logical functions

use super::helpers::{arg_bool, scalar, visit_values, ValueSource};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::convert::to_bool;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

/// IF(logical_test, [value_if_true], [value_if_false])
///
/// A missing `value_if_false` yields FALSE.
pub fn fn_if<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let branch = if arg_bool(args, 0, ctx)? { 1 } else { 2 };
    Ok(match args.get(branch) {
        Some(arg) => CompileResult::new(arg.value().clone()),
        None => CompileResult::boolean(false),
    })
}

/// IFERROR(value, value_if_error)
pub fn fn_iferror<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    if_error_matching(args, ctx, |_| true)
}

/// IFNA(value, value_if_na) - Only #N/A is replaced
pub fn fn_ifna<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    if_error_matching(args, ctx, |e| e == CellError::Na)
}

fn if_error_matching<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    replace: impl Fn(CellError) -> bool,
) -> FormulaResult<CompileResult<'a>> {
    let Some(first) = args.first() else {
        return Err(CellError::Value.into());
    };
    let value = scalar(first, ctx);
    match value.get_error() {
        Some(e) if replace(e) => Ok(args
            .get(1)
            .map_or_else(CompileResult::empty, |arg| CompileResult::new(arg.value().clone()))),
        _ => Ok(CompileResult::new(value)),
    }
}

/// Logical values of the arguments; text and blanks in ranges are skipped
fn logical_values<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
) -> FormulaResult<Vec<bool>> {
    let mut values = Vec::new();
    visit_values(args, ctx, FunctionConfig::default(), |source, value| {
        match (value, source) {
            (FormulaValue::Boolean(b), _) => values.push(*b),
            (FormulaValue::Number(n), _) => values.push(*n != 0.0),
            (FormulaValue::Error(e), _) => return Err((*e).into()),
            (FormulaValue::String(_) | FormulaValue::Empty, ValueSource::Direct) => {
                values.push(to_bool(value)?)
            }
            _ => {}
        }
        Ok(())
    })?;
    if values.is_empty() {
        return Err(CellError::Value.into());
    }
    Ok(values)
}

/// AND(logical1, [logical2], ...)
pub fn fn_and<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let values = logical_values(args, ctx)?;
    Ok(CompileResult::boolean(values.iter().all(|&b| b)))
}

/// OR(logical1, [logical2], ...)
pub fn fn_or<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let values = logical_values(args, ctx)?;
    Ok(CompileResult::boolean(values.iter().any(|&b| b)))
}

/// NOT function
pub fn fn_not<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::boolean(!arg_bool(args, 0, ctx)?))
}

pub fn fn_true<'a>(
    _args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::boolean(true))
}

pub fn fn_false<'a>(
    _args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::boolean(false))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2013;
    use FunctionCategory::Logical;

    registry.register(FunctionDef::new("IF", 1, Some(3), fn_if, Logical));
    registry.register(FunctionDef::new("IFERROR", 2, Some(2), fn_iferror, Logical));
    registry.register(FunctionDef::new("IFNA", 2, Some(2), fn_ifna, Logical).since(Excel2013));
    registry.register(FunctionDef::new("AND", 1, Some(255), fn_and, Logical));
    registry.register(FunctionDef::new("OR", 1, Some(255), fn_or, Logical));
    registry.register(FunctionDef::new("NOT", 1, Some(1), fn_not, Logical));
    registry.register(FunctionDef::new("TRUE", 0, Some(0), fn_true, Logical));
    registry.register(FunctionDef::new("FALSE", 0, Some(0), fn_false, Logical));
}
