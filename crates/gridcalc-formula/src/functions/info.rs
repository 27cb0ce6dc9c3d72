//! Information functions

use super::helpers::{arg_number, scalar};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

fn test_value<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    predicate: impl FnOnce(&FormulaValue<'_>) -> bool,
) -> FormulaResult<CompileResult<'a>> {
    let value = args
        .first()
        .map_or(FormulaValue::Empty, |arg| scalar(arg, ctx));
    Ok(CompileResult::boolean(predicate(&value)))
}

/// ISBLANK function
pub fn fn_isblank<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    test_value(args, ctx, |v| matches!(v, FormulaValue::Empty))
}

/// ISNUMBER function
pub fn fn_isnumber<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    test_value(args, ctx, |v| matches!(v, FormulaValue::Number(_)))
}

/// ISTEXT function
pub fn fn_istext<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    test_value(args, ctx, |v| matches!(v, FormulaValue::String(_)))
}

/// ISERROR function
pub fn fn_iserror<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    test_value(args, ctx, |v| v.is_error())
}

/// ISNA function
pub fn fn_isna<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    test_value(args, ctx, |v| v.get_error() == Some(CellError::Na))
}

/// Integer part of the ISEVEN/ISODD argument; booleans are rejected
fn parity_operand<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
) -> FormulaResult<f64> {
    if let Some(FormulaValue::Boolean(_)) = args.first().map(|arg| scalar(arg, ctx)) {
        return Err(CellError::Value.into());
    }
    Ok(arg_number(args, 0, ctx)?.trunc())
}

/// ISEVEN(number) - Tests the integer part of number
pub fn fn_iseven<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let n = parity_operand(args, ctx)?;
    Ok(CompileResult::boolean(n % 2.0 == 0.0))
}

/// ISODD(number)
pub fn fn_isodd<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let n = parity_operand(args, ctx)?;
    Ok(CompileResult::boolean(n % 2.0 != 0.0))
}

/// NA() - Always #N/A
pub fn fn_na<'a>(
    _args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Err(CellError::Na.into())
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use FunctionCategory::Information;

    let predicates: [(&'static str, super::FunctionImpl); 7] = [
        ("ISBLANK", fn_isblank),
        ("ISNUMBER", fn_isnumber),
        ("ISTEXT", fn_istext),
        ("ISERROR", fn_iserror),
        ("ISNA", fn_isna),
        ("ISEVEN", fn_iseven),
        ("ISODD", fn_isodd),
    ];
    for (name, implementation) in predicates {
        registry.register(FunctionDef::new(name, 1, Some(1), implementation, Information));
    }
    registry.register(FunctionDef::new("NA", 0, Some(0), fn_na, Information));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{eval, eval_in, workbook_with};
    use gridcalc_core::CellValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_predicates() {
        let wb = workbook_with(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::string("x")),
            ("A3", CellValue::Error(CellError::Na)),
        ]);
        assert_eq!(eval_in(&wb, "=ISBLANK(B1)"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISBLANK(A1)"), FormulaValue::Boolean(false));
        assert_eq!(eval_in(&wb, "=ISNUMBER(A1)"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISNUMBER(\"1\")"), FormulaValue::Boolean(false));
        assert_eq!(eval_in(&wb, "=ISTEXT(A2)"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISERROR(A3)"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISNA(A3)"), FormulaValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISNA(1/0)"), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_parity() {
        assert_eq!(eval("=ISEVEN(-2.5)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISODD(3)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISODD(0)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISEVEN(\"x\")"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=ISEVEN(TRUE)"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=NA()"), FormulaValue::Error(CellError::Na));
    }
}
