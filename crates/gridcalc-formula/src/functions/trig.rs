//! Trigonometric and hyperbolic functions

use super::helpers::{arg_number, unary_number};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FunctionArgument};
use gridcalc_core::CellError;

/// Excel refuses circular functions of angles at or beyond 2^27
const MAX_ANGLE: f64 = 134_217_728.0;

fn angle(x: f64) -> Result<f64, CellError> {
    if x.abs() >= MAX_ANGLE {
        Err(CellError::Num)
    } else {
        Ok(x)
    }
}

fn reciprocal(value: f64) -> Result<f64, CellError> {
    if value == 0.0 {
        Err(CellError::Div0)
    } else {
        Ok(1.0 / value)
    }
}

/// Declares a one-argument function over `unary_number`
macro_rules! unary_fn {
    ($(#[$doc:meta])* $name:ident, $body:expr) => {
        $(#[$doc])*
        pub fn $name<'a>(
            args: &[FunctionArgument<'a>],
            ctx: &mut ParsingContext<'a>,
            _config: FunctionConfig,
        ) -> FormulaResult<CompileResult<'a>> {
            unary_number(args, ctx, $body)
        }
    };
}

unary_fn!(
    /// SIN function
    fn_sin,
    |x| Ok(angle(x)?.sin())
);
unary_fn!(
    /// COS function
    fn_cos,
    |x| Ok(angle(x)?.cos())
);
unary_fn!(
    /// TAN function
    fn_tan,
    |x| Ok(angle(x)?.tan())
);
unary_fn!(
    /// ASIN(number) - number must lie in [-1, 1]
    fn_asin,
    |x: f64| if x.abs() > 1.0 { Err(CellError::Num) } else { Ok(x.asin()) }
);
unary_fn!(
    /// ACOS(number) - number must lie in [-1, 1]
    fn_acos,
    |x: f64| if x.abs() > 1.0 { Err(CellError::Num) } else { Ok(x.acos()) }
);
unary_fn!(
    /// ATAN function
    fn_atan,
    |x: f64| Ok(x.atan())
);
unary_fn!(
    /// SINH function
    fn_sinh,
    |x: f64| Ok(x.sinh())
);
unary_fn!(
    /// COSH function
    fn_cosh,
    |x: f64| Ok(x.cosh())
);
unary_fn!(
    /// TANH function
    fn_tanh,
    |x: f64| Ok(x.tanh())
);
unary_fn!(
    /// ASINH function
    fn_asinh,
    |x: f64| Ok(x.asinh())
);
unary_fn!(
    /// ACOSH(number) - number must be at least 1
    fn_acosh,
    |x: f64| if x < 1.0 { Err(CellError::Num) } else { Ok(x.acosh()) }
);
unary_fn!(
    /// ATANH(number) - number must lie strictly inside (-1, 1)
    fn_atanh,
    |x: f64| if x.abs() >= 1.0 { Err(CellError::Num) } else { Ok(x.atanh()) }
);
unary_fn!(
    /// COT(number) - Cotangent; COT(0) is #DIV/0!
    fn_cot,
    |x| reciprocal(angle(x)?.tan())
);
unary_fn!(
    /// COTH function
    fn_coth,
    |x: f64| reciprocal(x.tanh())
);
unary_fn!(
    /// CSC(number) - Cosecant
    fn_csc,
    |x| reciprocal(angle(x)?.sin())
);
unary_fn!(
    /// CSCH function
    fn_csch,
    |x: f64| reciprocal(x.sinh())
);
unary_fn!(
    /// SEC(number) - Secant
    fn_sec,
    |x| reciprocal(angle(x)?.cos())
);
unary_fn!(
    /// SECH function
    fn_sech,
    |x: f64| reciprocal(x.cosh())
);
unary_fn!(
    /// ACOT(number) - Principal value in (0, pi)
    fn_acot,
    |x: f64| Ok(std::f64::consts::FRAC_PI_2 - x.atan())
);
unary_fn!(
    /// ACOTH(number) - |number| must be greater than 1
    fn_acoth,
    |x: f64| {
        if x.abs() <= 1.0 {
            Err(CellError::Num)
        } else {
            Ok(0.5 * ((x + 1.0) / (x - 1.0)).ln())
        }
    }
);
unary_fn!(
    /// DEGREES function
    fn_degrees,
    |x: f64| Ok(x.to_degrees())
);
unary_fn!(
    /// RADIANS function
    fn_radians,
    |x: f64| Ok(x.to_radians())
);

/// ATAN2(x_num, y_num) - Angle of the point (x, y)
///
/// Note the argument order: x first, unlike `f64::atan2`.
pub fn fn_atan2<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let x = arg_number(args, 0, ctx)?;
    let y = arg_number(args, 1, ctx)?;
    if x == 0.0 && y == 0.0 {
        return Err(CellError::Div0.into());
    }
    Ok(CompileResult::number(y.atan2(x)))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2013;
    use FunctionCategory::Trigonometry;

    let functions: [(&'static str, super::FunctionImpl); 22] = [
        ("SIN", fn_sin),
        ("COS", fn_cos),
        ("TAN", fn_tan),
        ("ASIN", fn_asin),
        ("ACOS", fn_acos),
        ("ATAN", fn_atan),
        ("SINH", fn_sinh),
        ("COSH", fn_cosh),
        ("TANH", fn_tanh),
        ("ASINH", fn_asinh),
        ("ACOSH", fn_acosh),
        ("ATANH", fn_atanh),
        ("COT", fn_cot),
        ("COTH", fn_coth),
        ("CSC", fn_csc),
        ("CSCH", fn_csch),
        ("SEC", fn_sec),
        ("SECH", fn_sech),
        ("ACOT", fn_acot),
        ("ACOTH", fn_acoth),
        ("DEGREES", fn_degrees),
        ("RADIANS", fn_radians),
    ];
    for (name, implementation) in functions {
        let mut def = FunctionDef::new(name, 1, Some(1), implementation, Trigonometry);
        if matches!(name, "COT" | "COTH" | "CSC" | "CSCH" | "SEC" | "SECH" | "ACOT" | "ACOTH") {
            def = def.since(Excel2013);
        }
        registry.register(def);
    }
    registry.register(FunctionDef::new("ATAN2", 2, Some(2), fn_atan2, Trigonometry));
}

#[cfg(test)]
mod tests {
    use crate::functions::test_support::{assert_close, eval, num};
    use crate::functions::FunctionRegistry;
    use crate::value::FormulaValue;
    use gridcalc_core::CellError;
    use pretty_assertions::assert_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_circular_functions() {
        assert_close(num("=SIN(PI()/2)"), 1.0);
        assert_close(num("=COS(0)"), 1.0);
        assert_close(num("=TAN(PI()/4)"), 1.0);
        assert_close(num("=ASIN(1)"), PI / 2.0);
        assert_eq!(eval("=ACOS(2)"), FormulaValue::Error(CellError::Num));
        assert_close(num("=ATAN2(1,1)"), PI / 4.0);
        assert_close(num("=ATAN2(-1,0)"), PI);
        assert_eq!(eval("=ATAN2(0,0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=SIN(2^27)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_reciprocal_functions() {
        assert_close(num("=COT(PI()/4)"), 1.0);
        assert_eq!(eval("=COT(0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=CSC(0)"), FormulaValue::Error(CellError::Div0));
        assert_close(num("=SEC(0)"), 1.0);
        assert_close(num("=SECH(0)"), 1.0);
        assert_eq!(eval("=COTH(0)"), FormulaValue::Error(CellError::Div0));
        assert_close(num("=ACOT(1)"), PI / 4.0);
        assert_close(num("=ACOTH(3)"), 0.5 * 2.0f64.ln());
        assert_eq!(eval("=ACOTH(0.5)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_hyperbolic_and_conversions() {
        assert_close(num("=SINH(0)"), 0.0);
        assert_close(num("=COSH(0)"), 1.0);
        assert_close(num("=ASINH(SINH(2))"), 2.0);
        assert_eq!(eval("=ACOSH(0.5)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=ATANH(1)"), FormulaValue::Error(CellError::Num));
        assert_close(num("=DEGREES(PI())"), 180.0);
        assert_close(num("=RADIANS(180)"), PI);
    }

    #[test]
    fn test_all_registered() {
        let registry = FunctionRegistry::global();
        for name in ["SIN", "ACOTH", "ATAN2", "RADIANS", "CSCH"] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }
}
