//! Math functions

use rand::Rng;

use super::helpers::{
    arg_number, collect_numbers, dense_values, opt_number, unary_number, NumberMode,
};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::{FormulaError, FormulaResult};
use crate::graph::Operator;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

/// SUM function
pub fn fn_sum<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    Ok(CompileResult::number(numbers.iter().sum()))
}

/// SUMSQ(number1, [number2], ...) - Sum of squares
pub fn fn_sumsq<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    Ok(CompileResult::number(numbers.iter().map(|n| n * n).sum()))
}

/// PRODUCT function
///
/// Without any number the product is 0, not 1.
pub fn fn_product<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    if numbers.is_empty() {
        return Ok(CompileResult::number(0.0));
    }
    Ok(CompileResult::number(numbers.iter().product()))
}

/// SUMPRODUCT(array1, [array2], ...) - Sum of element-wise products
///
/// All arrays must have the same shape. Non-numeric entries count as 0.
pub fn fn_sumproduct<'a>(
    args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let mut products: Option<Vec<f64>> = None;
    let mut shape = None;
    for arg in args {
        let (rows, cols, values) = dense_values(arg);
        match shape {
            Some(expected) if expected != (rows, cols) => return Err(CellError::Value.into()),
            _ => shape = Some((rows, cols)),
        }
        let numbers = values
            .iter()
            .map(|v| match v {
                FormulaValue::Number(n) => Ok(*n),
                FormulaValue::Error(e) => Err(FormulaError::Excel(*e)),
                _ => Ok(0.0),
            })
            .collect::<FormulaResult<Vec<f64>>>()?;
        products = Some(match products {
            None => numbers,
            Some(acc) => acc.iter().zip(&numbers).map(|(a, b)| a * b).collect(),
        });
    }
    Ok(CompileResult::number(products.unwrap_or_default().iter().sum()))
}

/// Numeric pairs of two equally sized arrays; pairs with a non-number on
/// either side are skipped
fn paired_numbers(
    x: &FunctionArgument<'_>,
    y: &FunctionArgument<'_>,
) -> FormulaResult<Vec<(f64, f64)>> {
    let (_, _, xs) = dense_values(x);
    let (_, _, ys) = dense_values(y);
    if xs.len() != ys.len() {
        return Err(CellError::Na.into());
    }
    let mut pairs = Vec::with_capacity(xs.len());
    for (a, b) in xs.iter().zip(&ys) {
        if let Some(e) = a.get_error().or_else(|| b.get_error()) {
            return Err(e.into());
        }
        if let (FormulaValue::Number(a), FormulaValue::Number(b)) = (a, b) {
            pairs.push((*a, *b));
        }
    }
    Ok(pairs)
}

fn sum_pairs<'a>(
    args: &[FunctionArgument<'a>],
    term: fn(f64, f64) -> f64,
) -> FormulaResult<CompileResult<'a>> {
    let (Some(x), Some(y)) = (args.first(), args.get(1)) else {
        return Err(CellError::Value.into());
    };
    let pairs = paired_numbers(x, y)?;
    Ok(CompileResult::number(
        pairs.into_iter().map(|(x, y)| term(x, y)).sum(),
    ))
}

/// SUMX2MY2(array_x, array_y) - Sum of x² - y²
pub fn fn_sumx2my2<'a>(
    args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    sum_pairs(args, |x, y| x * x - y * y)
}

/// SUMX2PY2(array_x, array_y) - Sum of x² + y²
pub fn fn_sumx2py2<'a>(
    args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    sum_pairs(args, |x, y| x * x + y * y)
}

/// SUMXMY2(array_x, array_y) - Sum of (x - y)²
pub fn fn_sumxmy2<'a>(
    args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    sum_pairs(args, |x, y| (x - y) * (x - y))
}

/// ABS function
pub fn fn_abs<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| Ok(n.abs()))
}

/// SIGN(number) - 1, 0 or -1
pub fn fn_sign<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| {
        Ok(if n > 0.0 {
            1.0
        } else if n < 0.0 {
            -1.0
        } else {
            0.0
        })
    })
}

/// SQRT function
pub fn fn_sqrt<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| {
        if n < 0.0 {
            Err(CellError::Num)
        } else {
            Ok(n.sqrt())
        }
    })
}

/// SQRTPI(number) - Square root of number * pi
pub fn fn_sqrtpi<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| {
        if n < 0.0 {
            Err(CellError::Num)
        } else {
            Ok((n * std::f64::consts::PI).sqrt())
        }
    })
}

/// POWER(number, power) - Same rules as the ^ operator
pub fn fn_power<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let base = FormulaValue::Number(arg_number(args, 0, ctx)?);
    let exponent = FormulaValue::Number(arg_number(args, 1, ctx)?);
    Ok(CompileResult::new(Operator::Power.apply(&base, &exponent)))
}

/// EXP function
pub fn fn_exp<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| Ok(n.exp()))
}

/// LN function
pub fn fn_ln<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| {
        if n <= 0.0 {
            Err(CellError::Num)
        } else {
            Ok(n.ln())
        }
    })
}

/// LOG(number, [base]) - Logarithm, base 10 by default
pub fn fn_log<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let base = opt_number(args, 1, ctx, 10.0)?;
    if number <= 0.0 || base <= 0.0 {
        return Err(CellError::Num.into());
    }
    if base == 1.0 {
        return Err(CellError::Div0.into());
    }
    let log = if base == 10.0 {
        number.log10()
    } else {
        number.ln() / base.ln()
    };
    Ok(CompileResult::number(log))
}

/// LOG10 function
pub fn fn_log10<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    unary_number(args, ctx, |n| {
        if n <= 0.0 {
            Err(CellError::Num)
        } else {
            Ok(n.log10())
        }
    })
}

/// PI function
pub fn fn_pi<'a>(
    _args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::number(std::f64::consts::PI))
}

/// MOD(number, divisor) - Remainder with the sign of the divisor
pub fn fn_mod<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let divisor = arg_number(args, 1, ctx)?;
    if divisor == 0.0 {
        return Err(CellError::Div0.into());
    }
    Ok(CompileResult::number(
        number - divisor * (number / divisor).floor(),
    ))
}

/// QUOTIENT(numerator, denominator) - Integer part of a division
pub fn fn_quotient<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numerator = arg_number(args, 0, ctx)?;
    let denominator = arg_number(args, 1, ctx)?;
    if denominator == 0.0 {
        return Err(CellError::Div0.into());
    }
    Ok(CompileResult::number((numerator / denominator).trunc()))
}

fn gcd(mut a: f64, mut b: f64) -> f64 {
    while b != 0.0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn non_negative_integers<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<Vec<f64>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    if numbers.iter().any(|n| *n < 0.0) {
        return Err(CellError::Num.into());
    }
    Ok(numbers.into_iter().map(f64::trunc).collect())
}

/// GCD(number1, [number2], ...) - Greatest common divisor
pub fn fn_gcd<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = non_negative_integers(args, ctx, config)?;
    Ok(CompileResult::number(numbers.into_iter().fold(0.0, gcd)))
}

/// LCM(number1, [number2], ...) - Least common multiple
pub fn fn_lcm<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = non_negative_integers(args, ctx, config)?;
    if numbers.iter().any(|n| *n == 0.0) {
        return Ok(CompileResult::number(0.0));
    }
    let lcm = numbers
        .into_iter()
        .fold(1.0, |acc, n| acc / gcd(acc, n) * n);
    Ok(CompileResult::number(lcm))
}

/// RAND() - Uniform random number in [0, 1)
pub fn fn_rand<'a>(
    _args: &[FunctionArgument<'a>],
    _ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    Ok(CompileResult::number(rand::thread_rng().gen::<f64>()))
}

/// RANDBETWEEN(bottom, top) - Random integer, both ends inclusive
pub fn fn_randbetween<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let bottom = arg_number(args, 0, ctx)?.ceil();
    let top = arg_number(args, 1, ctx)?.floor();
    if bottom > top {
        return Err(CellError::Num.into());
    }
    let value = rand::thread_rng().gen_range(bottom as i64..=top as i64);
    Ok(CompileResult::number(value as f64))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use FunctionCategory::Math;

    registry.register(FunctionDef::new("SUM", 1, None, fn_sum, Math));
    registry.register(FunctionDef::new("SUMSQ", 1, None, fn_sumsq, Math));
    registry.register(FunctionDef::new("PRODUCT", 1, None, fn_product, Math));
    registry.register(FunctionDef::new("SUMPRODUCT", 1, None, fn_sumproduct, Math));
    registry.register(FunctionDef::new("SUMX2MY2", 2, Some(2), fn_sumx2my2, Math));
    registry.register(FunctionDef::new("SUMX2PY2", 2, Some(2), fn_sumx2py2, Math));
    registry.register(FunctionDef::new("SUMXMY2", 2, Some(2), fn_sumxmy2, Math));
    registry.register(FunctionDef::new("ABS", 1, Some(1), fn_abs, Math));
    registry.register(FunctionDef::new("SIGN", 1, Some(1), fn_sign, Math));
    registry.register(FunctionDef::new("SQRT", 1, Some(1), fn_sqrt, Math));
    registry.register(FunctionDef::new("SQRTPI", 1, Some(1), fn_sqrtpi, Math));
    registry.register(FunctionDef::new("POWER", 2, Some(2), fn_power, Math));
    registry.register(FunctionDef::new("EXP", 1, Some(1), fn_exp, Math));
    registry.register(FunctionDef::new("LN", 1, Some(1), fn_ln, Math));
    registry.register(FunctionDef::new("LOG", 1, Some(2), fn_log, Math));
    registry.register(FunctionDef::new("LOG10", 1, Some(1), fn_log10, Math));
    registry.register(FunctionDef::new("PI", 0, Some(0), fn_pi, Math));
    registry.register(FunctionDef::new("MOD", 2, Some(2), fn_mod, Math));
    registry.register(FunctionDef::new("QUOTIENT", 2, Some(2), fn_quotient, Math));
    registry.register(FunctionDef::new("GCD", 1, None, fn_gcd, Math));
    registry.register(FunctionDef::new("LCM", 1, None, fn_lcm, Math));
    registry.register(FunctionDef::new("RAND", 0, Some(0), fn_rand, Math).volatile());
    registry.register(
        FunctionDef::new("RANDBETWEEN", 2, Some(2), fn_randbetween, Math).volatile(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{assert_close, eval, eval_in, num, workbook_with};
    use gridcalc_core::CellValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sum_ignores_text_in_ranges() {
        let wb = workbook_with(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::string("x")),
            ("A3", CellValue::Boolean(true)),
            ("A4", CellValue::Number(4.0)),
        ]);
        assert_eq!(eval_in(&wb, "=SUM(A1:A4)"), FormulaValue::Number(5.0));
        assert_eq!(eval_in(&wb, "=SUM(A1:A4,TRUE,\"2\")"), FormulaValue::Number(8.0));
        assert_eq!(eval("=SUM(\"x\")"), FormulaValue::Error(CellError::Value));
        assert_eq!(num("=SUM({1,2;3,4})"), 10.0);
        assert_eq!(num("=SUMSQ(3,4)"), 25.0);
        assert_eq!(num("=PRODUCT(2,3,4)"), 24.0);
    }

    #[test]
    fn test_sum_propagates_errors() {
        let wb = workbook_with(&[
            ("A1", CellValue::Number(1.0)),
            ("A2", CellValue::Error(CellError::Div0)),
        ]);
        assert_eq!(eval_in(&wb, "=SUM(A1:A2)"), FormulaValue::Error(CellError::Div0));
    }

    #[test]
    fn test_sumproduct_and_pairs() {
        assert_eq!(num("=SUMPRODUCT({1,2,3},{4,5,6})"), 32.0);
        assert_eq!(
            eval("=SUMPRODUCT({1,2},{1,2,3})"),
            FormulaValue::Error(CellError::Value)
        );
        assert_eq!(num("=SUMX2MY2({2,3},{1,1})"), 11.0);
        assert_eq!(num("=SUMX2PY2({2,3},{1,1})"), 15.0);
        assert_eq!(num("=SUMXMY2({2,3},{1,1})"), 5.0);
        assert_eq!(eval("=SUMXMY2({1,2},{1})"), FormulaValue::Error(CellError::Na));
    }

    #[test]
    fn test_scalar_functions() {
        assert_eq!(num("=ABS(-3)"), 3.0);
        assert_eq!(num("=SIGN(-0.5)"), -1.0);
        assert_eq!(num("=SQRT(16)"), 4.0);
        assert_eq!(eval("=SQRT(-1)"), FormulaValue::Error(CellError::Num));
        assert_close(num("=SQRTPI(1)"), std::f64::consts::PI.sqrt());
        assert_eq!(num("=POWER(2,10)"), 1024.0);
        assert_eq!(eval("=POWER(0,0)"), FormulaValue::Error(CellError::Num));
        assert_close(num("=LN(EXP(2))"), 2.0);
        assert_close(num("=LOG(8,2)"), 3.0);
        assert_eq!(num("=LOG(1000)"), 3.0);
        assert_eq!(eval("=LOG(10,1)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=LOG10(0)"), FormulaValue::Error(CellError::Num));
        assert_close(num("=PI()"), std::f64::consts::PI);
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(num("=MOD(3,2)"), 1.0);
        assert_eq!(num("=MOD(-3,2)"), 1.0);
        assert_eq!(num("=MOD(3,-2)"), -1.0);
        assert_eq!(eval("=MOD(1,0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(num("=QUOTIENT(-10,3)"), -3.0);
        assert_eq!(num("=GCD(24,36)"), 12.0);
        assert_eq!(num("=LCM(4,6)"), 12.0);
        assert_eq!(eval("=GCD(-1,2)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_random_functions_stay_in_bounds() {
        for _ in 0..50 {
            let r = num("=RAND()");
            assert!((0.0..1.0).contains(&r));
            let b = num("=RANDBETWEEN(1,6)");
            assert!((1.0..=6.0).contains(&b) && b.fract() == 0.0);
        }
        assert_eq!(eval("=RANDBETWEEN(5,1)"), FormulaValue::Error(CellError::Num));
    }
}
