//! Rounding functions
//!
//! Digit rounding goes through `rust_decimal` so that values such as 2.675
//! round the way they print. Multiple-based rounding (CEILING, FLOOR and
//! friends) cleans the number to 15 significant digits and snaps in decimal.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::helpers::{arg_number, is_omitted, opt_number};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FunctionArgument};
use gridcalc_core::CellError;

/// Round `number` to `digits` significant digits
///
/// Midpoints go away from zero when `away_from_midpoint` is set, to the
/// nearest even digit otherwise.
pub fn round_to_significant_fig(number: f64, digits: u32, away_from_midpoint: bool) -> f64 {
    if number == 0.0 || !number.is_finite() || digits == 0 {
        return number;
    }
    let exponent = number.abs().log10().floor() as i32;
    let strategy = if away_from_midpoint {
        RoundingStrategy::MidpointAwayFromZero
    } else {
        RoundingStrategy::MidpointNearestEven
    };
    round_digits(number, digits as i32 - 1 - exponent, strategy)
}

/// Round to `decimals` places; negative values round left of the point
pub fn round_digits(number: f64, decimals: i32, strategy: RoundingStrategy) -> f64 {
    if !number.is_finite() {
        return number;
    }
    if decimals < 0 {
        let scale = 10f64.powi(-decimals);
        return round_digits(number / scale, 0, strategy) * scale;
    }
    if decimals <= 28 {
        // shortest round-trip text, so 2.675 is 2.675 and not 2.67499...
        let rounded = number
            .to_string()
            .parse::<Decimal>()
            .ok()
            .map(|d| d.round_dp_with_strategy(decimals as u32, strategy))
            .and_then(|d| d.to_f64());
        if let Some(r) = rounded {
            return r;
        }
    }
    let scale = 10f64.powi(decimals.min(308));
    let scaled = number * scale;
    if !scaled.is_finite() {
        return number;
    }
    round_f64(scaled, strategy) / scale
}

fn round_f64(x: f64, strategy: RoundingStrategy) -> f64 {
    match strategy {
        RoundingStrategy::ToZero => x.trunc(),
        RoundingStrategy::AwayFromZero => {
            if x < 0.0 {
                x.floor()
            } else {
                x.ceil()
            }
        }
        RoundingStrategy::ToNegativeInfinity => x.floor(),
        RoundingStrategy::ToPositiveInfinity => x.ceil(),
        _ => x.round(),
    }
}

/// How [`RoundingHelper::round`] snaps to a multiple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward positive infinity
    Up,
    /// Toward negative infinity
    Down,
    /// Away from zero
    AlwaysUp,
    /// Toward zero
    AlwaysDown,
    /// Nearest multiple, midpoints away from zero
    Nearest,
}

/// Snapping to multiples of a significance
pub struct RoundingHelper;

impl RoundingHelper {
    /// Round `number` to a multiple of `multiple`; a zero multiple gives 0
    ///
    /// The quotient is taken in decimal, so 1.3 to the nearest 0.2 is 1.4
    /// exactly. Values outside the decimal range fall back to f64.
    pub fn round(number: f64, multiple: f64, direction: Direction) -> f64 {
        if multiple == 0.0 {
            return 0.0;
        }
        let number = round_to_significant_fig(number, 15, true);
        Self::round_decimal(number, multiple, direction)
            .unwrap_or_else(|| Self::round_float(number, multiple, direction))
    }

    fn round_decimal(number: f64, multiple: f64, direction: Direction) -> Option<f64> {
        let number = number.to_string().parse::<Decimal>().ok()?;
        let multiple = multiple.to_string().parse::<Decimal>().ok()?;
        if multiple.is_zero() {
            return None;
        }
        let strategy = match direction {
            Direction::Up => RoundingStrategy::ToPositiveInfinity,
            Direction::Down => RoundingStrategy::ToNegativeInfinity,
            Direction::AlwaysUp => RoundingStrategy::AwayFromZero,
            Direction::AlwaysDown => RoundingStrategy::ToZero,
            Direction::Nearest => RoundingStrategy::MidpointAwayFromZero,
        };
        number
            .checked_div(multiple)?
            .round_dp_with_strategy(0, strategy)
            .checked_mul(multiple)?
            .to_f64()
    }

    fn round_float(number: f64, multiple: f64, direction: Direction) -> f64 {
        let quotient = round_to_significant_fig(number / multiple, 15, true);
        let snapped = match direction {
            Direction::Up => quotient.ceil(),
            Direction::Down => quotient.floor(),
            Direction::AlwaysUp => round_f64(quotient, RoundingStrategy::AwayFromZero),
            Direction::AlwaysDown => quotient.trunc(),
            Direction::Nearest => quotient.round(),
        };
        round_to_significant_fig(snapped * multiple, 15, true)
    }
}

fn digits_arg<'a>(
    args: &[FunctionArgument<'a>],
    index: usize,
    ctx: &ParsingContext<'a>,
) -> FormulaResult<i32> {
    let digits = opt_number(args, index, ctx, 0.0)?.trunc();
    Ok(digits.clamp(-308.0, 308.0) as i32)
}

/// ROUND(number, num_digits) - Rounds half away from zero
pub fn fn_round<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let digits = digits_arg(args, 1, ctx)?;
    Ok(CompileResult::number(round_digits(
        number,
        digits,
        RoundingStrategy::MidpointAwayFromZero,
    )))
}

/// ROUNDUP(number, num_digits) - Rounds away from zero
pub fn fn_roundup<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let digits = digits_arg(args, 1, ctx)?;
    Ok(CompileResult::number(round_digits(
        number,
        digits,
        RoundingStrategy::AwayFromZero,
    )))
}

/// ROUNDDOWN(number, num_digits) - Rounds toward zero
pub fn fn_rounddown<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let digits = digits_arg(args, 1, ctx)?;
    Ok(CompileResult::number(round_digits(
        number,
        digits,
        RoundingStrategy::ToZero,
    )))
}

/// TRUNC(number, [num_digits]) - ROUNDDOWN with an optional digit count
pub fn fn_trunc<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    fn_rounddown(args, ctx, config)
}

/// INT(number) - Rounds down to the nearest integer
pub fn fn_int<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    Ok(CompileResult::number(number.floor()))
}

/// MROUND(number, multiple) - Rounds to the nearest multiple
///
/// Number and multiple must share a sign.
pub fn fn_mround<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let multiple = arg_number(args, 1, ctx)?;
    if multiple == 0.0 {
        return Ok(CompileResult::number(0.0));
    }
    if number != 0.0 && number.signum() != multiple.signum() {
        return Err(CellError::Num.into());
    }
    Ok(CompileResult::number(RoundingHelper::round(
        number,
        multiple,
        Direction::Nearest,
    )))
}

/// CEILING(number, significance) - Rounds up to a multiple of significance
///
/// Negative numbers with a negative significance round away from zero; a
/// positive number with a negative significance is #NUM!.
pub fn fn_ceiling<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let significance = arg_number(args, 1, ctx)?;
    if number > 0.0 && significance < 0.0 {
        return Err(CellError::Num.into());
    }
    Ok(CompileResult::number(RoundingHelper::round(
        number,
        significance,
        Direction::Up,
    )))
}

fn math_rounding<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
    toward_positive: Direction,
    negative_mode: Direction,
) -> FormulaResult<f64> {
    let number = arg_number(args, 0, ctx)?;
    let significance = opt_number(args, 1, ctx, 1.0)?.abs();
    let mode = opt_number(args, 2, ctx, 0.0)?;
    let direction = if number < 0.0 && mode != 0.0 {
        negative_mode
    } else {
        toward_positive
    };
    Ok(RoundingHelper::round(number, significance, direction))
}

/// CEILING.MATH(number, [significance], [mode])
///
/// A non-zero mode rounds negative numbers away from zero.
pub fn fn_ceiling_math<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    math_rounding(args, ctx, Direction::Up, Direction::AlwaysUp).map(CompileResult::number)
}

/// CEILING.PRECISE(number, [significance]) - Always toward positive infinity;
/// ISO.CEILING is the same function
pub fn fn_ceiling_precise<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let significance = opt_number(args, 1, ctx, 1.0)?.abs();
    Ok(CompileResult::number(RoundingHelper::round(
        number,
        significance,
        Direction::Up,
    )))
}

/// FLOOR(number, significance) - Rounds down to a multiple of significance
pub fn fn_floor<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let significance = arg_number(args, 1, ctx)?;
    if significance == 0.0 {
        if number == 0.0 {
            return Ok(CompileResult::number(0.0));
        }
        return Err(CellError::Div0.into());
    }
    if number > 0.0 && significance < 0.0 {
        return Err(CellError::Num.into());
    }
    Ok(CompileResult::number(RoundingHelper::round(
        number,
        significance,
        Direction::Down,
    )))
}

/// FLOOR.MATH(number, [significance], [mode])
///
/// A non-zero mode rounds negative numbers toward zero.
pub fn fn_floor_math<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    math_rounding(args, ctx, Direction::Down, Direction::AlwaysDown).map(CompileResult::number)
}

/// FLOOR.PRECISE(number, [significance])
pub fn fn_floor_precise<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    let significance = if is_omitted(args, 1) {
        1.0
    } else {
        arg_number(args, 1, ctx)?.abs()
    };
    Ok(CompileResult::number(RoundingHelper::round(
        number,
        significance,
        Direction::Down,
    )))
}

fn round_to_parity(number: f64, odd: bool) -> f64 {
    let magnitude = number.abs().ceil();
    let is_odd = magnitude % 2.0 == 1.0;
    let adjusted = match (odd, is_odd) {
        (true, true) | (false, false) => magnitude,
        _ => magnitude + 1.0,
    };
    // ODD(0) is 1, EVEN(0) is 0
    if number < 0.0 {
        -adjusted
    } else {
        adjusted
    }
}

/// EVEN(number) - Rounds away from zero to the nearest even integer
pub fn fn_even<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    Ok(CompileResult::number(round_to_parity(number, false)))
}

/// ODD(number) - Rounds away from zero to the nearest odd integer
pub fn fn_odd<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_number(args, 0, ctx)?;
    Ok(CompileResult::number(round_to_parity(number, true)))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::{Excel2010, Excel2013};
    use FunctionCategory::Rounding;

    registry.register(FunctionDef::new("ROUND", 2, Some(2), fn_round, Rounding));
    registry.register(FunctionDef::new("ROUNDUP", 2, Some(2), fn_roundup, Rounding));
    registry.register(FunctionDef::new("ROUNDDOWN", 2, Some(2), fn_rounddown, Rounding));
    registry.register(FunctionDef::new("TRUNC", 1, Some(2), fn_trunc, Rounding));
    registry.register(FunctionDef::new("INT", 1, Some(1), fn_int, Rounding));
    registry.register(FunctionDef::new("MROUND", 2, Some(2), fn_mround, Rounding));
    registry.register(FunctionDef::new("CEILING", 2, Some(2), fn_ceiling, Rounding));
    registry.register(
        FunctionDef::new("CEILING.MATH", 1, Some(3), fn_ceiling_math, Rounding).since(Excel2013),
    );
    registry.register(
        FunctionDef::new("CEILING.PRECISE", 1, Some(2), fn_ceiling_precise, Rounding)
            .since(Excel2010),
    );
    registry.register(
        FunctionDef::new("ISO.CEILING", 1, Some(2), fn_ceiling_precise, Rounding)
            .since(Excel2010),
    );
    registry.register(FunctionDef::new("FLOOR", 2, Some(2), fn_floor, Rounding));
    registry.register(
        FunctionDef::new("FLOOR.MATH", 1, Some(3), fn_floor_math, Rounding).since(Excel2013),
    );
    registry.register(
        FunctionDef::new("FLOOR.PRECISE", 1, Some(2), fn_floor_precise, Rounding)
            .since(Excel2010),
    );
    registry.register(FunctionDef::new("EVEN", 1, Some(1), fn_even, Rounding));
    registry.register(FunctionDef::new("ODD", 1, Some(1), fn_odd, Rounding));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{assert_close, eval, num};
    use crate::value::FormulaValue;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_round_family() {
        assert_eq!(num("=ROUND(2.5,0)"), 3.0);
        assert_eq!(num("=ROUND(-2.5,0)"), -3.0);
        assert_eq!(num("=ROUND(2.675,2)"), 2.68);
        assert_eq!(num("=ROUND(1234.5678,-2)"), 1200.0);
        assert_eq!(num("=ROUNDUP(3.2,0)"), 4.0);
        assert_eq!(num("=ROUNDUP(-3.2,0)"), -4.0);
        assert_eq!(num("=ROUNDDOWN(3.9,0)"), 3.0);
        assert_eq!(num("=ROUNDDOWN(-3.14159,3)"), -3.141);
        assert_eq!(num("=TRUNC(8.9)"), 8.0);
        assert_eq!(num("=TRUNC(-8.9)"), -8.0);
        assert_eq!(num("=INT(-8.9)"), -9.0);
    }

    #[test]
    fn test_multiples() {
        assert_eq!(num("=MROUND(10,3)"), 9.0);
        assert_eq!(num("=MROUND(-10,-3)"), -9.0);
        assert_close(num("=MROUND(1.3,0.2)"), 1.4);
        assert_eq!(eval("=MROUND(5,-2)"), FormulaValue::Error(CellError::Num));

        assert_eq!(num("=CEILING(2.5,1)"), 3.0);
        assert_eq!(num("=CEILING(-2.5,-2)"), -4.0);
        assert_eq!(num("=CEILING(-2.5,2)"), -2.0);
        assert_close(num("=CEILING(0.234,0.01)"), 0.24);
        assert_eq!(eval("=CEILING(1.5,-1)"), FormulaValue::Error(CellError::Num));

        assert_eq!(num("=FLOOR(3.7,2)"), 2.0);
        assert_eq!(num("=FLOOR(-2.5,-2)"), -2.0);
        assert_eq!(eval("=FLOOR(3,0)"), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=FLOOR(3.7,-2)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_math_and_precise_variants() {
        assert_eq!(num("=CEILING.MATH(24.3,5)"), 25.0);
        assert_eq!(num("=CEILING.MATH(-8.1,2)"), -8.0);
        assert_eq!(num("=CEILING.MATH(-5.5,2,-1)"), -6.0);
        assert_eq!(num("=FLOOR.MATH(24.3,5)"), 20.0);
        assert_eq!(num("=FLOOR.MATH(-8.1,2)"), -10.0);
        assert_eq!(num("=FLOOR.MATH(-5.5,2,-1)"), -4.0);
        assert_eq!(num("=CEILING.PRECISE(-4.3)"), -4.0);
        assert_eq!(num("=ISO.CEILING(4.3,-2)"), 6.0);
        assert_eq!(num("=FLOOR.PRECISE(-3.2,-1)"), -4.0);
    }

    #[test]
    fn test_even_odd() {
        assert_eq!(num("=EVEN(1.5)"), 2.0);
        assert_eq!(num("=EVEN(3)"), 4.0);
        assert_eq!(num("=EVEN(-1)"), -2.0);
        assert_eq!(num("=EVEN(0)"), 0.0);
        assert_eq!(num("=ODD(1.5)"), 3.0);
        assert_eq!(num("=ODD(2)"), 3.0);
        assert_eq!(num("=ODD(-2)"), -3.0);
        assert_eq!(num("=ODD(0)"), 1.0);
    }

    #[test]
    fn test_multiples_snap_in_decimal() {
        assert_eq!(num("=MROUND(1.3,0.2)"), 1.4);
        assert_eq!(num("=CEILING(0.234,0.01)"), 0.24);
        assert_eq!(num("=FLOOR(0.3,0.1)"), 0.3);
        assert_eq!(num("=CEILING(0.1*3,0.1)"), 0.3);
        assert_eq!(RoundingHelper::round(1.15, 0.05, Direction::Nearest), 1.15);
        assert_eq!(RoundingHelper::round(-0.35, 0.1, Direction::AlwaysDown), -0.3);
    }

    #[test]
    fn test_significant_figures() {
        assert_eq!(round_to_significant_fig(0.1 + 0.2, 15, true), 0.3);
        assert_eq!(round_to_significant_fig(123456.0, 2, true), 120000.0);
        assert_eq!(round_to_significant_fig(0.000125, 2, true), 0.00013);
        assert_eq!(round_to_significant_fig(0.000125, 2, false), 0.00012);
    }

    proptest! {
        #[test]
        fn roundup_and_rounddown_are_idempotent(x in -1.0e9f64..1.0e9, digits in -3i32..6) {
            for strategy in [RoundingStrategy::AwayFromZero, RoundingStrategy::ToZero] {
                let once = round_digits(x, digits, strategy);
                prop_assert_eq!(round_digits(once, digits, strategy), once);
            }
        }

        #[test]
        fn roundup_of_rounddown_is_rounddown(x in -1.0e6f64..1.0e6, digits in -6i32..7) {
            let down = round_digits(x, digits, RoundingStrategy::ToZero);
            prop_assert_eq!(round_digits(down, digits, RoundingStrategy::AwayFromZero), down);
        }

        #[test]
        fn rounddown_never_grows_magnitude(x in -1.0e9f64..1.0e9, digits in 0i32..6) {
            let down = round_digits(x, digits, RoundingStrategy::ToZero);
            prop_assert!(down.abs() <= x.abs() + 1e-9);
        }
    }
}
