//! Combinatorics and roman numerals

use super::helpers::{arg_int, arg_text, collect_numbers, is_omitted, scalar, NumberMode};
use super::{FunctionCategory, FunctionConfig, FunctionDef, FunctionRegistry};
use crate::context::ParsingContext;
use crate::convert::to_number;
use crate::error::FormulaResult;
use crate::value::{CompileResult, FormulaValue, FunctionArgument};
use gridcalc_core::CellError;

/// Largest n for which n! is a finite f64
const MAX_FACTORIAL: f64 = 170.0;

/// Largest n for which n!! is a finite f64
const MAX_DOUBLE_FACTORIAL: f64 = 300.0;

fn factorial(n: f64) -> f64 {
    (2..=n as u64).fold(1.0, |acc, i| acc * i as f64)
}

/// n choose k, computed multiplicatively
///
/// The partial products only grow, so an overflow ends the loop early and
/// comes back as infinity.
fn combinations(n: f64, k: f64) -> f64 {
    let k = k.min(n - k);
    let mut result = 1.0;
    let mut i = 0.0;
    while i < k {
        result *= (n - i) / (i + 1.0);
        if !result.is_finite() {
            return result;
        }
        i += 1.0;
    }
    result.round()
}

fn two_counts<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &ParsingContext<'a>,
) -> FormulaResult<(f64, f64)> {
    let n = arg_int(args, 0, ctx)?;
    let k = arg_int(args, 1, ctx)?;
    if n < 0.0 || k < 0.0 {
        return Err(CellError::Num.into());
    }
    Ok((n, k))
}

fn finite(value: f64) -> FormulaResult<CompileResult<'static>> {
    if value.is_finite() {
        Ok(CompileResult::number(value))
    } else {
        Err(CellError::Num.into())
    }
}

/// FACT(number) - Factorial of the truncated number
pub fn fn_fact<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let n = arg_int(args, 0, ctx)?;
    if !(0.0..=MAX_FACTORIAL).contains(&n) {
        return Err(CellError::Num.into());
    }
    Ok(CompileResult::number(factorial(n)))
}

/// FACTDOUBLE(number) - n * (n-2) * (n-4) * ...
pub fn fn_factdouble<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let n = arg_int(args, 0, ctx)?;
    if !(-1.0..=MAX_DOUBLE_FACTORIAL).contains(&n) {
        return Err(CellError::Num.into());
    }
    let mut result = 1.0;
    let mut i = n;
    while i > 1.0 {
        result *= i;
        i -= 2.0;
    }
    finite(result)
}

/// COMBIN(number, number_chosen) - Combinations without repetition
pub fn fn_combin<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (n, k) = two_counts(args, ctx)?;
    if n < k {
        return Err(CellError::Num.into());
    }
    finite(combinations(n, k))
}

/// COMBINA(number, number_chosen) - Combinations with repetition
pub fn fn_combina<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (n, k) = two_counts(args, ctx)?;
    if n == 0.0 {
        return Ok(CompileResult::number(if k == 0.0 { 1.0 } else { 0.0 }));
    }
    finite(combinations(n + k - 1.0, k))
}

/// PERMUT(number, number_chosen) - Ordered selections without repetition
pub fn fn_permut<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (n, k) = two_counts(args, ctx)?;
    if n < k {
        return Err(CellError::Num.into());
    }
    let mut result = 1.0;
    let mut i = 0.0;
    while i < k {
        result *= n - i;
        if !result.is_finite() {
            break;
        }
        i += 1.0;
    }
    finite(result)
}

/// PERMUTATIONA(number, number_chosen) - Ordered selections with repetition
pub fn fn_permutationa<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let (n, k) = two_counts(args, ctx)?;
    finite(n.powf(k))
}

/// MULTINOMIAL(number1, [number2], ...) - (a+b+...)! / (a! * b! * ...)
pub fn fn_multinomial<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let numbers = collect_numbers(args, ctx, config, NumberMode::Numbers)?;
    let mut total = 0.0;
    let mut result = 1.0;
    for n in numbers {
        let n = n.trunc();
        if n < 0.0 {
            return Err(CellError::Num.into());
        }
        total += n;
        result *= combinations(total, n);
    }
    finite(result)
}

const ROMAN_CHARS: [char; 7] = ['M', 'D', 'C', 'L', 'X', 'V', 'I'];
const ROMAN_VALUES: [u32; 7] = [1000, 500, 100, 50, 10, 5, 1];

/// Roman numeral of `value` (0-3999) in one of the five forms
///
/// Form 0 is classic; each higher form allows wider subtractive pairs, so
/// 499 goes from CDXCIX (form 0) down to ID (form 4).
pub fn to_roman(value: u32, form: u32) -> String {
    let max_index = ROMAN_VALUES.len() - 1;
    let mut roman = String::new();
    let mut rest = value;
    for i in 0..=max_index / 2 {
        let index = 2 * i;
        let digit = rest / ROMAN_VALUES[index];
        if digit % 5 == 4 {
            let index2 = if digit == 4 { index - 1 } else { index - 2 };
            let mut low = index;
            let mut steps = 0;
            while steps < form && low < max_index {
                steps += 1;
                if ROMAN_VALUES[index2] - ROMAN_VALUES[low + 1] <= rest {
                    low += 1;
                } else {
                    steps = form;
                }
            }
            roman.push(ROMAN_CHARS[low]);
            roman.push(ROMAN_CHARS[index2]);
            rest = rest + ROMAN_VALUES[low] - ROMAN_VALUES[index2];
        } else {
            if digit > 4 {
                roman.push(ROMAN_CHARS[index - 1]);
            }
            for _ in 0..digit % 5 {
                roman.push(ROMAN_CHARS[index]);
            }
            rest %= ROMAN_VALUES[index];
        }
    }
    roman
}

/// ROMAN(number, [form]) - Roman numeral as text
///
/// Form may be 0-4, TRUE (classic) or FALSE (simplified, same as 4).
pub fn fn_roman<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let number = arg_int(args, 0, ctx)?;
    if !(0.0..=3999.0).contains(&number) {
        return Err(CellError::Value.into());
    }
    let form = if is_omitted(args, 1) {
        0.0
    } else {
        match scalar(&args[1], ctx) {
            FormulaValue::Boolean(true) => 0.0,
            FormulaValue::Boolean(false) => 4.0,
            other => to_number(&other)?.trunc(),
        }
    };
    if !(0.0..=4.0).contains(&form) {
        return Err(CellError::Value.into());
    }
    Ok(CompileResult::string(to_roman(number as u32, form as u32)))
}

fn roman_value(c: char) -> Option<i64> {
    ROMAN_CHARS
        .iter()
        .position(|r| *r == c.to_ascii_uppercase())
        .map(|i| ROMAN_VALUES[i] as i64)
}

/// ARABIC(text) - Value of a roman numeral, any form, optional minus sign
pub fn fn_arabic<'a>(
    args: &[FunctionArgument<'a>],
    ctx: &mut ParsingContext<'a>,
    _config: FunctionConfig,
) -> FormulaResult<CompileResult<'a>> {
    let text = arg_text(args, 0, ctx)?;
    let trimmed = text.trim();
    if trimmed.len() > 255 {
        return Err(CellError::Value.into());
    }
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed),
    };
    let values = digits
        .chars()
        .map(roman_value)
        .collect::<Option<Vec<i64>>>()
        .ok_or(CellError::Value)?;
    let mut total = 0;
    for (i, value) in values.iter().enumerate() {
        match values.get(i + 1) {
            Some(next) if next > value => total -= value,
            _ => total += value,
        }
    }
    Ok(CompileResult::number(sign * total as f64))
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    use super::ExcelVersion::Excel2013;
    use FunctionCategory::Combinatorics;

    registry.register(FunctionDef::new("FACT", 1, Some(1), fn_fact, Combinatorics));
    registry.register(FunctionDef::new(
        "FACTDOUBLE",
        1,
        Some(1),
        fn_factdouble,
        Combinatorics,
    ));
    registry.register(FunctionDef::new("COMBIN", 2, Some(2), fn_combin, Combinatorics));
    registry.register(
        FunctionDef::new("COMBINA", 2, Some(2), fn_combina, Combinatorics).since(Excel2013),
    );
    registry.register(FunctionDef::new("PERMUT", 2, Some(2), fn_permut, Combinatorics));
    registry.register(
        FunctionDef::new("PERMUTATIONA", 2, Some(2), fn_permutationa, Combinatorics)
            .since(Excel2013),
    );
    registry.register(FunctionDef::new(
        "MULTINOMIAL",
        1,
        None,
        fn_multinomial,
        Combinatorics,
    ));
    registry.register(FunctionDef::new("ROMAN", 1, Some(2), fn_roman, Combinatorics));
    registry.register(
        FunctionDef::new("ARABIC", 1, Some(1), fn_arabic, Combinatorics).since(Excel2013),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::test_support::{eval, num};
    use pretty_assertions::assert_eq;

    fn text(formula: &str) -> String {
        match eval(formula) {
            FormulaValue::String(s) => s,
            other => panic!("{} evaluated to {:?}", formula, other),
        }
    }

    #[test]
    fn test_factorials() {
        assert_eq!(num("=FACT(5)"), 120.0);
        assert_eq!(num("=FACT(1.9)"), 1.0);
        assert_eq!(num("=FACT(0)"), 1.0);
        assert_eq!(eval("=FACT(-1)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=FACT(171)"), FormulaValue::Error(CellError::Num));
        assert_eq!(num("=FACTDOUBLE(6)"), 48.0);
        assert_eq!(num("=FACTDOUBLE(7)"), 105.0);
        assert_eq!(num("=FACTDOUBLE(-1)"), 1.0);
    }

    #[test]
    fn test_combinations_and_permutations() {
        assert_eq!(num("=COMBIN(8,2)"), 28.0);
        assert_eq!(num("=COMBIN(5,0)"), 1.0);
        assert_eq!(eval("=COMBIN(2,3)"), FormulaValue::Error(CellError::Num));
        assert_eq!(num("=COMBINA(4,3)"), 20.0);
        assert_eq!(num("=PERMUT(100,3)"), 970200.0);
        assert_eq!(num("=PERMUTATIONA(3,2)"), 9.0);
        assert_eq!(eval("=PERMUT(-1,2)"), FormulaValue::Error(CellError::Num));
        assert_eq!(num("=MULTINOMIAL(2,3,4)"), 1260.0);
    }

    #[test]
    fn test_double_factorial_limits() {
        assert!(num("=FACTDOUBLE(300)") > 8e307);
        assert_eq!(eval("=FACTDOUBLE(301)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=FACTDOUBLE(1E300)"), FormulaValue::Error(CellError::Num));
        assert_eq!(eval("=FACTDOUBLE(-2)"), FormulaValue::Error(CellError::Num));
    }

    #[test]
    fn test_huge_counts_overflow_to_num_error() {
        for formula in [
            "=PERMUT(1E20,1E20)",
            "=PERMUT(1E12,1E12)",
            "=COMBIN(1E20,5E19)",
            "=COMBIN(1E12,6E11)",
            "=COMBINA(1E15,1E15)",
            "=MULTINOMIAL(1E10,1E10)",
        ] {
            assert_eq!(eval(formula), FormulaValue::Error(CellError::Num), "{}", formula);
        }
        assert_eq!(num("=COMBIN(1E12,1)"), 1e12);
        assert_eq!(num("=PERMUT(1E12,1)"), 1e12);
    }

    #[test]
    fn test_roman_forms() {
        assert_eq!(text("=ROMAN(499,0)"), "CDXCIX");
        assert_eq!(text("=ROMAN(499,1)"), "LDVLIV");
        assert_eq!(text("=ROMAN(499,2)"), "XDIX");
        assert_eq!(text("=ROMAN(499,3)"), "VDIV");
        assert_eq!(text("=ROMAN(499,4)"), "ID");
        assert_eq!(text("=ROMAN(499,FALSE)"), "ID");
        assert_eq!(text("=ROMAN(1999,TRUE)"), "MCMXCIX");
        assert_eq!(text("=ROMAN(3999)"), "MMMCMXCIX");
        assert_eq!(text("=ROMAN(0)"), "");
        assert_eq!(eval("=ROMAN(4000)"), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=ROMAN(10,5)"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_arabic() {
        assert_eq!(num("=ARABIC(\"MCMXCIX\")"), 1999.0);
        assert_eq!(num("=ARABIC(\"id\")"), 499.0);
        assert_eq!(num("=ARABIC(\"-XIV\")"), -14.0);
        assert_eq!(num("=ARABIC(\"\")"), 0.0);
        assert_eq!(eval("=ARABIC(\"ABC\")"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_roman_round_trips_through_arabic() {
        for value in [1, 4, 9, 14, 40, 90, 400, 944, 1666, 2024, 3999] {
            for form in 0..=4 {
                let formula = format!("=ARABIC(ROMAN({},{}))", value, form);
                assert_eq!(num(&formula), value as f64, "{}", formula);
            }
        }
    }
}
