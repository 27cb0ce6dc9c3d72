//! End-to-end formula evaluation through the workbook calculation driver

use gridcalc::prelude::*;
use gridcalc::{evaluate_formula, ParsingContext, WorkbookDataProvider};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Evaluate a standalone formula against `workbook`
fn eval(workbook: &Workbook, formula: &str) -> FormulaValue<'static> {
    let provider = WorkbookDataProvider::new(workbook);
    let mut ctx = ParsingContext::new(&provider);
    evaluate_formula(formula, &mut ctx)
        .unwrap()
        .result
        .into_scalar()
}

fn value_at(workbook: &Workbook, address: &str) -> CellValue {
    let addr = CellAddress::parse(address).unwrap();
    workbook
        .worksheet(0)
        .unwrap()
        .get_calculated_value_at(addr.row, addr.col)
        .cloned()
        .unwrap_or(CellValue::Empty)
}

fn assert_number(actual: FormulaValue<'_>, expected: f64) {
    match actual {
        FormulaValue::Number(n) => assert!(
            (n - expected).abs() < 1e-9,
            "expected {}, got {}",
            expected,
            n
        ),
        other => panic!("expected {}, got {:?}", expected, other),
    }
}

/// Region / product / units table in A1:C6
fn sales() -> Workbook {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    let rows: [(&str, &str, f64); 5] = [
        ("North", "Apples", 10.0),
        ("South", "Apples", 20.0),
        ("North", "Pears", 30.0),
        ("North", "Apples", 40.0),
        ("South", "Pears", 50.0),
    ];
    sheet.set_cell_value("A1", "Region").unwrap();
    sheet.set_cell_value("B1", "Product").unwrap();
    sheet.set_cell_value("C1", "Units").unwrap();
    for (i, (region, product, units)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.set_cell_value_at(row, 0, *region).unwrap();
        sheet.set_cell_value_at(row, 1, *product).unwrap();
        sheet.set_cell_value_at(row, 2, *units).unwrap();
    }
    wb
}

#[test]
fn test_nested_subtotals_in_a_workbook() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", 10.0).unwrap();
    sheet.set_cell_value("A2", 20.0).unwrap();
    sheet.set_cell_value("A3", 30.0).unwrap();
    sheet.set_cell_formula("A4", "=SUBTOTAL(9,A1:A3)").unwrap();
    sheet.set_cell_formula("B1", "=SUBTOTAL(9,A1:A4)").unwrap();
    sheet.set_cell_formula("B2", "=AGGREGATE(9,5,A1:A4)").unwrap();
    sheet.set_cell_formula("B3", "=SUM(A1:A4)").unwrap();
    sheet.set_cell_formula("B4", "=SUBTOTAL(9,A1,SUBTOTAL(9,A2:A3))").unwrap();

    let stats = wb.calculate().unwrap();

    assert_eq!(stats.formula_count, 5);
    assert_eq!(stats.errors, 0);
    assert_eq!(value_at(&wb, "A4"), CellValue::Number(60.0));
    assert_eq!(value_at(&wb, "B1"), CellValue::Number(60.0));
    assert_eq!(value_at(&wb, "B2"), CellValue::Number(60.0));
    assert_eq!(value_at(&wb, "B3"), CellValue::Number(120.0));
    assert_eq!(value_at(&wb, "B4"), CellValue::Number(10.0));
}

#[test]
fn test_hidden_rows_and_subtotal() {
    let mut wb = sales();
    wb.worksheet_mut(0).unwrap().set_row_hidden(2, true);
    assert_number(eval(&wb, "=SUBTOTAL(9,C2:C6)"), 150.0);
    assert_number(eval(&wb, "=SUBTOTAL(109,C2:C6)"), 130.0);
    assert_number(eval(&wb, "=AGGREGATE(4,5,C2:C6)"), 50.0);
}

#[test]
fn test_multi_criteria_intersection() {
    let wb = sales();
    assert_number(
        eval(&wb, "=SUMIFS(C2:C6,A2:A6,\"North\",B2:B6,\"Apples\",C2:C6,\">15\")"),
        40.0,
    );
    assert_number(
        eval(&wb, "=COUNTIFS(A2:A6,\"North\",B2:B6,\"Apples\",C2:C6,\">15\")"),
        1.0,
    );
    assert_number(eval(&wb, "=SUMIF(A2:A6,\"South\",C2:C6)"), 70.0);
    assert_number(eval(&wb, "=AVERAGEIF(B2:B6,\"P*\",C2:C6)"), 40.0);
    assert_number(eval(&wb, "=MAXIFS(C2:C6,A2:A6,\"North\")"), 40.0);
    assert_eq!(
        eval(&wb, "=SUMIFS(C2:C6,A2:A5,\"North\")"),
        FormulaValue::Error(CellError::Value)
    );
}

#[test]
fn test_numeric_text_matching_differs_between_sumifs_and_countifs() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", "1").unwrap();
    sheet.set_cell_value("A2", 1.0).unwrap();
    sheet.set_cell_value("A3", 2.0).unwrap();
    sheet.set_cell_value("B1", 1.0).unwrap();
    sheet.set_cell_value("B2", 2.0).unwrap();
    sheet.set_cell_value("B3", 4.0).unwrap();

    assert_number(eval(&wb, "=SUMIFS(B1:B3,A1:A3,1)"), 3.0);
    assert_number(eval(&wb, "=COUNTIFS(A1:A3,1)"), 1.0);
}

#[test]
fn test_ranking_family() {
    let wb = Workbook::new();
    assert_number(eval(&wb, "=RANK(5,{1,3,5,5,7},0)"), 2.0);
    assert_number(eval(&wb, "=RANK.AVG(5,{1,3,5,5,7},0)"), 2.5);
    assert_number(eval(&wb, "=RANK.EQ(5,{1,3,5,5,7},1)"), 3.0);
    assert_eq!(
        eval(&wb, "=RANK(4,{1,3,5,5,7})"),
        FormulaValue::Error(CellError::Na)
    );
}

#[test]
fn test_quartile_exclusive_domain() {
    let wb = Workbook::new();
    assert_number(eval(&wb, "=QUARTILE.EXC({1,2,3,4,5,6,7},2)"), 4.0);
    for formula in [
        "=QUARTILE.EXC({1,2,3,4,5,6,7},0)",
        "=QUARTILE.EXC({1,2,3,4,5,6,7},4)",
        "=QUARTILE.EXC({1,2},1)",
        "=QUARTILE.EXC({1,2},3)",
    ] {
        assert_eq!(
            eval(&wb, formula),
            FormulaValue::Error(CellError::Num),
            "{}",
            formula
        );
    }
}

#[test]
fn test_combinatorics() {
    let wb = Workbook::new();
    assert_number(eval(&wb, "=COMBIN(5,2)"), 10.0);
    assert_number(eval(&wb, "=PERMUT(5,2)"), 20.0);
    assert_eq!(eval(&wb, "=COMBIN(0,1)"), FormulaValue::Error(CellError::Num));
}

#[test]
fn test_errors_propagate_through_the_driver() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_value("A1", 0.0).unwrap();
    sheet.set_cell_formula("A2", "=1/A1").unwrap();
    sheet.set_cell_formula("A3", "=A2+1").unwrap();
    sheet.set_cell_formula("A4", "=IFERROR(A3,-1)").unwrap();
    sheet.set_cell_formula("A5", "=NOSUCHFUNCTION(1)").unwrap();

    let stats = wb.calculate().unwrap();

    assert_eq!(stats.errors, 0);
    assert_eq!(value_at(&wb, "A2"), CellValue::Error(CellError::Div0));
    assert_eq!(value_at(&wb, "A3"), CellValue::Error(CellError::Div0));
    assert_eq!(value_at(&wb, "A4"), CellValue::Number(-1.0));
    assert_eq!(value_at(&wb, "A5"), CellValue::Error(CellError::Name));
}

#[test]
fn test_excel_precision_strategy() {
    let mut wb = Workbook::new();
    let sheet = wb.worksheet_mut(0).unwrap();
    sheet.set_cell_formula("A1", "=SUM(0.1,0.2)").unwrap();

    let options = CalculationOptions {
        parsing: ParsingConfiguration::default()
            .with_precision_and_rounding(PrecisionAndRoundingStrategy::Excel),
        ..Default::default()
    };
    wb.calculate_with_options(&options).unwrap();

    assert_eq!(value_at(&wb, "A1"), CellValue::Number(0.3));
}

proptest! {
    #[test]
    fn prop_subtotal_sum_matches_sum(values in proptest::collection::vec(-1e6f64..1e6, 1..20)) {
        let mut wb = Workbook::new();
        let sheet = wb.worksheet_mut(0).unwrap();
        for (i, v) in values.iter().enumerate() {
            sheet.set_cell_value_at(i as u32, 0, *v).unwrap();
        }
        let last = values.len();
        let subtotal = eval(&wb, &format!("=SUBTOTAL(9,A1:A{})", last));
        let sum = eval(&wb, &format!("=SUM(A1:A{})", last));
        prop_assert_eq!(subtotal, sum);
    }
}
