//! Tests for the evaluation engine and runtime data handling.
mod common;
use ahash::AHashMap;
use chrono::NaiveDate;
use common::*;
use keisan::catalog::ConstantDefinition;
use keisan::prelude::*;
use serde_json::json;

/// Builds an evaluator for hand-written expressions, in the given order.
fn evaluator_for(outputs: &[(&str, &str)]) -> Evaluator {
    let compiled = outputs
        .iter()
        .enumerate()
        .map(|(rank, (name, expr))| {
            let mut output = CompiledOutput::new(*name, CompiledExpression::Valid(expr.to_string()));
            output.execution_order = rank;
            output
        })
        .collect();
    Evaluator::new(compiled)
}

fn no_constants() -> AHashMap<String, Value> {
    AHashMap::new()
}

fn eval_single(expr: &str, document: &DocumentData) -> OutputResult {
    let result = evaluator_for(&[("Out", expr)]).evaluate(document, &no_constants());
    result.outputs[0].clone()
}

#[test]
fn test_tax_evaluates_to_thirty() {
    let query = compile(create_tax_graph()).into_query();
    let evaluator = Evaluator::from_query(&query);
    let result = evaluator.evaluate(&document(&[("f3", 200.0)]), &no_constants());

    assert!(result.is_success());
    assert_eq!(result.value("Tax"), Some(&Value::Number(30.0)));
    assert_eq!(result.value("Net"), Some(&Value::Number(170.0)));
    let order: Vec<&str> = result.outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(order, vec!["Tax", "Net"]);
}

#[test]
fn test_explanation_shows_inputs() {
    let query = compile(create_tax_graph()).into_query();
    let result = Evaluator::from_query(&query).evaluate(&document(&[("f3", 200.0)]), &no_constants());
    assert_eq!(
        result.output("Tax").unwrap().explanation.as_deref(),
        Some("Price (was 200) * 0.15")
    );
    assert_eq!(
        result.output("Net").unwrap().explanation.as_deref(),
        Some("Price (was 200) - Tax (was 30)")
    );
}

#[test]
fn test_division_by_zero_is_isolated() {
    let query = compile(create_ratio_graph()).into_query();
    let result = Evaluator::from_query(&query).evaluate(&document(&[("f1", 10.0), ("f2", 0.0)]), &no_constants());

    let ratio = result.output("Ratio").unwrap();
    assert!(!ratio.success);
    assert!(ratio.value.is_none());
    assert_eq!(ratio.error_code, Some("E_DIVISION_BY_ZERO"));
    assert!(matches!(ratio.error, Some(EvaluationError::DivisionByZero(_))));

    assert_eq!(result.value("Total"), Some(&Value::Number(10.0)));
    assert!(!result.is_success());
    assert_eq!(result.failures().count(), 1);
}

#[test]
fn test_failed_dependency_propagates() {
    let evaluator = evaluator_for(&[
        ("Ratio", "([Input:Amount#f1] / [Input:Rate#f2])"),
        ("Scaled", "(Ratio * 100)"),
        ("Other", "([Input:Amount#f1] + 1)"),
    ]);
    let result = evaluator.evaluate(&document(&[("f1", 5.0), ("f2", 0.0)]), &no_constants());

    assert_eq!(
        result.output("Scaled").unwrap().error,
        Some(EvaluationError::DependencyFailed {
            output: "Scaled".to_string(),
            dependency: "Ratio".to_string(),
        })
    );
    assert_eq!(result.value("Other"), Some(&Value::Number(6.0)));
}

#[test]
fn test_output_cycle_members_fail_and_block_readers() {
    let query = compile(create_output_cycle_graph()).into_query();
    let result = Evaluator::from_query(&query).evaluate(&document(&[("f1", 4.0)]), &no_constants());

    assert_eq!(result.output("A").unwrap().error_code, Some("E_INVALID_EXPRESSION"));
    assert_eq!(result.output("B").unwrap().error_code, Some("E_INVALID_EXPRESSION"));
    assert_eq!(result.output("C").unwrap().error_code, Some("E_DEPENDENCY_FAILED"));
    assert_eq!(result.value("D"), Some(&Value::Number(4.0)));
}

#[test]
fn test_missing_field_fails_output() {
    let out = eval_single("([Input:Amount#f1] + 1)", &DocumentData::new());
    assert_eq!(out.error, Some(EvaluationError::MissingField("Amount".to_string())));
    assert_eq!(out.confidence, 0.0);

    let null_valued = DocumentData::new().with_field("f1", serde_json::Value::Null, 0.9);
    let out = eval_single("[Input:Amount#f1]", &null_valued);
    assert_eq!(out.error_code, Some("E_MISSING_FIELD"));
}

#[test]
fn test_fields_resolve_by_id_then_name() {
    let by_name = DocumentData::new().with_field("Amount", json!(7), 1.0);
    let out = eval_single("[Input:Amount#f1]", &by_name);
    assert_eq!(out.value, Some(Value::Number(7.0)));
}

#[test]
fn test_confidence_is_minimum_of_consumed_values() {
    let doc = DocumentData::new()
        .with_field("f1", json!(10), 0.9)
        .with_field("f2", json!(2), 0.6);
    let evaluator = evaluator_for(&[
        ("Sum", "([Input:Amount#f1] + [Input:Rate#f2])"),
        ("Double", "(Sum * 2)"),
        ("Constant", "(1 + 1)"),
    ]);
    let result = evaluator.evaluate(&doc, &no_constants());

    assert_eq!(result.output("Sum").unwrap().confidence, 0.6);
    assert_eq!(result.output("Double").unwrap().confidence, 0.6);
    assert_eq!(result.output("Constant").unwrap().confidence, 1.0);
}

#[test]
fn test_if_only_evaluates_taken_branch() {
    let doc = DocumentData::new().with_field("f1", json!(150), 0.8);
    // The else branch reads a field that does not exist.
    let out = eval_single(
        "IF(([Input:Amount#f1] > 100), \"high\", [Input:Missing#f9])",
        &doc,
    );
    assert_eq!(out.value, Some(Value::Text("high".to_string())));
    assert_eq!(out.confidence, 0.8);
    assert_eq!(
        out.explanation.as_deref(),
        Some("IF(Amount (was 150) > 100, \"high\")")
    );
}

#[test]
fn test_logical_operators_short_circuit() {
    let doc = DocumentData::new();
    let out = eval_single("(FALSE AND [Input:Missing#f9])", &doc);
    assert_eq!(out.value, Some(Value::Bool(false)));
    let out = eval_single("(TRUE OR [Input:Missing#f9])", &doc);
    assert_eq!(out.value, Some(Value::Bool(true)));
    let out = eval_single("(TRUE AND 1)", &doc);
    assert_eq!(out.error_code, Some("E_TYPE_MISMATCH"));
}

#[test]
fn test_functions() {
    let doc = DocumentData::new();
    let cases = [
        ("ABS(-4)", Value::Number(4.0)),
        ("ROUND(2.5)", Value::Number(3.0)),
        ("ROUND(-2.5)", Value::Number(-3.0)),
        ("SQRT(16)", Value::Number(4.0)),
        ("POWER(2, 10)", Value::Number(1024.0)),
        ("MOD(7, 3)", Value::Number(1.0)),
        ("MOD(-7, 3)", Value::Number(-1.0)),
        ("MIN(4, 2, 9)", Value::Number(2.0)),
        ("MAX(4, 2, 9)", Value::Number(9.0)),
        ("NOT((1 > 2))", Value::Bool(true)),
        ("(\"a\" = \"a\")", Value::Bool(true)),
        ("(3 <> 3)", Value::Bool(false)),
        ("(3 >= 3)", Value::Bool(true)),
    ];
    for (expr, expected) in cases {
        let out = eval_single(expr, &doc);
        assert_eq!(out.value, Some(expected), "{}", expr);
    }
}

#[test]
fn test_arithmetic_errors() {
    let doc = DocumentData::new();
    assert_eq!(eval_single("SQRT(-1)", &doc).error_code, Some("E_ARITHMETIC"));
    assert_eq!(eval_single("MOD(5, 0)", &doc).error_code, Some("E_DIVISION_BY_ZERO"));
    assert_eq!(eval_single("POWER(10, 400)", &doc).error_code, Some("E_ARITHMETIC"));
    assert_eq!(eval_single("(\"a\" > \"b\")", &doc).error_code, Some("E_TYPE_MISMATCH"));
    assert_eq!(eval_single("Unknown", &doc).error_code, Some("E_UNRESOLVED_SYMBOL"));
    assert_eq!(eval_single("(1 +", &doc).error_code, Some("E_SYNTAX"));
    assert_eq!(
        eval_single("#UNKNOWN:median(1)", &doc).error_code,
        Some("E_SYNTAX")
    );
}

#[test]
fn test_function_arity_checked_at_evaluation() {
    let out = eval_single("POWER(2)", &DocumentData::new());
    assert_eq!(
        out.error,
        Some(EvaluationError::Arity {
            function: "POWER".to_string(),
            expected: "2".to_string(),
            found: 1,
        })
    );
}

#[test]
fn test_half_even_rounding() {
    let compiled = vec![CompiledOutput::new(
        "Rounded",
        CompiledExpression::Valid("ROUND(2.5)".to_string()),
    )];
    let evaluator = Evaluator::builder(compiled).rounding(RoundingMode::HalfEven).build();
    let result = evaluator.evaluate(&DocumentData::new(), &no_constants());
    assert_eq!(result.value("Rounded"), Some(&Value::Number(2.0)));
}

#[test]
fn test_constants_resolve_by_name() {
    let constants = create_constants().values();
    let result = evaluator_for(&[("Gross", "(100 * (1 + VAT))"), ("Net", "(Gross - Discount)")])
        .evaluate(&DocumentData::new(), &constants);
    assert_eq!(result.value("Gross"), Some(&Value::Number(115.0)));
    assert_eq!(result.value("Net"), Some(&Value::Number(105.0)));
}

#[test]
fn test_currency_fields_and_arithmetic() {
    let doc = DocumentData::new()
        .with_typed_field("f3", json!("$ 1,200.50"), DataType::Currency, 1.0)
        .with_typed_field("f4", json!("(100.50)"), DataType::Currency, 1.0);
    let evaluator = evaluator_for(&[
        ("Total", "([Input:Price#f3] + [Input:Refund#f4])"),
        ("Half", "(Total / 2)"),
        ("Ratio", "(Total / [Input:Price#f3])"),
    ]);
    let result = evaluator.evaluate(&doc, &no_constants());

    assert_eq!(result.value("Total"), Some(&Value::Currency(1100.0)));
    assert_eq!(result.value("Half"), Some(&Value::Currency(550.0)));
    assert!(matches!(result.value("Ratio"), Some(Value::Number(_))));
}

#[test]
fn test_date_arithmetic_and_comparison() {
    let doc = DocumentData::new()
        .with_typed_field("d1", json!("2024-01-31"), DataType::Date, 1.0)
        .with_typed_field("d2", json!("15/01/2024"), DataType::Date, 1.0);
    let evaluator = evaluator_for(&[
        ("Due", "([Input:Issued#d1] + 30)"),
        ("Elapsed", "([Input:Issued#d1] - [Input:Ordered#d2])"),
        ("Late", "([Input:Issued#d1] > \"2024-01-15\")"),
    ]);
    let result = evaluator.evaluate(&doc, &no_constants());

    assert_eq!(
        result.value("Due"),
        Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
    );
    assert_eq!(result.value("Elapsed"), Some(&Value::Number(16.0)));
    assert_eq!(result.value("Late"), Some(&Value::Bool(true)));
}

#[test]
fn test_invalid_field_value() {
    let doc = DocumentData::new().with_typed_field("f1", json!("n/a"), DataType::Number, 1.0);
    let out = eval_single("[Input:Amount#f1]", &doc);
    assert_eq!(out.error_code, Some("E_INVALID_FIELD_VALUE"));
}

#[test]
fn test_batch_evaluation_matches_sequential() {
    let query = compile(create_tax_graph()).into_query();
    let evaluator = Evaluator::from_query(&query);
    let documents: Vec<DocumentData> = (1..=20).map(|i| document(&[("f3", i as f64 * 10.0)])).collect();

    let batch = evaluator.evaluate_batch(&documents, &no_constants());
    assert_eq!(batch.len(), documents.len());
    for (doc, result) in documents.iter().zip(&batch) {
        let sequential = evaluator.evaluate(doc, &no_constants());
        assert_eq!(result.value("Net"), sequential.value("Net"));
    }
    assert_eq!(batch[19].value("Tax"), Some(&Value::Number(30.0)));
}

#[test]
fn test_document_json_shorthand() {
    let doc = DocumentData::from_json(
        r#"{ "fields": {
            "f1": 12,
            "f2": { "value": "3", "confidence": 0.5 }
        } }"#,
    )
    .unwrap();
    let out = eval_single("([Input:Amount#f1] * [Input:Rate#f2])", &doc);
    assert_eq!(out.value, Some(Value::Number(36.0)));
    assert_eq!(out.confidence, 0.5);
}

#[test]
fn test_date_constant_subtracts_from_date_field() {
    let mut constants = ConstantCatalog::new();
    constants.insert(
        ConstantScope::Global,
        ConstantDefinition {
            id: "c1".to_string(),
            name: "Cutoff".to_string(),
            value: json!("2024-01-01"),
            data_type: DataType::Date,
        },
    );
    let mut graph = Graph::new();
    graph.add_node("due", variable("d1"));
    graph.add_node(
        "cutoff",
        Node::Constant {
            constant_id: Some("c1".to_string()),
            name: None,
            value: None,
            scope: ConstantScope::Global,
        },
    );
    graph.add_node("sub", operation("subtract"));
    graph.add_node("out", output("Days Late"));
    graph.connect("due", "sub", 1);
    graph.connect("cutoff", "sub", 2);
    graph.connect("sub", "out", 1);

    let query = Compiler::builder(graph)
        .with_field_catalog(FieldCatalog::new().with_field("d1", "Due", DataType::Date))
        .with_constant_catalog(constants.clone())
        .build()
        .compile()
        .into_query();
    assert_eq!(
        query.output("Days Late").unwrap().expression.as_str(),
        "([Input:Due#d1] - DATE(\"2024-01-01\"))"
    );

    let doc = DocumentData::new().with_field("d1", json!("2024-01-11"), 1.0);
    let result = Evaluator::from_query(&query).evaluate(&doc, &constants.values());
    assert_eq!(result.value("Days Late"), Some(&Value::Number(10.0)));
}

#[test]
fn test_field_reads_as_catalog_declared_type() {
    let mut graph = Graph::new();
    graph.add_node("fee", variable("f1"));
    graph.add_node("out", output("Fee Out"));
    graph.connect("fee", "out", 1);
    let query = Compiler::builder(graph)
        .with_field_catalog(FieldCatalog::new().with_field("f1", "Fee", DataType::Currency))
        .build()
        .compile()
        .into_query();
    let evaluator = Evaluator::from_query(&query);

    let doc = DocumentData::from_json(r#"{ "fields": { "f1": "$1,250.00" } }"#).unwrap();
    let result = evaluator.evaluate(&doc, &no_constants());
    assert_eq!(result.value("Fee Out"), Some(&Value::Currency(1250.0)));

    // A type carried by the document itself wins.
    let doc = DocumentData::new().with_typed_field("f1", json!("1250"), DataType::Number, 1.0);
    let result = evaluator.evaluate(&doc, &no_constants());
    assert_eq!(result.value("Fee Out"), Some(&Value::Number(1250.0)));
}

#[test]
fn test_escaped_field_name_evaluates() {
    let doc = DocumentData::new().with_field("f1", json!(40), 1.0);
    let out = eval_single(r"([Input:Amount [USD\]#f1] * 2)", &doc);
    assert_eq!(out.value, Some(Value::Number(80.0)));
}
