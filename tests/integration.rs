//! Integration tests for Keisan
//!
//! End-to-end tests that take a saved canvas through compilation, artifact
//! storage and evaluation.
//!
mod common;
use ahash::AHashMap;
use common::*;
use keisan::prelude::*;
use std::fs;

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn compile_canvas() -> QueryCompilation {
        let parsed = parse_canvas(&create_canvas_json()).expect("Failed to parse canvas");
        assert!(parsed.diagnostics.is_empty());
        Compiler::builder(parsed.graph)
            .with_field_catalog(create_fields())
            .with_constant_catalog(create_constants())
            .build()
            .compile()
    }

    #[test]
    fn test_canvas_compilation_and_evaluation() {
        let compilation = compile_canvas();
        assert!(compilation.is_valid());
        assert_eq!(
            expression_of(&compilation, "Total"),
            "([Input:Amount#f1] + [Input:Rate#f2])"
        );

        let evaluator = Evaluator::from_query(&compilation.into_query());
        let result = evaluator.evaluate(
            &document(&[("f1", 10.0), ("f2", 5.0)]),
            &create_constants().values(),
        );

        assert!(result.is_success());
        assert_eq!(result.value("Total"), Some(&Value::Number(15.0)));
        assert_eq!(result.value("Vat Rate"), Some(&Value::Number(0.15)));
    }

    #[test]
    fn test_artifact_bytes_roundtrip_preserves_results() {
        let query = compile(create_tax_graph()).into_query();
        let bytes = query.to_bytes().expect("Failed to serialize query");
        let loaded = CompiledQuery::from_bytes(&bytes).expect("Failed to deserialize query");
        assert_eq!(loaded, query);

        let doc = document(&[("f3", 80.0)]);
        let constants = AHashMap::new();
        let before = Evaluator::from_query(&query).evaluate(&doc, &constants);
        let after = Evaluator::from_query(&loaded).evaluate(&doc, &constants);
        assert_eq!(after.value("Net"), before.value("Net"));
        assert_eq!(after.value("Net"), Some(&Value::Number(68.0)));
    }

    #[test]
    fn test_artifact_file_storage() {
        let test_dir = std::env::temp_dir().join(format!("keisan_artifact_{}", std::process::id()));
        fs::create_dir_all(&test_dir).expect("Failed to create test directory");
        let path = test_dir.join("query.bin");
        let path = path.to_str().expect("Temp path is not valid UTF-8");

        let query = compile_canvas().into_query();
        query.save(path).expect("Failed to save query");
        let loaded = CompiledQuery::from_file(path).expect("Failed to load query");
        assert_eq!(loaded.outputs.len(), 2);
        assert_eq!(
            loaded.output("Total").map(|o| o.expression.as_str()),
            Some("([Input:Amount#f1] + [Input:Rate#f2])")
        );

        let _ = fs::remove_dir_all(&test_dir);
    }

    #[test]
    fn test_missing_artifact_is_an_io_error() {
        let result = CompiledQuery::from_file("/nonexistent/keisan/query.bin");
        assert!(matches!(result, Err(ArtifactError::Io(_))));
        assert!(matches!(
            CompiledQuery::from_bytes(&[0xff, 0xff, 0xff]),
            Err(ArtifactError::Serialization(_))
        ));
    }

    #[test]
    fn test_invalid_outputs_survive_storage() {
        let query = compile(create_incomplete_if_graph()).into_query();
        let loaded = CompiledQuery::from_bytes(&query.to_bytes().unwrap()).unwrap();

        let check = loaded.output("Check").unwrap();
        assert_eq!(check.expression, CompiledExpression::Invalid);
        assert_eq!(check.diagnostics[0].code, DiagnosticCode::MissingConnection);

        let result = Evaluator::from_query(&loaded).evaluate(&document(&[("f1", 500.0)]), &AHashMap::new());
        assert_eq!(result.output("Check").unwrap().error_code, Some("E_INVALID_EXPRESSION"));
    }

    #[test]
    fn test_json_export() {
        let query = compile(create_tax_graph()).into_query();
        let json = query.to_json().expect("Failed to export JSON");
        let exported: serde_json::Value = serde_json::from_str(&json).unwrap();

        let outputs = exported["outputs"].as_array().unwrap();
        assert_eq!(outputs[0]["name"], "Tax");
        assert_eq!(outputs[0]["expression"]["Valid"], "([Input:Price#f3] * 0.15)");
        assert_eq!(outputs[1]["dependencies"]["outputs"][0], "Tax");
        assert_eq!(outputs[0]["dependencies"]["global_constants"][0], "VAT");
    }

    #[test]
    fn test_evaluation_result_serializes_errors_as_text() {
        let query = compile(create_ratio_graph()).into_query();
        let result = Evaluator::from_query(&query).evaluate(&document(&[("f1", 1.0), ("f2", 0.0)]), &AHashMap::new());
        let json = serde_json::to_value(&result).unwrap();

        let ratio = json["outputs"]
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["name"] == "Ratio")
            .unwrap();
        assert_eq!(ratio["success"], false);
        assert_eq!(ratio["error_code"], "E_DIVISION_BY_ZERO");
        assert_eq!(ratio["error"], "Division by zero in operation '/'");
    }
}
