//! Tests for decoding canvas documents into the formula graph.
mod common;
use common::*;
use keisan::graph::CanvasDocument;
use keisan::prelude::*;
use serde_json::json;

#[test]
fn test_canvas_decodes_tagged_nodes() {
    let parsed = parse_canvas(&create_canvas_json()).unwrap();
    assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);

    let graph = &parsed.graph;
    assert_eq!(graph.len(), 6);
    assert_eq!(
        graph.node("1"),
        Some(&Node::Variable {
            field_id: "f1".to_string(),
            display_name: Some("Amount".to_string()),
        })
    );
    assert_eq!(
        graph.node("5"),
        Some(&Node::Constant {
            constant_id: Some("k1".to_string()),
            name: Some("VAT".to_string()),
            value: Some(Value::Number(0.15)),
            scope: ConstantScope::Global,
        })
    );
    assert_eq!(
        graph.node("3"),
        Some(&Node::Operation {
            operator: "add".to_string()
        })
    );
}

#[test]
fn test_canvas_builds_edges_from_inbound_connections() {
    let parsed = parse_canvas(&create_canvas_json()).unwrap();
    let inbound = parsed.graph.inbound("3");
    assert_eq!(inbound.len(), 2);
    assert_eq!((inbound[0].source.as_str(), inbound[0].port), ("1", 1));
    // Numeric node ids in connections are accepted.
    assert_eq!((inbound[1].source.as_str(), inbound[1].port), ("2", 2));
    assert_eq!(parsed.graph.edges().len(), 4);
}

#[test]
fn test_outputs_keep_document_order() {
    let parsed = parse_canvas(&create_canvas_json()).unwrap();
    let names: Vec<&str> = parsed.graph.outputs().map(|(_, name)| name).collect();
    assert_eq!(names, vec!["Total", "Vat Rate"]);
}

#[test]
fn test_node_kind_inferred_without_type_tag() {
    let canvas = json!({
        "nodes": {
            "a": { "data": { "fieldId": 12 } },
            "b": { "class": "constant", "data": { "value": 3 } },
            "c": { "data": { "operation": "multiply" }, "inputs": {
                "input_1": { "connections": [{ "node": "a" }] },
                "input_2": { "connections": [{ "node": "b" }] }
            } },
            "d": { "data": { "outputName": "Scaled" }, "inputs": {
                "input_1": { "connections": [{ "node": "c" }] }
            } }
        }
    })
    .to_string();

    let parsed = parse_canvas(&canvas).unwrap();
    assert!(parsed.diagnostics.is_empty(), "{:?}", parsed.diagnostics);
    assert!(matches!(parsed.graph.node("a"), Some(Node::Variable { field_id, .. }) if field_id == "12"));
    assert!(matches!(parsed.graph.node("b"), Some(Node::Constant { .. })));
    assert!(matches!(parsed.graph.node("c"), Some(Node::Operation { .. })));
    assert!(matches!(parsed.graph.node("d"), Some(Node::Output { name }) if name == "Scaled"));
}

#[test]
fn test_unknown_node_type_is_dropped_with_diagnostic() {
    let canvas = json!({
        "nodes": {
            "1": { "data": { "type": "widget" } },
            "2": { "data": { "type": "output", "output_name": "Total" } }
        }
    })
    .to_string();

    let parsed = parse_canvas(&canvas).unwrap();
    assert_eq!(parsed.graph.len(), 1);
    assert_eq!(
        parsed.diagnostics,
        vec![ParseDiagnostic::UnknownNodeType {
            node_id: "1".to_string(),
            type_name: "widget".to_string(),
        }]
    );
}

#[test]
fn test_missing_attributes_are_reported() {
    let canvas = json!({
        "nodes": {
            "1": { "data": { "type": "variable" } },
            "2": { "data": { "type": "output", "output_name": "  " } },
            "3": { "data": {} }
        }
    })
    .to_string();

    let parsed = parse_canvas(&canvas).unwrap();
    assert!(parsed.graph.is_empty());
    let codes: Vec<&str> = parsed.diagnostics.iter().map(|d| d.code()).collect();
    assert_eq!(
        codes,
        vec!["P_MISSING_ATTRIBUTE", "P_MISSING_ATTRIBUTE", "P_MISSING_NODE_TYPE"]
    );
}

#[test]
fn test_dangling_and_duplicate_connections() {
    let canvas = json!({
        "nodes": {
            "1": { "data": { "type": "variable", "field_id": "f1" } },
            "2": { "data": { "type": "variable", "field_id": "f2" } },
            "3": { "data": { "type": "output", "output_name": "Total" }, "inputs": {
                "input_1": { "connections": [{ "node": "1" }, { "node": "2" }] },
                "input_2": { "connections": [{ "node": "99" }] },
                "weird": { "connections": [{ "node": "1" }] }
            } }
        }
    })
    .to_string();

    let parsed = parse_canvas(&canvas).unwrap();
    assert_eq!(parsed.graph.edges().len(), 1);
    assert_eq!(parsed.graph.inbound("3")[0].source, "1");
    assert_eq!(
        parsed.diagnostics,
        vec![
            ParseDiagnostic::PortAlreadyConnected {
                node_id: "3".to_string(),
                port: 1,
                source_id: "2".to_string(),
            },
            ParseDiagnostic::DanglingConnection {
                node_id: "3".to_string(),
                source_id: "99".to_string(),
            },
            ParseDiagnostic::InvalidPort {
                node_id: "3".to_string(),
                port: "weird".to_string(),
            },
        ]
    );
}

#[test]
fn test_empty_and_malformed_documents_fail() {
    let empty = parse_canvas(r#"{ "nodes": {} }"#);
    assert!(matches!(empty, Err(GraphParseError::EmptyDocument)));

    let malformed = parse_canvas("{ not json");
    match malformed {
        Err(e @ GraphParseError::JsonParseError(_)) => assert_eq!(e.code(), "P_JSON"),
        other => panic!("expected a JSON error, got {:?}", other.map(|p| p.graph.len())),
    }
}

#[test]
fn test_drawflow_data_alias_is_accepted() {
    let canvas = json!({
        "data": {
            "7": { "data": { "type": "constant", "value": 4 } },
            "8": { "data": { "type": "output", "output_name": "Four" }, "inputs": {
                "input_1": { "connections": [{ "node": "7" }] }
            } }
        }
    })
    .to_string();

    let document = CanvasDocument::from_json(&canvas).unwrap();
    let parsed = document.into_graph().unwrap();
    assert_eq!(parsed.graph.len(), 2);
    assert_eq!(parsed.graph.edges().len(), 1);
}

#[test]
fn test_graph_connect_rejects_taken_port() {
    let mut graph = Graph::new();
    graph.add_node("a", variable("f1"));
    graph.add_node("b", variable("f2"));
    graph.add_node("out", output("Out"));
    assert!(graph.connect("a", "out", 1));
    assert!(!graph.connect("b", "out", 1));
    assert_eq!(graph.inbound("out").len(), 1);
}
