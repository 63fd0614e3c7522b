//! Common test utilities for building formula graphs, catalogs and documents.
use keisan::prelude::*;
use serde_json::json;

/// Field catalog shared by most tests.
///
/// `f1` Amount, `f2` Rate, `f3` Price.
#[allow(dead_code)]
pub fn create_fields() -> FieldCatalog {
    FieldCatalog::new()
        .with_field("f1", "Amount", DataType::Number)
        .with_field("f2", "Rate", DataType::Number)
        .with_field("f3", "Price", DataType::Number)
}

/// One global and one query-local constant.
#[allow(dead_code)]
pub fn create_constants() -> ConstantCatalog {
    ConstantCatalog::new()
        .with_constant(ConstantScope::Global, "k1", "VAT", json!(0.15))
        .with_constant(ConstantScope::Local, "k2", "Discount", json!(10))
}

#[allow(dead_code)]
pub fn variable(field_id: &str) -> Node {
    Node::Variable {
        field_id: field_id.to_string(),
        display_name: None,
    }
}

#[allow(dead_code)]
pub fn operation(operator: &str) -> Node {
    Node::Operation {
        operator: operator.to_string(),
    }
}

#[allow(dead_code)]
pub fn output(name: &str) -> Node {
    Node::Output {
        name: name.to_string(),
    }
}

#[allow(dead_code)]
pub fn literal(value: f64) -> Node {
    Node::Constant {
        constant_id: None,
        name: None,
        value: Some(Value::Number(value)),
        scope: ConstantScope::Local,
    }
}

/// Logic: `Total = Amount + Rate`
#[allow(dead_code)]
pub fn create_total_graph() -> Graph {
    let mut graph = Graph::new();
    graph.add_node("amount", variable("f1"));
    graph.add_node("rate", variable("f2"));
    graph.add_node("add", operation("add"));
    graph.add_node("total", output("Total"));
    graph.connect("amount", "add", 1);
    graph.connect("rate", "add", 2);
    graph.connect("add", "total", 1);
    graph
}

/// Logic: `Tax = Price * VAT` and `Net = Price - Tax`.
///
/// Net is declared before Tax so ordering has to move Tax first.
#[allow(dead_code)]
pub fn create_tax_graph() -> Graph {
    let mut graph = Graph::new();
    graph.add_node("price", variable("f3"));
    graph.add_node(
        "vat",
        Node::Constant {
            constant_id: Some("k1".to_string()),
            name: Some("VAT".to_string()),
            value: Some(Value::Number(0.15)),
            scope: ConstantScope::Global,
        },
    );
    graph.add_node("sub", operation("subtract"));
    graph.add_node("net", output("Net"));
    graph.add_node("mul", operation("multiply"));
    graph.add_node("tax", output("Tax"));

    graph.connect("price", "mul", 1);
    graph.connect("vat", "mul", 2);
    graph.connect("mul", "tax", 1);
    graph.connect("price", "sub", 1);
    graph.connect("tax", "sub", 2);
    graph.connect("sub", "net", 1);
    graph
}

/// Logic: `Check = IF(Amount > 100, Amount, <missing>)`
#[allow(dead_code)]
pub fn create_incomplete_if_graph() -> Graph {
    let mut graph = Graph::new();
    graph.add_node("amount", variable("f1"));
    graph.add_node("hundred", literal(100.0));
    graph.add_node("gt", operation("greater"));
    graph.add_node("if", operation("if"));
    graph.add_node("check", output("Check"));
    graph.connect("amount", "gt", 1);
    graph.connect("hundred", "gt", 2);
    graph.connect("gt", "if", 1);
    graph.connect("amount", "if", 2);
    graph.connect("if", "check", 1);
    graph
}

/// Logic: `Ratio = Amount / Rate` next to `Total = Amount + Rate`.
#[allow(dead_code)]
pub fn create_ratio_graph() -> Graph {
    let mut graph = create_total_graph();
    graph.add_node("div", operation("divide"));
    graph.add_node("ratio", output("Ratio"));
    graph.connect("amount", "div", 1);
    graph.connect("rate", "div", 2);
    graph.connect("div", "ratio", 1);
    graph
}

/// Logic: `A = B + 1`, `B = A + 1`, `C = A * 2`, `D = Amount`.
#[allow(dead_code)]
pub fn create_output_cycle_graph() -> Graph {
    let mut graph = Graph::new();
    graph.add_node("one", literal(1.0));
    graph.add_node("two", literal(2.0));
    graph.add_node("amount", variable("f1"));
    graph.add_node("add_a", operation("add"));
    graph.add_node("add_b", operation("add"));
    graph.add_node("mul_c", operation("multiply"));
    graph.add_node("out_a", output("A"));
    graph.add_node("out_b", output("B"));
    graph.add_node("out_c", output("C"));
    graph.add_node("out_d", output("D"));

    graph.connect("out_b", "add_a", 1);
    graph.connect("one", "add_a", 2);
    graph.connect("add_a", "out_a", 1);
    graph.connect("out_a", "add_b", 1);
    graph.connect("one", "add_b", 2);
    graph.connect("add_b", "out_b", 1);
    graph.connect("out_a", "mul_c", 1);
    graph.connect("two", "mul_c", 2);
    graph.connect("mul_c", "out_c", 1);
    graph.connect("amount", "out_d", 1);
    graph
}

/// A canvas as saved by the authoring UI: Total = Amount + Rate, plus an
/// output that reads the global VAT constant.
#[allow(dead_code)]
pub fn create_canvas_json() -> String {
    json!({
        "nodes": {
            "1": {
                "name": "variable",
                "data": { "type": "variable", "field_id": "f1", "field_name": "Amount" },
                "inputs": {}
            },
            "2": {
                "name": "variable",
                "data": { "type": "variable", "field_id": "f2", "field_name": "Rate" },
                "inputs": {}
            },
            "3": {
                "name": "operation",
                "data": { "type": "operation", "operator": "add" },
                "inputs": {
                    "input_1": { "connections": [{ "node": "1", "input": "output_1" }] },
                    "input_2": { "connections": [{ "node": 2, "input": "output_1" }] }
                }
            },
            "4": {
                "name": "output",
                "data": { "type": "output", "output_name": "Total" },
                "inputs": {
                    "input_1": { "connections": [{ "node": "3", "input": "output_1" }] }
                }
            },
            "5": {
                "name": "constant",
                "data": { "type": "constant", "constant_id": "k1", "constant_name": "VAT", "value": "0.15", "is_global": true },
                "inputs": {}
            },
            "6": {
                "name": "output",
                "data": { "type": "output", "output_name": "Vat Rate" },
                "inputs": {
                    "input_1": { "connections": [{ "node": "5", "input": "output_1" }] }
                }
            }
        }
    })
    .to_string()
}

#[allow(dead_code)]
pub fn compile(graph: Graph) -> QueryCompilation {
    Compiler::builder(graph)
        .with_field_catalog(create_fields())
        .with_constant_catalog(create_constants())
        .build()
        .compile()
}

/// A document with every field read at full confidence.
#[allow(dead_code)]
pub fn document(fields: &[(&str, f64)]) -> DocumentData {
    fields
        .iter()
        .fold(DocumentData::new(), |doc, (key, value)| {
            doc.with_field(*key, json!(value), 1.0)
        })
}

/// Expression string of a compiled output, panicking if it is missing.
#[allow(dead_code)]
pub fn expression_of<'a>(compilation: &'a QueryCompilation, name: &str) -> &'a str {
    compilation
        .output(name)
        .unwrap_or_else(|| panic!("output '{}' not compiled", name))
        .expression
        .as_str()
}
