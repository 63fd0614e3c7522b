use super::conversion::{IntoGraph, ParsedGraph};
use super::model::{ConstantScope, Graph, Node, NodeId};
use crate::ast::Value;
use crate::error::{GraphParseError, ParseDiagnostic};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{trace, warn};

// --- JSON Deserialization Structs (Canvas Format Specific) ---
// These mirror what the authoring canvas saves. Node metadata is loosely typed
// here and decoded exactly once into `Node` by `CanvasDocument::into_graph`.

/// A serialized canvas: node id -> node metadata and inbound connections.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CanvasDocument {
    #[serde(alias = "data")]
    pub nodes: IndexMap<String, CanvasNode>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CanvasNode {
    /// The canvas widget class; used as a type hint when `data` carries none.
    #[serde(default, alias = "class")]
    pub name: Option<String>,
    #[serde(default)]
    pub data: CanvasNodeData,
    /// Inbound connections keyed by port name (`input_1`, `input_2`, ...).
    /// Outbound connection data is never read.
    #[serde(default)]
    pub inputs: IndexMap<String, CanvasPort>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CanvasNodeData {
    #[serde(default, alias = "type", alias = "nodeType")]
    pub node_type: Option<String>,
    #[serde(default, alias = "fieldId")]
    pub field_id: Option<serde_json::Value>,
    #[serde(default, alias = "fieldName")]
    pub field_name: Option<String>,
    #[serde(default, alias = "constantId")]
    pub constant_id: Option<serde_json::Value>,
    #[serde(default, alias = "constantName")]
    pub constant_name: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub scope: Option<ConstantScope>,
    #[serde(default, alias = "isGlobal")]
    pub is_global: Option<bool>,
    #[serde(default, alias = "operation")]
    pub operator: Option<String>,
    #[serde(default, alias = "outputName")]
    pub output_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CanvasPort {
    #[serde(default)]
    pub connections: Vec<CanvasConnection>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CanvasConnection {
    /// Source node id; canvases store it as a string or a number.
    pub node: serde_json::Value,
    /// Source output port name. Every node has a single output port.
    #[serde(default)]
    pub input: Option<String>,
}

impl CanvasDocument {
    pub fn from_json(json: &str) -> Result<Self, GraphParseError> {
        serde_json::from_str(json).map_err(|e| GraphParseError::JsonParseError(e.to_string()))
    }

    fn decode_node(&self, id: &str, node: &CanvasNode) -> Result<Node, ParseDiagnostic> {
        let data = &node.data;
        let type_name = data
            .node_type
            .clone()
            .or_else(|| node.name.clone().filter(|n| node_kind(n).is_some()))
            .or_else(|| infer_kind(data).map(str::to_string))
            .ok_or_else(|| ParseDiagnostic::MissingNodeType {
                node_id: id.to_string(),
            })?;

        let kind = node_kind(&type_name).ok_or_else(|| ParseDiagnostic::UnknownNodeType {
            node_id: id.to_string(),
            type_name: type_name.clone(),
        })?;

        let missing = |attribute: &'static str| ParseDiagnostic::MissingAttribute {
            node_id: id.to_string(),
            node_type: kind,
            attribute,
        };

        let decoded = match kind {
            "variable" => Node::Variable {
                field_id: data
                    .field_id
                    .as_ref()
                    .and_then(id_string)
                    .ok_or_else(|| missing("field_id"))?,
                display_name: data.field_name.clone(),
            },
            "constant" => {
                let scope = match (data.scope, data.is_global) {
                    (Some(scope), _) => scope,
                    (None, Some(true)) => ConstantScope::Global,
                    (None, _) => ConstantScope::Local,
                };
                Node::Constant {
                    constant_id: data.constant_id.as_ref().and_then(id_string),
                    name: data.constant_name.clone(),
                    value: data.value.as_ref().and_then(Value::from_literal),
                    scope,
                }
            }
            "operation" => Node::Operation {
                operator: data.operator.clone().ok_or_else(|| missing("operator"))?,
            },
            _ => Node::Output {
                name: data
                    .output_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| missing("output_name"))?,
            },
        };
        Ok(decoded)
    }
}

impl IntoGraph for CanvasDocument {
    fn into_graph(self) -> Result<ParsedGraph, GraphParseError> {
        if self.nodes.is_empty() {
            return Err(GraphParseError::EmptyDocument);
        }

        let mut graph = Graph::new();
        let mut diagnostics = Vec::new();

        // Pass 1: decode every node's tagged metadata.
        for (id, node) in &self.nodes {
            match self.decode_node(id, node) {
                Ok(decoded) => {
                    trace!(node_id = %id, kind = decoded.kind(), "decoded canvas node");
                    graph.add_node(id.clone(), decoded);
                }
                Err(diagnostic) => {
                    warn!(code = diagnostic.code(), "{}", diagnostic);
                    diagnostics.push(diagnostic);
                }
            }
        }

        // Pass 2: edges come strictly from each node's inbound connection list.
        for (target, node) in &self.nodes {
            if !graph.contains(target) {
                continue;
            }
            for (port_name, port) in &node.inputs {
                let Some(port_index) = parse_handle_index(port_name) else {
                    let diagnostic = ParseDiagnostic::InvalidPort {
                        node_id: target.clone(),
                        port: port_name.clone(),
                    };
                    warn!(code = diagnostic.code(), "{}", diagnostic);
                    diagnostics.push(diagnostic);
                    continue;
                };
                for connection in &port.connections {
                    let source: NodeId = id_string(&connection.node).unwrap_or_default();
                    let diagnostic = if !graph.contains(&source) {
                        ParseDiagnostic::DanglingConnection {
                            node_id: target.clone(),
                            source_id: source,
                        }
                    } else if graph.connect(source.clone(), target.clone(), port_index) {
                        continue;
                    } else {
                        ParseDiagnostic::PortAlreadyConnected {
                            node_id: target.clone(),
                            port: port_index,
                            source_id: source,
                        }
                    };
                    warn!(code = diagnostic.code(), "{}", diagnostic);
                    diagnostics.push(diagnostic);
                }
            }
        }

        Ok(ParsedGraph { graph, diagnostics })
    }
}

/// Parses a canvas JSON document straight into a graph.
pub fn parse_canvas(json: &str) -> Result<ParsedGraph, GraphParseError> {
    CanvasDocument::from_json(json)?.into_graph()
}

fn node_kind(type_name: &str) -> Option<&'static str> {
    match type_name.trim().to_ascii_lowercase().as_str() {
        "variable" | "input" | "field" => Some("variable"),
        "constant" => Some("constant"),
        "operation" | "operator" => Some("operation"),
        "output" => Some("output"),
        _ => None,
    }
}

/// Older canvases carry no type tag; the kind follows from which attribute is set.
fn infer_kind(data: &CanvasNodeData) -> Option<&'static str> {
    if data.field_id.is_some() {
        Some("variable")
    } else if data.operator.is_some() {
        Some("operation")
    } else if data.output_name.is_some() {
        Some("output")
    } else if data.value.is_some() || data.constant_id.is_some() {
        Some("constant")
    } else {
        None
    }
}

fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads the 1-based index from port names like `input_2`, `input-2` or `2`.
fn parse_handle_index(handle: &str) -> Option<u32> {
    handle
        .rsplit(['_', '-'])
        .next()
        .and_then(|index| index.parse().ok())
        .filter(|index| *index >= 1)
}
