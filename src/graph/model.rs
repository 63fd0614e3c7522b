use crate::ast::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type NodeId = String;

/// Whether a constant is shared across queries or owned by one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstantScope {
    Global,
    #[default]
    Local,
}

/// One vertex of the formula graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A reference to an externally mapped input field.
    Variable {
        field_id: String,
        display_name: Option<String>,
    },
    /// A literal known at compile time. `constant_id` links it to a catalog entry.
    Constant {
        constant_id: Option<String>,
        name: Option<String>,
        value: Option<Value>,
        scope: ConstantScope,
    },
    /// An operator resolved against the operation registry.
    Operation { operator: String },
    /// A named calculated result with a single input port.
    Output { name: String },
}

impl Node {
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Variable { .. } => "variable",
            Node::Constant { .. } => "constant",
            Node::Operation { .. } => "operation",
            Node::Output { .. } => "output",
        }
    }
}

/// A directed connection into input `port` (1-based) of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub port: u32,
}

/// The typed, in-memory formula graph. Node order is the document order of
/// the canvas it was decoded from.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>, node: Node) {
        self.nodes.insert(id.into(), node);
    }

    /// Adds an edge. Returns `false` if the target port already has an edge;
    /// each input port accepts at most one connection.
    pub fn connect(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>, port: u32) -> bool {
        let target = target.into();
        if self.edges.iter().any(|e| e.target == target && e.port == port) {
            return false;
        }
        self.edges.push(Edge {
            source: source.into(),
            target,
            port,
        });
        true
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges into `node_id`, sorted ascending by port.
    pub fn inbound(&self, node_id: &str) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.iter().filter(|e| e.target == node_id).collect();
        edges.sort_by_key(|e| e.port);
        edges
    }

    /// Output nodes as `(node id, output name)` in document order.
    pub fn outputs(&self) -> impl Iterator<Item = (&NodeId, &str)> {
        self.nodes.iter().filter_map(|(id, node)| match node {
            Node::Output { name } => Some((id, name.as_str())),
            _ => None,
        })
    }
}
