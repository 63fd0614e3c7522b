use super::model::Graph;
use crate::error::{GraphParseError, ParseDiagnostic};

/// A decoded graph together with the non-fatal problems found while decoding it.
#[derive(Debug, Clone, Default)]
pub struct ParsedGraph {
    pub graph: Graph,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// A trait for canvas formats that can be decoded into the formula `Graph`.
///
/// The bundled [`CanvasDocument`](super::CanvasDocument) implements it for the
/// JSON canvas the authoring UI saves. Other front ends can implement it on
/// their own structs to feed the compiler.
///
/// # Example
///
/// ```rust,no_run
/// use keisan::prelude::*;
///
/// struct Formula {
///     field_id: String,
///     output: String,
/// }
///
/// impl IntoGraph for Formula {
///     fn into_graph(self) -> std::result::Result<ParsedGraph, GraphParseError> {
///         let mut graph = Graph::new();
///         graph.add_node("in", Node::Variable { field_id: self.field_id, display_name: None });
///         graph.add_node("out", Node::Output { name: self.output });
///         graph.connect("in", "out", 1);
///         Ok(ParsedGraph { graph, diagnostics: vec![] })
///     }
/// }
/// ```
pub trait IntoGraph {
    /// Consumes the object and converts it into a formula graph.
    fn into_graph(self) -> Result<ParsedGraph, GraphParseError>;
}

impl IntoGraph for Graph {
    fn into_graph(self) -> Result<ParsedGraph, GraphParseError> {
        Ok(ParsedGraph {
            graph: self,
            diagnostics: Vec::new(),
        })
    }
}
