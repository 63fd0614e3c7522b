use super::registry::OperationRegistry;
use crate::ast::Expression;
use crate::catalog::{ConstantCatalog, FieldCatalog};
use crate::graph::{ConstantScope, Graph, Node};
use crate::query::Dependencies;
use ahash::AHashSet;
use itertools::Itertools;

#[derive(Default)]
struct Collected {
    inputs: Vec<String>,
    outputs: Vec<String>,
    global_constants: Vec<String>,
    local_constants: Vec<String>,
}

impl Collected {
    fn into_dependencies(self) -> Dependencies {
        Dependencies {
            inputs: self.inputs.into_iter().unique().collect(),
            outputs: self.outputs.into_iter().unique().collect(),
            global_constants: self.global_constants.into_iter().unique().collect(),
            local_constants: self.local_constants.into_iter().unique().collect(),
        }
    }

    fn push_constant(&mut self, scope: ConstantScope, name: String) {
        match scope {
            ConstantScope::Global => self.global_constants.push(name),
            ConstantScope::Local => self.local_constants.push(name),
        }
    }
}

/// Collects the symbols an output reads by walking its upstream subgraph.
pub struct DependencyExtractor<'a> {
    graph: &'a Graph,
    registry: &'a OperationRegistry,
    fields: &'a FieldCatalog,
    constants: &'a ConstantCatalog,
}

impl<'a> DependencyExtractor<'a> {
    pub fn new(
        graph: &'a Graph,
        registry: &'a OperationRegistry,
        fields: &'a FieldCatalog,
        constants: &'a ConstantCatalog,
    ) -> Self {
        Self {
            graph,
            registry,
            fields,
            constants,
        }
    }

    /// Walks back from the given Output node. Other outputs are recorded and
    /// not traversed; unresolved fields and anonymous constants are skipped.
    pub fn extract(&self, output_id: &str) -> Dependencies {
        let mut collected = Collected::default();
        let mut visited = AHashSet::new();
        visited.insert(output_id.to_string());
        if let Some(edge) = self.graph.inbound(output_id).into_iter().find(|e| e.port == 1) {
            self.walk(&edge.source, &mut visited, &mut collected);
        }
        collected.into_dependencies()
    }

    fn walk(&self, node_id: &str, visited: &mut AHashSet<String>, collected: &mut Collected) {
        // Also guards cycles; they are reported by the expression builder.
        if !visited.insert(node_id.to_string()) {
            return;
        }
        let Some(node) = self.graph.node(node_id) else {
            return;
        };

        match node {
            Node::Variable { field_id, .. } => {
                if let Some(field) = self.fields.get(field_id) {
                    collected.inputs.push(field.name.clone());
                }
            }
            Node::Constant {
                constant_id,
                name,
                scope,
                ..
            } => {
                let catalog_entry = constant_id.as_deref().and_then(|id| self.constants.find(id));
                match (catalog_entry, name) {
                    (Some((catalog_scope, constant)), _) => {
                        collected.push_constant(catalog_scope, constant.name.clone())
                    }
                    (None, Some(name)) => collected.push_constant(*scope, name.clone()),
                    (None, None) => {}
                }
            }
            Node::Output { name } => collected.outputs.push(name.clone()),
            Node::Operation { operator } => {
                // Connections the compiled expression ignores are not dependencies.
                let spec = self.registry.get(operator);
                for edge in self.graph.inbound(node_id) {
                    if spec.is_some_and(|s| !s.variadic && edge.port as usize > s.arity) {
                        continue;
                    }
                    self.walk(&edge.source, visited, collected);
                }
            }
        }
    }

    /// Recovers dependencies from a parsed expression when the graph is no
    /// longer available. Bare symbols are classified as outputs when they name
    /// one of `output_names`, otherwise as constants by catalog lookup.
    pub fn from_expression(
        expression: &Expression,
        output_names: &[&str],
        constants: &ConstantCatalog,
    ) -> Dependencies {
        let mut fields = Vec::new();
        expression.get_required_fields(&mut fields);
        let mut references = Vec::new();
        expression.get_references(&mut references);

        let mut collected = Collected {
            inputs: fields.into_iter().map(str::to_string).collect(),
            ..Collected::default()
        };
        for reference in references {
            if output_names.contains(&reference) {
                collected.outputs.push(reference.to_string());
            } else if let Some((scope, constant)) = constants.find_by_name(reference) {
                collected.push_constant(scope, constant.name.clone());
            }
        }
        collected.into_dependencies()
    }
}
