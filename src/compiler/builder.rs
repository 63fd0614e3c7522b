use super::registry::OperationRegistry;
use crate::ast::{Expression, Value};
use crate::catalog::{ConstantCatalog, FieldCatalog};
use crate::error::{CompileDiagnostic, DiagnosticCode};
use crate::graph::{Graph, Node};
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;

/// The result of walking back from one Output node.
pub(super) struct BuiltOutput {
    /// `None` when the output is Invalid.
    pub expression: Option<Expression>,
    pub diagnostics: Vec<CompileDiagnostic>,
}

/// Builds the expression of a single output by walking the graph backward
/// from the Output node. One builder is used per output.
pub(super) struct ExpressionBuilder<'a> {
    graph: &'a Graph,
    registry: &'a OperationRegistry,
    fields: &'a FieldCatalog,
    constants: &'a ConstantCatalog,
    strict_fields: bool,
    /// Nodes on the current recursion path.
    visiting: AHashSet<String>,
    /// Finished nodes, so diamonds compile (and report) each shared node once.
    ast_cache: AHashMap<String, Option<Expression>>,
    diagnostics: Vec<CompileDiagnostic>,
}

impl<'a> ExpressionBuilder<'a> {
    pub(super) fn new(
        graph: &'a Graph,
        registry: &'a OperationRegistry,
        fields: &'a FieldCatalog,
        constants: &'a ConstantCatalog,
        strict_fields: bool,
    ) -> Self {
        Self {
            graph,
            registry,
            fields,
            constants,
            strict_fields,
            visiting: AHashSet::new(),
            ast_cache: AHashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub(super) fn build_output(mut self, output_id: &str) -> BuiltOutput {
        let expression = match self.graph.node(output_id) {
            Some(Node::Output { name }) => {
                let name = name.clone();
                self.build_output_input(output_id, &name)
            }
            Some(other) => {
                self.report(
                    DiagnosticCode::NodeNotFound,
                    output_id,
                    format!("Node '{}' is a {} node, not an output", output_id, other.kind()),
                );
                None
            }
            None => {
                self.report(
                    DiagnosticCode::NodeNotFound,
                    output_id,
                    format!("Output node '{}' not found", output_id),
                );
                None
            }
        };

        let diagnostics = self
            .diagnostics
            .into_iter()
            .unique_by(|d| (d.code, d.node_id.clone(), d.message.clone()))
            .collect();
        BuiltOutput {
            expression,
            diagnostics,
        }
    }

    fn build_output_input(&mut self, output_id: &str, name: &str) -> Option<Expression> {
        let inbound = self.graph.inbound(output_id);
        for extra in inbound.iter().filter(|e| e.port != 1) {
            self.report(
                DiagnosticCode::ExtraConnection,
                output_id,
                format!(
                    "Output '{}' has a single input; connection on input {} ignored",
                    name, extra.port
                ),
            );
        }
        let Some(edge) = inbound.into_iter().find(|e| e.port == 1) else {
            self.report(
                DiagnosticCode::OutputNotConnected,
                output_id,
                format!("Output '{}' is not connected", name),
            );
            return None;
        };

        self.visiting.insert(output_id.to_string());
        let expression = self.build_node(&edge.source);
        self.visiting.remove(output_id);
        expression
    }

    /// Recursively builds the expression for a node. `None` means Invalid and
    /// propagates to every consumer without adding further diagnostics.
    fn build_node(&mut self, node_id: &str) -> Option<Expression> {
        if self.visiting.contains(node_id) {
            self.report(
                DiagnosticCode::CircularDependency,
                node_id,
                format!("Circular dependency at node '{}'", node_id),
            );
            return None;
        }
        if let Some(cached) = self.ast_cache.get(node_id) {
            return cached.clone();
        }

        let graph = self.graph;
        let Some(node) = graph.node(node_id) else {
            self.report(
                DiagnosticCode::NodeNotFound,
                node_id,
                format!("Node '{}' not found", node_id),
            );
            return None;
        };

        self.visiting.insert(node_id.to_string());
        let expression = match node {
            Node::Variable { field_id, .. } => self.build_variable(node_id, field_id),
            Node::Constant {
                constant_id, value, ..
            } => Some(self.build_constant(constant_id.as_deref(), value.as_ref())),
            Node::Operation { operator } => self.build_operation(node_id, operator),
            // Another output feeding this one is referenced by name, not inlined.
            Node::Output { name } => Some(Expression::Reference(name.clone())),
        };
        self.visiting.remove(node_id);

        self.ast_cache
            .insert(node_id.to_string(), expression.clone());
        expression
    }

    fn build_variable(&mut self, node_id: &str, field_id: &str) -> Option<Expression> {
        if let Some(field) = self.fields.get(field_id) {
            return Some(Expression::input(field.name.clone(), field_id));
        }

        let diagnostic = CompileDiagnostic::new(
            DiagnosticCode::UnresolvedField,
            node_id,
            format!("Field '{}' is not in the field catalog", field_id),
        );
        if self.strict_fields {
            self.diagnostics.push(diagnostic.into_error());
            None
        } else {
            // The catalog may be stale at compile time; read the field as zero.
            self.diagnostics.push(diagnostic);
            Some(Expression::number(0.0))
        }
    }

    /// The catalog value wins; the node's own literal only covers constants
    /// the catalog does not know.
    fn build_constant(&self, constant_id: Option<&str>, value: Option<&Value>) -> Expression {
        constant_id
            .and_then(|id| self.constants.find(id))
            .and_then(|(_, constant)| constant.typed_value())
            .or_else(|| value.cloned())
            .map(Expression::Literal)
            .unwrap_or_else(|| Expression::number(0.0))
    }

    fn build_operation(&mut self, node_id: &str, operator: &str) -> Option<Expression> {
        let graph = self.graph;
        let inbound = graph.inbound(node_id);

        let Some(spec) = self.registry.get(operator) else {
            self.report(
                DiagnosticCode::UnknownOperator,
                node_id,
                format!("Unknown operator '{}'", operator),
            );
            let args = self.build_inputs(inbound.iter().map(|e| e.source.as_str()))?;
            return Some(Expression::Unknown {
                operator: operator.to_string(),
                args,
            });
        };

        let connected: Vec<u32> = inbound.iter().map(|e| e.port).collect();
        if spec.variadic {
            // Variadic operations only need enough inputs, on any ports.
            if connected.len() < spec.arity {
                self.report(
                    DiagnosticCode::MissingConnection,
                    node_id,
                    format!(
                        "{} operation is missing connections: needs at least {} inputs, found {}",
                        spec.label,
                        spec.arity,
                        connected.len()
                    ),
                );
                return None;
            }
        } else {
            let missing: Vec<u32> = (1..=spec.arity as u32)
                .filter(|port| !connected.contains(port))
                .collect();
            if !missing.is_empty() {
                for port in missing {
                    self.report(
                        DiagnosticCode::MissingConnection,
                        node_id,
                        format!(
                            "{} operation is missing connections: input {}",
                            spec.label, port
                        ),
                    );
                }
                return None;
            }
        }

        let (used, extra): (Vec<_>, Vec<_>) = inbound
            .into_iter()
            .partition(|e| spec.variadic || e.port as usize <= spec.arity);
        for edge in extra {
            self.report(
                DiagnosticCode::ExtraConnection,
                node_id,
                format!(
                    "{} operation takes {} inputs; connection on input {} ignored",
                    spec.label, spec.arity, edge.port
                ),
            );
        }

        let args = self.build_inputs(used.iter().map(|e| e.source.as_str()))?;
        Some(spec.build(args))
    }

    /// Builds every input even after one fails, so all problems get reported.
    fn build_inputs<'s>(&mut self, sources: impl Iterator<Item = &'s str>) -> Option<Vec<Expression>> {
        let built: Vec<Option<Expression>> = sources.map(|source| self.build_node(source)).collect();
        built.into_iter().collect()
    }

    fn report(&mut self, code: DiagnosticCode, node_id: &str, message: String) {
        self.diagnostics
            .push(CompileDiagnostic::new(code, node_id, message));
    }
}
