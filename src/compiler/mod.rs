use crate::ast::{DataType, Expression};
use crate::catalog::{ConstantCatalog, FieldCatalog};
use crate::error::{CompileDiagnostic, DiagnosticCode, OrderingError};
use crate::graph::Graph;
use crate::query::{CompiledExpression, CompiledOutput, CompiledQuery};
use ahash::AHashSet;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

mod builder;
pub mod dependencies;
pub mod ordering;
pub mod registry;

use builder::{BuiltOutput, ExpressionBuilder};
pub use dependencies::DependencyExtractor;
pub use ordering::ExecutionOrderResolver;
pub use registry::{OperationRegistry, OperationSpec, OperatorFormat};

/// The outcome of compiling every output of a graph.
#[derive(Debug, Clone)]
pub struct QueryCompilation {
    /// All outputs in execution order, Invalid ones included.
    pub outputs: Vec<CompiledOutput>,
    /// Set when outputs referenced each other in a cycle. The members of
    /// each cycle have been marked Invalid.
    pub ordering_error: Option<OrderingError>,
}

impl QueryCompilation {
    /// Whether every output compiled to a valid expression.
    pub fn is_valid(&self) -> bool {
        self.outputs.iter().all(CompiledOutput::is_valid)
    }

    /// Every diagnostic, paired with the name of the output it belongs to.
    pub fn diagnostics(&self) -> impl Iterator<Item = (&str, &CompileDiagnostic)> {
        self.outputs
            .iter()
            .flat_map(|o| o.diagnostics.iter().map(move |d| (o.name.as_str(), d)))
    }

    pub fn output(&self, name: &str) -> Option<&CompiledOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn into_query(self) -> CompiledQuery {
        CompiledQuery::new(self.outputs)
    }
}

/// Turns a formula graph into per-output expression strings, dependency
/// lists and an execution order.
pub struct Compiler {
    graph: Graph,
    registry: OperationRegistry,
    fields: FieldCatalog,
    constants: ConstantCatalog,
    strict_fields: bool,
}

pub struct CompilerBuilder {
    graph: Graph,
    registry: OperationRegistry,
    fields: FieldCatalog,
    constants: ConstantCatalog,
    strict_fields: bool,
}

impl CompilerBuilder {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            registry: OperationRegistry::standard(),
            fields: FieldCatalog::new(),
            constants: ConstantCatalog::new(),
            strict_fields: false,
        }
    }

    /// Replaces the standard operation registry.
    pub fn with_registry(mut self, registry: OperationRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_field_catalog(mut self, fields: FieldCatalog) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_constant_catalog(mut self, constants: ConstantCatalog) -> Self {
        self.constants = constants;
        self
    }

    /// Maps a canvas-specific operator name onto a registered operation,
    /// e.g. `("sum", "add")`.
    pub fn with_operation_alias(mut self, user_id: &str, registered_id: &str) -> Self {
        self.registry = self.registry.with_alias(user_id, registered_id);
        self
    }

    /// Treat fields missing from the catalog as errors instead of reading them as zero.
    pub fn strict_fields(mut self, strict: bool) -> Self {
        self.strict_fields = strict;
        self
    }

    pub fn build(self) -> Compiler {
        Compiler {
            graph: self.graph,
            registry: self.registry,
            fields: self.fields,
            constants: self.constants,
            strict_fields: self.strict_fields,
        }
    }
}

impl Compiler {
    pub fn builder(graph: Graph) -> CompilerBuilder {
        CompilerBuilder::new(graph)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Compiles a single Output node. Warnings are dropped on success;
    /// on failure every diagnostic for the output is returned.
    pub fn compile_output(&self, output_id: &str) -> Result<Expression, Vec<CompileDiagnostic>> {
        let BuiltOutput {
            expression,
            diagnostics,
        } = self.expression_builder().build_output(output_id);
        match expression {
            Some(expression) if !diagnostics.iter().any(CompileDiagnostic::is_error) => {
                Ok(expression)
            }
            _ => Err(diagnostics),
        }
    }

    /// Compiles every output of the graph. Problems in one output never stop
    /// its siblings from compiling.
    pub fn compile(&self) -> QueryCompilation {
        let extractor = DependencyExtractor::new(&self.graph, &self.registry, &self.fields, &self.constants);
        let mut seen_names = AHashSet::new();
        let mut outputs = Vec::new();

        for (node_id, name) in self.graph.outputs() {
            let mut output = CompiledOutput::new(name, CompiledExpression::Invalid);
            output.node_id = node_id.clone();
            output.dependencies = extractor.extract(node_id);

            if !seen_names.insert(name) {
                output.diagnostics.push(CompileDiagnostic::new(
                    DiagnosticCode::DuplicateOutputName,
                    node_id.as_str(),
                    format!("Output name '{}' is used more than once", name),
                ));
            } else {
                let BuiltOutput {
                    expression,
                    diagnostics,
                } = self.expression_builder().build_output(node_id);
                if let Some(expression) = expression {
                    if !diagnostics.iter().any(CompileDiagnostic::is_error) {
                        output.expression = CompiledExpression::Valid(expression.to_string());
                        output.field_types = self.declared_field_types(&expression);
                    }
                }
                output.diagnostics = diagnostics;
            }

            match &output.expression {
                CompiledExpression::Valid(expr) => debug!(output = %name, %expr, "compiled output"),
                CompiledExpression::Invalid => warn!(
                    output = %name,
                    diagnostics = output.diagnostics.len(),
                    "output compiled to an invalid expression"
                ),
            }
            outputs.push(output);
        }

        let (outputs, ordering_error) = Self::resolve_order(outputs);
        let compilation = QueryCompilation {
            outputs,
            ordering_error,
        };
        info!(
            outputs = compilation.outputs.len(),
            valid = compilation.outputs.iter().filter(|o| o.is_valid()).count(),
            "compiled query"
        );
        compilation
    }

    /// The catalog type of each field the expression reads, so the evaluator
    /// can coerce document values the catalog way.
    fn declared_field_types(&self, expression: &Expression) -> IndexMap<String, DataType> {
        let mut refs = Vec::new();
        expression.get_input_refs(&mut refs);
        refs.into_iter()
            .filter_map(|field| {
                self.fields
                    .get(&field.id)
                    .map(|definition| (field.id.clone(), definition.data_type))
            })
            .collect()
    }

    fn expression_builder(&self) -> ExpressionBuilder<'_> {
        ExpressionBuilder::new(
            &self.graph,
            &self.registry,
            &self.fields,
            &self.constants,
            self.strict_fields,
        )
    }

    /// Orders the outputs. Members of output cycles are invalidated and the
    /// remaining outputs are ordered again.
    fn resolve_order(mut outputs: Vec<CompiledOutput>) -> (Vec<CompiledOutput>, Option<OrderingError>) {
        let error = match ExecutionOrderResolver::plan(&outputs) {
            Ok(plan) => return (ExecutionOrderResolver::apply(outputs, &plan), None),
            Err(error) => error,
        };
        warn!(error = %error, "outputs reference each other in a cycle");

        let OrderingError::CircularOutputs { cycles, .. } = &error;
        for cycle in cycles {
            let mut path = cycle.clone();
            path.extend(cycle.first().cloned());
            let message = format!("Circular reference between outputs: {}", path.join(" -> "));
            for output in outputs.iter_mut().filter(|o| o.is_valid() && cycle.contains(&o.name)) {
                output.expression = CompiledExpression::Invalid;
                output.diagnostics.push(CompileDiagnostic::new(
                    DiagnosticCode::CircularOutputReference,
                    output.node_id.as_str(),
                    message.clone(),
                ));
            }
        }

        // Invalid outputs contribute no edges, so this pass cannot find a cycle.
        let plan = ExecutionOrderResolver::plan(&outputs).unwrap_or_else(|_| (0..outputs.len()).collect());
        (ExecutionOrderResolver::apply(outputs, &plan), Some(error))
    }
}
