use crate::ast::DataType;
use crate::error::CompileDiagnostic;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The persisted marker for an output that failed to compile.
pub const INVALID_EXPRESSION: &str = "#INVALID";

/// The compiled artifact of one output: an expression string or the invalid marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompiledExpression {
    Valid(String),
    Invalid,
}

impl CompiledExpression {
    pub fn is_valid(&self) -> bool {
        matches!(self, CompiledExpression::Valid(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            CompiledExpression::Valid(expr) => expr,
            CompiledExpression::Invalid => INVALID_EXPRESSION,
        }
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbols an output reads, split by where they come from. Each list is
/// ordered by first use and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub global_constants: Vec<String>,
    pub local_constants: Vec<String>,
}

impl Dependencies {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
            && self.outputs.is_empty()
            && self.global_constants.is_empty()
            && self.local_constants.is_empty()
    }
}

/// One calculated result of a query, as persisted after compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledOutput {
    pub name: String,
    pub node_id: String,
    pub expression: CompiledExpression,
    /// Dense rank assigned by the execution order resolver.
    pub execution_order: usize,
    pub dependencies: Dependencies,
    /// Catalog-declared type of every field the expression reads, by field id.
    #[serde(default)]
    pub field_types: IndexMap<String, DataType>,
    pub diagnostics: Vec<CompileDiagnostic>,
}

impl CompiledOutput {
    pub fn new(name: impl Into<String>, expression: CompiledExpression) -> Self {
        Self {
            name: name.into(),
            node_id: String::new(),
            expression,
            execution_order: 0,
            dependencies: Dependencies::default(),
            field_types: IndexMap::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_output_dependencies<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_valid(&self) -> bool {
        self.expression.is_valid()
    }
}
