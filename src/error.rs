use crate::ast::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal errors while decoding a serialized canvas document.
#[derive(Error, Debug, Clone)]
pub enum GraphParseError {
    #[error("Failed to parse canvas JSON: {0}")]
    JsonParseError(String),

    #[error("Canvas document contains no nodes")]
    EmptyDocument,
}

impl GraphParseError {
    pub fn code(&self) -> &'static str {
        match self {
            GraphParseError::JsonParseError(_) => "P_JSON",
            GraphParseError::EmptyDocument => "P_EMPTY",
        }
    }
}

/// A non-fatal problem with a single node or connection of a canvas document.
/// The offending element is dropped and parsing continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    #[error("Node '{node_id}' has unknown node type '{type_name}'")]
    UnknownNodeType { node_id: String, type_name: String },

    #[error("Node '{node_id}' is missing its type discriminator")]
    MissingNodeType { node_id: String },

    #[error("Node '{node_id}' of type '{node_type}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        node_id: String,
        node_type: &'static str,
        attribute: &'static str,
    },

    #[error("Node '{node_id}' has an unparseable input port '{port}'")]
    InvalidPort { node_id: String, port: String },

    #[error("Connection into node '{node_id}' references unknown source node '{source_id}'")]
    DanglingConnection { node_id: String, source_id: String },

    #[error(
        "Input {port} of node '{node_id}' already has a connection; extra connection from '{source_id}' ignored"
    )]
    PortAlreadyConnected {
        node_id: String,
        port: u32,
        source_id: String,
    },
}

impl ParseDiagnostic {
    pub fn code(&self) -> &'static str {
        match self {
            ParseDiagnostic::UnknownNodeType { .. } => "P_UNKNOWN_NODE_TYPE",
            ParseDiagnostic::MissingNodeType { .. } => "P_MISSING_NODE_TYPE",
            ParseDiagnostic::MissingAttribute { .. } => "P_MISSING_ATTRIBUTE",
            ParseDiagnostic::InvalidPort { .. } => "P_INVALID_PORT",
            ParseDiagnostic::DanglingConnection { .. } => "P_DANGLING_CONNECTION",
            ParseDiagnostic::PortAlreadyConnected { .. } => "P_PORT_CONNECTED",
        }
    }
}

/// Classifies a compile diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    OutputNotConnected,
    MissingConnection,
    CircularDependency,
    CircularOutputReference,
    NodeNotFound,
    DuplicateOutputName,
    UnknownOperator,
    UnresolvedField,
    ExtraConnection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::OutputNotConnected => "C_OUTPUT_NOT_CONNECTED",
            DiagnosticCode::MissingConnection => "C_MISSING_CONNECTION",
            DiagnosticCode::CircularDependency => "C_CIRCULAR_DEPENDENCY",
            DiagnosticCode::CircularOutputReference => "C_CIRCULAR_OUTPUT_REFERENCE",
            DiagnosticCode::NodeNotFound => "C_NODE_NOT_FOUND",
            DiagnosticCode::DuplicateOutputName => "C_DUPLICATE_OUTPUT_NAME",
            DiagnosticCode::UnknownOperator => "C_UNKNOWN_OPERATOR",
            DiagnosticCode::UnresolvedField => "C_UNRESOLVED_FIELD",
            DiagnosticCode::ExtraConnection => "C_EXTRA_CONNECTION",
        }
    }

    /// Warnings never invalidate an output.
    pub fn severity(&self) -> Severity {
        match self {
            DiagnosticCode::UnknownOperator
            | DiagnosticCode::UnresolvedField
            | DiagnosticCode::ExtraConnection => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem found while compiling one output. Collected per output and never
/// fatal to sibling outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub node_id: String,
    pub message: String,
}

impl CompileDiagnostic {
    pub fn new(code: DiagnosticCode, node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: code.severity(),
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Escalates a diagnostic to error severity, e.g. unresolved fields in strict mode.
    pub fn into_error(mut self) -> Self {
        self.severity = Severity::Error;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for CompileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CompileDiagnostic {}

/// Errors raised while ordering a query's outputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderingError {
    #[error("Circular reference between outputs: {}", format_cycles(.cycles))]
    CircularOutputs {
        /// Every strongly connected group of outputs, in insertion order.
        cycles: Vec<Vec<String>>,
        /// Outputs that are not on a cycle but depend on one.
        blocked: Vec<String>,
    },
}

impl OrderingError {
    pub fn code(&self) -> &'static str {
        match self {
            OrderingError::CircularOutputs { .. } => "O_CIRCULAR_OUTPUTS",
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| {
            let mut path = cycle.clone();
            if let Some(first) = cycle.first() {
                path.push(first.clone());
            }
            path.join(" -> ")
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised while re-parsing a persisted expression string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionParseError {
    #[error("Unexpected character '{found}' at position {position}")]
    UnexpectedCharacter { position: usize, found: char },

    #[error("Unexpected token '{found}' at position {position}, expected {expected}")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: String,
    },

    #[error("Unexpected end of expression, expected {0}")]
    UnexpectedEnd(String),

    #[error("Unterminated {what} starting at position {position}")]
    Unterminated { what: &'static str, position: usize },

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Unknown function '{0}'")]
    UnknownFunction(String),
}

/// Errors that can occur while evaluating one output for one document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Input field '{0}' has no value in the document")]
    MissingField(String),

    #[error(
        "Type mismatch during operation '{operation}': expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        operation: String,
        expected: String,
        found: Value,
    },

    #[error("Field '{field}' could not be read as {expected}: '{raw}'")]
    InvalidFieldValue {
        field: String,
        expected: String,
        raw: String,
    },

    #[error("Division by zero in operation '{0}'")]
    DivisionByZero(String),

    #[error("Arithmetic error in operation '{operation}': {message}")]
    Arithmetic { operation: String, message: String },

    #[error("Symbol '{0}' is neither a computed output nor a known constant")]
    UnresolvedSymbol(String),

    #[error("Output '{output}' depends on output '{dependency}', which failed")]
    DependencyFailed { output: String, dependency: String },

    #[error("Output '{0}' has no valid compiled expression")]
    InvalidExpression(String),

    #[error("Expression could not be parsed: {0}")]
    Syntax(#[from] ExpressionParseError),

    #[error("Function '{function}' expects {expected} arguments, but received {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
}

impl EvaluationError {
    pub fn code(&self) -> &'static str {
        match self {
            EvaluationError::MissingField(_) => "E_MISSING_FIELD",
            EvaluationError::TypeMismatch { .. } => "E_TYPE_MISMATCH",
            EvaluationError::InvalidFieldValue { .. } => "E_INVALID_FIELD_VALUE",
            EvaluationError::DivisionByZero(_) => "E_DIVISION_BY_ZERO",
            EvaluationError::Arithmetic { .. } => "E_ARITHMETIC",
            EvaluationError::UnresolvedSymbol(_) => "E_UNRESOLVED_SYMBOL",
            EvaluationError::DependencyFailed { .. } => "E_DEPENDENCY_FAILED",
            EvaluationError::InvalidExpression(_) => "E_INVALID_EXPRESSION",
            EvaluationError::Syntax(_) => "E_SYNTAX",
            EvaluationError::Arity { .. } => "E_ARITY",
        }
    }
}

/// Errors raised while saving or loading a compiled query artifact.
#[derive(Error, Debug, Clone)]
pub enum ArtifactError {
    #[error("Artifact I/O failed: {0}")]
    Io(String),

    #[error("Artifact serialization failed: {0}")]
    Serialization(String),
}
