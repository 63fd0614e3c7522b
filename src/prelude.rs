//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the keisan crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use keisan::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let canvas = std::fs::read_to_string("path/to/query.json")?;
//! let fields = FieldCatalog::from_json(&std::fs::read_to_string("path/to/fields.json")?)?;
//! let parsed = parse_canvas(&canvas)?;
//!
//! let query = Compiler::builder(parsed.graph)
//!     .with_field_catalog(fields)
//!     .build()
//!     .compile()
//!     .into_query();
//!
//! let document = DocumentData::from_file("path/to/document.json")?;
//! let result = Evaluator::from_query(&query).evaluate(&document, &Default::default());
//! println!("Evaluation Result: {:?}", result);
//! # Ok(())
//! # }
//! ```

// Core compilation and evaluation
pub use crate::compiler::{Compiler, OperationRegistry, QueryCompilation};
pub use crate::evaluator::{EvaluationResult, Evaluator, OutputResult, RoundingMode};

// Graph model and decoding
pub use crate::graph::{ConstantScope, Graph, IntoGraph, Node, ParsedGraph, parse_canvas};

// Catalogs and runtime data
pub use crate::catalog::{ConstantCatalog, FieldCatalog};
pub use crate::data::DocumentData;

// AST and expression types
pub use crate::ast::{DataType, EvaluationTrace, Expression, Value, parse_expression};

// Persisted artifacts
pub use crate::query::{CompiledExpression, CompiledOutput, CompiledQuery};

// Error types
pub use crate::error::{
    ArtifactError, CompileDiagnostic, DiagnosticCode, EvaluationError, ExpressionParseError,
    GraphParseError, OrderingError, ParseDiagnostic,
};

// Trace formatting
pub use crate::trace::TraceFormatter;

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
