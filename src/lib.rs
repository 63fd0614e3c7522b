//! # Keisan - Formula Graph Compiler and Evaluator
//!
//! **Keisan** turns visually authored formula graphs into persisted expression
//! strings and evaluates them against extracted document data. A graph is made
//! of field variables, constants, operations and named outputs; every output
//! compiles independently to an expression, a dependency list and a rank in
//! the execution order.
//!
//! ## Core Workflow
//!
//! 1.  **Load a Graph**: Decode a canvas document with [`graph::parse_canvas`], or
//!     implement [`graph::IntoGraph`] for your own authoring format.
//! 2.  **Compile**: Use [`compiler::Compiler::builder`] with the field and constant
//!     catalogs. Compilation never stops at the first problem; each output carries
//!     its own diagnostics and broken outputs compile to `#INVALID`.
//! 3.  **Persist**: Save the [`query::CompiledQuery`] with bincode, or export it as JSON.
//! 4.  **Evaluate**: Create an [`evaluator::Evaluator`] from the compiled outputs and
//!     run it against each document. Failures stay isolated to the output that failed
//!     and the outputs that read it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keisan::prelude::*;
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let canvas = std::fs::read_to_string("query.json")?;
//!     let parsed = parse_canvas(&canvas)?;
//!     for problem in &parsed.diagnostics {
//!         eprintln!("skipped: {}", problem);
//!     }
//!
//!     let fields = FieldCatalog::new().with_field("7", "Price", DataType::Currency);
//!     let constants = ConstantCatalog::new()
//!         .with_constant(ConstantScope::Global, "1", "VAT", json!(0.15));
//!
//!     let compilation = Compiler::builder(parsed.graph)
//!         .with_field_catalog(fields)
//!         .with_constant_catalog(constants.clone())
//!         .build()
//!         .compile();
//!     for (output, diagnostic) in compilation.diagnostics() {
//!         eprintln!("{}: {}", output, diagnostic);
//!     }
//!
//!     let query = compilation.into_query();
//!     query.save("query.bin")?;
//!
//!     let evaluator = Evaluator::from_query(&query);
//!     let document = DocumentData::new().with_typed_field("7", json!("$ 200.00"), DataType::Currency, 0.92);
//!     let result = evaluator.evaluate(&document, &constants.values());
//!     for output in &result.outputs {
//!         match &output.value {
//!             Some(value) => println!("{} = {} ({:.2})", output.name, value, output.confidence),
//!             None => println!("{} failed: {:?}", output.name, output.error_code),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod prelude;
pub mod query;
pub mod trace;
