use crate::ast::{DataType, Expression, Value, parse_expression};
use crate::data::DocumentData;
use crate::error::EvaluationError;
use crate::query::{CompiledExpression, CompiledOutput, CompiledQuery};
use crate::trace::TraceFormatter;
use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use tracing::{debug, warn};

mod engine;

use engine::{ExpressionEngine, Scope};

/// How `ROUND` breaks ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// 2.5 rounds to 3 and -2.5 to -3.
    #[default]
    HalfAwayFromZero,
    /// Banker's rounding: 2.5 rounds to 2 and 3.5 to 4.
    HalfEven,
}

impl RoundingMode {
    pub fn round(self, n: f64) -> f64 {
        match self {
            RoundingMode::HalfAwayFromZero => n.round(),
            RoundingMode::HalfEven => n.round_ties_even(),
        }
    }
}

fn serialize_error<S: Serializer>(error: &Option<EvaluationError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

/// The outcome of evaluating one output for one document.
#[derive(Debug, Clone, Serialize)]
pub struct OutputResult {
    pub name: String,
    /// `None` when the output failed.
    pub value: Option<Value>,
    /// Minimum confidence of the fields and outputs the value was computed from.
    pub confidence: f64,
    pub success: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<EvaluationError>,
    pub error_code: Option<&'static str>,
    /// A human-readable account of how the value was reached.
    pub explanation: Option<String>,
}

impl OutputResult {
    fn success(name: &str, value: Value, confidence: f64, explanation: String) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value),
            confidence,
            success: true,
            error: None,
            error_code: None,
            explanation: Some(explanation),
        }
    }

    fn failure(name: &str, error: EvaluationError) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            confidence: 0.0,
            success: false,
            error_code: Some(error.code()),
            error: Some(error),
            explanation: None,
        }
    }
}

/// The result of evaluating every output of a query for one document.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    /// Results in execution order.
    pub outputs: Vec<OutputResult>,
}

impl EvaluationResult {
    pub fn output(&self, name: &str) -> Option<&OutputResult> {
        self.outputs.iter().find(|o| o.name == name)
    }

    /// The value of a successful output.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.output(name).and_then(|o| o.value.as_ref())
    }

    pub fn is_success(&self) -> bool {
        self.outputs.iter().all(|o| o.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OutputResult> {
        self.outputs.iter().filter(|o| !o.success)
    }
}

/// An output whose expression string has been parsed once, up front.
struct PreparedOutput {
    name: String,
    expression: Result<Expression, EvaluationError>,
    /// Output names the expression reads.
    references: Vec<String>,
    field_types: IndexMap<String, DataType>,
}

/// Evaluates compiled outputs against extracted document data.
///
/// An `Evaluator` parses every expression once and can then be used
/// repeatedly, and from multiple threads, for different documents.
pub struct Evaluator {
    outputs: Vec<PreparedOutput>,
    rounding: RoundingMode,
}

pub struct EvaluatorBuilder {
    outputs: Vec<CompiledOutput>,
    rounding: RoundingMode,
}

impl EvaluatorBuilder {
    pub fn new(outputs: Vec<CompiledOutput>) -> Self {
        Self {
            outputs,
            rounding: RoundingMode::default(),
        }
    }

    pub fn rounding(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn build(mut self) -> Evaluator {
        self.outputs.sort_by_key(|o| o.execution_order);
        let outputs = self.outputs.iter().map(prepare).collect();
        Evaluator {
            outputs,
            rounding: self.rounding,
        }
    }
}

fn prepare(output: &CompiledOutput) -> PreparedOutput {
    let expression = match &output.expression {
        CompiledExpression::Valid(source) => parse_expression(source).map_err(EvaluationError::from),
        CompiledExpression::Invalid => Err(EvaluationError::InvalidExpression(output.name.clone())),
    };
    if let Err(e) = &expression {
        warn!(output = %output.name, error = %e, "output cannot be evaluated");
    }
    let mut references: Vec<String> = output.dependencies.outputs.clone();
    if let Ok(expression) = &expression {
        let mut symbols = Vec::new();
        expression.get_references(&mut symbols);
        references.extend(symbols.into_iter().map(str::to_string));
    }
    PreparedOutput {
        name: output.name.clone(),
        expression,
        references,
        field_types: output.field_types.clone(),
    }
}

impl Evaluator {
    pub fn builder(outputs: Vec<CompiledOutput>) -> EvaluatorBuilder {
        EvaluatorBuilder::new(outputs)
    }

    pub fn new(outputs: Vec<CompiledOutput>) -> Self {
        Self::builder(outputs).build()
    }

    pub fn from_query(query: &CompiledQuery) -> Self {
        Self::new(query.outputs.clone())
    }

    /// Evaluates every output in execution order. A failing output never
    /// stops the others; outputs that read it fail with a dependency error.
    ///
    /// # Arguments
    ///
    /// * `document`: The extracted field values, keyed by field id or name.
    /// * `constants`: Constant values by name, as produced by
    ///   [`ConstantCatalog::values`](crate::catalog::ConstantCatalog::values).
    pub fn evaluate(&self, document: &DocumentData, constants: &AHashMap<String, Value>) -> EvaluationResult {
        let mut scope = Scope::default();
        let mut failed: AHashSet<&str> = AHashSet::new();
        let mut results = Vec::with_capacity(self.outputs.len());

        for output in &self.outputs {
            let outcome = self.evaluate_output(output, document, constants, &scope, &failed);
            let result = match outcome {
                Ok((value, confidence, explanation)) => {
                    debug!(output = %output.name, %value, confidence, "evaluated output");
                    scope
                        .computed
                        .insert(output.name.clone(), (value.clone(), confidence));
                    OutputResult::success(&output.name, value, confidence, explanation)
                }
                Err(error) => {
                    warn!(output = %output.name, code = error.code(), error = %error, "output failed");
                    failed.insert(output.name.as_str());
                    OutputResult::failure(&output.name, error)
                }
            };
            results.push(result);
        }

        EvaluationResult { outputs: results }
    }

    /// Evaluates many documents in parallel.
    pub fn evaluate_batch(
        &self,
        documents: &[DocumentData],
        constants: &AHashMap<String, Value>,
    ) -> Vec<EvaluationResult> {
        documents
            .par_iter()
            .map(|document| self.evaluate(document, constants))
            .collect()
    }

    fn evaluate_output(
        &self,
        output: &PreparedOutput,
        document: &DocumentData,
        constants: &AHashMap<String, Value>,
        scope: &Scope,
        failed: &AHashSet<&str>,
    ) -> Result<(Value, f64, String), EvaluationError> {
        let expression = output.expression.as_ref().map_err(Clone::clone)?;
        if let Some(dependency) = output.references.iter().find(|r| failed.contains(r.as_str())) {
            return Err(EvaluationError::DependencyFailed {
                output: output.name.clone(),
                dependency: dependency.clone(),
            });
        }

        let engine = ExpressionEngine::new(document, constants, &output.field_types, scope, self.rounding);
        let (trace, confidence) = engine.evaluate(expression)?;
        let value = trace
            .get_outcome()
            .cloned()
            .ok_or_else(|| EvaluationError::InvalidExpression(output.name.clone()))?;
        Ok((value, confidence, TraceFormatter::format_trace(&trace)))
    }
}
