use super::RoundingMode;
use crate::ast::value::parse_date;
use crate::ast::{BinaryOperator, DataType, EvaluationTrace, Expression, FieldRef, Function, Value};
use crate::data::DocumentData;
use crate::error::EvaluationError;
use ahash::AHashMap;
use chrono::{NaiveDate, TimeDelta};
use indexmap::IndexMap;
use std::cmp::Ordering;

// This macro generates a match arm for a numeric function of one argument.
macro_rules! eval_unary_numeric {
    ($self:ident, $name:expr, $args:ident, $f:expr) => {{
        let apply = $f;
        let child = $self.evaluate_recursive(&$args[0])?;
        let outcome = match child.get_outcome() {
            Some(Value::Number(n)) => Value::Number($self.finite($name, apply(*n))?),
            Some(Value::Currency(n)) => Value::Currency($self.finite($name, apply(*n))?),
            other => return Err(type_mismatch($name, "Number", other)),
        };
        Ok(EvaluationTrace::Call {
            name: $name,
            args: vec![child],
            outcome,
        })
    }};
}

/// Outputs already computed during the current document's run.
#[derive(Default)]
pub(super) struct Scope {
    pub computed: AHashMap<String, (Value, f64)>,
}

/// The recursive engine that evaluates one output expression for one document.
pub(super) struct ExpressionEngine<'a> {
    document: &'a DocumentData,
    constants: &'a AHashMap<String, Value>,
    /// Catalog-declared field types, by field id.
    field_types: &'a IndexMap<String, DataType>,
    scope: &'a Scope,
    rounding: RoundingMode,
    /// Lowest confidence among the values consumed so far.
    confidence: f64,
}

impl<'a> ExpressionEngine<'a> {
    pub(super) fn new(
        document: &'a DocumentData,
        constants: &'a AHashMap<String, Value>,
        field_types: &'a IndexMap<String, DataType>,
        scope: &'a Scope,
        rounding: RoundingMode,
    ) -> Self {
        Self {
            document,
            constants,
            field_types,
            scope,
            rounding,
            confidence: 1.0,
        }
    }

    /// Evaluates the expression, returning its trace and the confidence of the result.
    pub(super) fn evaluate(
        mut self,
        expression: &Expression,
    ) -> Result<(EvaluationTrace, f64), EvaluationError> {
        let trace = self.evaluate_recursive(expression)?;
        Ok((trace, self.confidence))
    }

    fn evaluate_recursive(&mut self, expr: &Expression) -> Result<EvaluationTrace, EvaluationError> {
        match expr {
            Expression::Binary { op, left, right } => match op {
                BinaryOperator::And | BinaryOperator::Or => self.eval_logical(*op, left, right),
                _ => {
                    let left_trace = self.evaluate_recursive(left)?;
                    let right_trace = self.evaluate_recursive(right)?;
                    let outcome =
                        self.apply_binary(*op, left_trace.get_outcome(), right_trace.get_outcome())?;
                    Ok(EvaluationTrace::BinaryOp {
                        op: *op,
                        left: Box::new(left_trace),
                        right: Box::new(right_trace),
                        outcome,
                    })
                }
            },
            Expression::Call { function, args } => self.eval_call(*function, args),
            Expression::Negate(inner) => {
                let child = self.evaluate_recursive(inner)?;
                let outcome = match child.get_outcome() {
                    Some(Value::Number(n)) => Value::Number(-n),
                    Some(Value::Currency(n)) => Value::Currency(-n),
                    other => return Err(type_mismatch("-", "Number", other)),
                };
                Ok(EvaluationTrace::Negate {
                    child: Box::new(child),
                    outcome,
                })
            }
            Expression::Literal(value) => Ok(EvaluationTrace::Leaf {
                source: value.to_string(),
                value: value.clone(),
                is_input: false,
            }),
            Expression::Input(field) => self.read_field(field),
            Expression::Reference(name) => self.read_symbol(name),
            Expression::Unknown { operator, .. } => Err(EvaluationError::InvalidExpression(format!(
                "unknown operator '{}'",
                operator
            ))),
        }
    }

    fn read_field(&mut self, field: &FieldRef) -> Result<EvaluationTrace, EvaluationError> {
        let raw = self
            .document
            .get(&field.id, &field.name)
            .ok_or_else(|| EvaluationError::MissingField(field.name.clone()))?;
        // A type given in the document beats the catalog; untyped values read as numbers.
        let data_type = raw
            .data_type
            .or_else(|| self.field_types.get(&field.id).copied())
            .unwrap_or_default();
        let value = Value::coerce(&field.name, &raw.value, data_type)?;
        self.consume(raw.confidence);
        Ok(EvaluationTrace::Leaf {
            source: field.name.clone(),
            value,
            is_input: true,
        })
    }

    /// Bare symbols name computed outputs first, then constants.
    fn read_symbol(&mut self, name: &str) -> Result<EvaluationTrace, EvaluationError> {
        let (value, is_input) = if let Some((value, confidence)) = self.scope.computed.get(name) {
            self.consume(*confidence);
            (value.clone(), true)
        } else if let Some(value) = self.constants.get(name) {
            (value.clone(), false)
        } else {
            return Err(EvaluationError::UnresolvedSymbol(name.to_string()));
        };
        Ok(EvaluationTrace::Leaf {
            source: name.to_string(),
            value,
            is_input,
        })
    }

    fn consume(&mut self, confidence: f64) {
        self.confidence = self.confidence.min(confidence);
    }

    fn eval_logical(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> Result<EvaluationTrace, EvaluationError> {
        let decisive = op == BinaryOperator::Or;
        let left_trace = self.evaluate_recursive(left)?;
        let left_value = expect_bool(op.symbol(), left_trace.get_outcome())?;
        if left_value == decisive {
            return Ok(EvaluationTrace::BinaryOp {
                op,
                left: Box::new(left_trace),
                right: Box::new(EvaluationTrace::NotEvaluated),
                outcome: Value::Bool(decisive),
            });
        }
        let right_trace = self.evaluate_recursive(right)?;
        let right_value = expect_bool(op.symbol(), right_trace.get_outcome())?;
        Ok(EvaluationTrace::BinaryOp {
            op,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome: Value::Bool(right_value),
        })
    }

    fn apply_binary(
        &self,
        op: BinaryOperator,
        left: Option<&Value>,
        right: Option<&Value>,
    ) -> Result<Value, EvaluationError> {
        let (Some(left), Some(right)) = (left, right) else {
            return Err(type_mismatch(op.symbol(), "a value", None));
        };
        match op {
            BinaryOperator::Add | BinaryOperator::Subtract => self.additive(op, left, right),
            BinaryOperator::Multiply | BinaryOperator::Divide => self.multiplicative(op, left, right),
            BinaryOperator::Equal => Ok(Value::Bool(values_equal(left, right))),
            BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
            BinaryOperator::Greater
            | BinaryOperator::Less
            | BinaryOperator::GreaterEqual
            | BinaryOperator::LessEqual => {
                let ordering = compare(op.symbol(), left, right)?;
                let outcome = match op {
                    BinaryOperator::Greater => ordering == Ordering::Greater,
                    BinaryOperator::Less => ordering == Ordering::Less,
                    BinaryOperator::GreaterEqual => ordering != Ordering::Less,
                    _ => ordering != Ordering::Greater,
                };
                Ok(Value::Bool(outcome))
            }
            BinaryOperator::And | BinaryOperator::Or => {
                let l = expect_bool(op.symbol(), Some(left))?;
                let r = expect_bool(op.symbol(), Some(right))?;
                Ok(Value::Bool(if op == BinaryOperator::And { l && r } else { l || r }))
            }
        }
    }

    fn additive(&self, op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
        let sign = if op == BinaryOperator::Add { 1.0 } else { -1.0 };
        match (left, right) {
            (Value::Date(date), other) if other.as_number().is_some() => {
                let days = other.as_number().unwrap_or_default() * sign;
                shift_date(op.symbol(), *date, days)
            }
            (other, Value::Date(date)) if op == BinaryOperator::Add && other.as_number().is_some() => {
                shift_date(op.symbol(), *date, other.as_number().unwrap_or_default())
            }
            (Value::Date(a), Value::Date(b)) if op == BinaryOperator::Subtract => {
                Ok(Value::Number(a.signed_duration_since(*b).num_days() as f64))
            }
            _ => {
                let (a, b, currency) = numeric_pair(op.symbol(), left, right)?;
                let result = self.finite(op.symbol(), a + sign * b)?;
                Ok(numeric(result, currency))
            }
        }
    }

    fn multiplicative(&self, op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
        let (a, b, _) = numeric_pair(op.symbol(), left, right)?;
        let left_currency = matches!(left, Value::Currency(_));
        let right_currency = matches!(right, Value::Currency(_));
        let result = if op == BinaryOperator::Multiply {
            a * b
        } else {
            if b == 0.0 {
                return Err(EvaluationError::DivisionByZero(op.symbol().to_string()));
            }
            a / b
        };
        let result = self.finite(op.symbol(), result)?;
        // A ratio of two amounts is a plain number.
        let currency = match op {
            BinaryOperator::Divide => left_currency && !right_currency,
            _ => left_currency || right_currency,
        };
        Ok(numeric(result, currency))
    }

    fn eval_call(&mut self, function: Function, args: &[Expression]) -> Result<EvaluationTrace, EvaluationError> {
        let name = function.name();
        let (min, max) = function.arity();
        if args.len() < min || max.is_some_and(|max| args.len() > max) {
            return Err(EvaluationError::Arity {
                function: name.to_string(),
                expected: match max {
                    Some(max) if max == min => min.to_string(),
                    Some(max) => format!("{} to {}", min, max),
                    None => format!("at least {}", min),
                },
                found: args.len(),
            });
        }

        match function {
            Function::Abs => eval_unary_numeric!(self, name, args, f64::abs),
            Function::Round => {
                let rounding = self.rounding;
                eval_unary_numeric!(self, name, args, |n: f64| rounding.round(n))
            }
            Function::Sqrt => {
                let child = self.evaluate_recursive(&args[0])?;
                let n = expect_number(name, child.get_outcome())?;
                if n < 0.0 {
                    return Err(EvaluationError::Arithmetic {
                        operation: name.to_string(),
                        message: format!("square root of negative number {}", n),
                    });
                }
                Ok(EvaluationTrace::Call {
                    name,
                    args: vec![child],
                    outcome: Value::Number(n.sqrt()),
                })
            }
            Function::Not => {
                let child = self.evaluate_recursive(&args[0])?;
                let outcome = Value::Bool(!expect_bool(name, child.get_outcome())?);
                Ok(EvaluationTrace::Call {
                    name,
                    args: vec![child],
                    outcome,
                })
            }
            Function::Power | Function::Mod => {
                let base = self.evaluate_recursive(&args[0])?;
                let exponent = self.evaluate_recursive(&args[1])?;
                let (a, b, currency) = numeric_pair(
                    name,
                    base.get_outcome_or_err(name)?,
                    exponent.get_outcome_or_err(name)?,
                )?;
                let result = if function == Function::Power {
                    a.powf(b)
                } else {
                    if b == 0.0 {
                        return Err(EvaluationError::DivisionByZero(name.to_string()));
                    }
                    a % b
                };
                let result = self.finite(name, result)?;
                Ok(EvaluationTrace::Call {
                    name,
                    args: vec![base, exponent],
                    outcome: numeric(result, currency && function == Function::Mod),
                })
            }
            Function::If => {
                // Only the taken branch is evaluated.
                let condition = self.evaluate_recursive(&args[0])?;
                let taken = expect_bool(name, condition.get_outcome())?;
                let branch_index = if taken { 1 } else { 2 };
                let branch = self.evaluate_recursive(&args[branch_index])?;
                let outcome = branch.get_outcome_or_err(name)?.clone();
                let mut traces = vec![condition, EvaluationTrace::NotEvaluated, EvaluationTrace::NotEvaluated];
                traces[branch_index] = branch;
                Ok(EvaluationTrace::Call {
                    name,
                    args: traces,
                    outcome,
                })
            }
            Function::Min | Function::Max => {
                let mut traces = Vec::with_capacity(args.len());
                let mut best: Option<f64> = None;
                let mut currency = false;
                for arg in args {
                    let trace = self.evaluate_recursive(arg)?;
                    let value = trace.get_outcome_or_err(name)?;
                    currency |= matches!(value, Value::Currency(_));
                    let n = expect_number(name, Some(value))?;
                    best = Some(match best {
                        None => n,
                        Some(b) if function == Function::Min => b.min(n),
                        Some(b) => b.max(n),
                    });
                    traces.push(trace);
                }
                Ok(EvaluationTrace::Call {
                    name,
                    args: traces,
                    outcome: numeric(best.unwrap_or_default(), currency),
                })
            }
        }
    }

    fn finite(&self, operation: &str, n: f64) -> Result<f64, EvaluationError> {
        if n.is_finite() {
            Ok(n)
        } else {
            Err(EvaluationError::Arithmetic {
                operation: operation.to_string(),
                message: format!("result {} is not a finite number", n),
            })
        }
    }
}

trait OutcomeExt {
    fn get_outcome_or_err(&self, operation: &str) -> Result<&Value, EvaluationError>;
}

impl OutcomeExt for EvaluationTrace {
    fn get_outcome_or_err(&self, operation: &str) -> Result<&Value, EvaluationError> {
        self.get_outcome()
            .ok_or_else(|| type_mismatch(operation, "a value", None))
    }
}

fn type_mismatch(operation: &str, expected: &str, found: Option<&Value>) -> EvaluationError {
    EvaluationError::TypeMismatch {
        operation: operation.to_string(),
        expected: expected.to_string(),
        found: found.cloned().unwrap_or(Value::Text(String::new())),
    }
}

fn expect_bool(operation: &str, value: Option<&Value>) -> Result<bool, EvaluationError> {
    match value {
        Some(Value::Bool(b)) => Ok(*b),
        other => Err(type_mismatch(operation, "Bool", other)),
    }
}

fn expect_number(operation: &str, value: Option<&Value>) -> Result<f64, EvaluationError> {
    value
        .and_then(Value::as_number)
        .ok_or_else(|| type_mismatch(operation, "Number", value))
}

/// Both operands as numbers, plus whether either was a currency amount.
fn numeric_pair(operation: &str, left: &Value, right: &Value) -> Result<(f64, f64, bool), EvaluationError> {
    let a = expect_number(operation, Some(left))?;
    let b = expect_number(operation, Some(right))?;
    let currency = matches!(left, Value::Currency(_)) || matches!(right, Value::Currency(_));
    Ok((a, b, currency))
}

fn numeric(n: f64, currency: bool) -> Value {
    if currency {
        Value::Currency(n)
    } else {
        Value::Number(n)
    }
}

fn shift_date(operation: &str, date: NaiveDate, days: f64) -> Result<Value, EvaluationError> {
    TimeDelta::try_days(days.trunc() as i64)
        .and_then(|delta| date.checked_add_signed(delta))
        .map(Value::Date)
        .ok_or_else(|| EvaluationError::Arithmetic {
            operation: operation.to_string(),
            message: format!("date {} shifted by {} days is out of range", date, days),
        })
}

/// Text that parses as a date compares as a date.
fn as_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_date(s),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Date(_), Value::Text(_)) | (Value::Text(_), Value::Date(_)) => {
            as_date(left).is_some() && as_date(left) == as_date(right)
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn compare(operation: &str, left: &Value, right: &Value) -> Result<Ordering, EvaluationError> {
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return a
            .partial_cmp(&b)
            .ok_or_else(|| type_mismatch(operation, "Number", Some(left)));
    }
    if matches!(left, Value::Date(_)) || matches!(right, Value::Date(_)) {
        if let (Some(a), Some(b)) = (as_date(left), as_date(right)) {
            return Ok(a.cmp(&b));
        }
    }
    let offending = if left.as_number().is_none() { left } else { right };
    Err(type_mismatch(operation, "Number", Some(offending)))
}
