use super::{BinaryOperator, Value};

/// A record of how an expression was evaluated, including intermediate values.
#[derive(Debug, Clone)]
pub enum EvaluationTrace {
    BinaryOp {
        op: BinaryOperator,
        left: Box<EvaluationTrace>,
        right: Box<EvaluationTrace>,
        outcome: Value,
    },
    Call {
        name: &'static str,
        args: Vec<EvaluationTrace>,
        outcome: Value,
    },
    Negate {
        child: Box<EvaluationTrace>,
        outcome: Value,
    },
    /// A literal, field or output read. `is_input` marks values that came from
    /// outside the expression and are worth echoing in explanations.
    Leaf {
        source: String,
        value: Value,
        is_input: bool,
    },
    NotEvaluated,
}

impl EvaluationTrace {
    pub fn get_outcome(&self) -> Option<&Value> {
        match self {
            EvaluationTrace::BinaryOp { outcome, .. }
            | EvaluationTrace::Call { outcome, .. }
            | EvaluationTrace::Negate { outcome, .. } => Some(outcome),
            EvaluationTrace::Leaf { value, .. } => Some(value),
            EvaluationTrace::NotEvaluated => None,
        }
    }

    pub fn precedence(&self) -> u8 {
        match self {
            EvaluationTrace::BinaryOp { op, .. } => op.precedence(),
            EvaluationTrace::Negate { .. } => 8,
            EvaluationTrace::Call { .. }
            | EvaluationTrace::Leaf { .. }
            | EvaluationTrace::NotEvaluated => 9,
        }
    }
}
