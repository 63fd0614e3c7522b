use crate::ast::EvaluationTrace;

/// Formats evaluation traces into human-readable audit explanations.
pub struct TraceFormatter;

impl TraceFormatter {
    /// Format an evaluation trace into a human-readable explanation.
    pub fn format_trace(trace: &EvaluationTrace) -> String {
        // Start the recursive formatting with the lowest possible parent precedence.
        Self::format_recursive(trace, 0)
    }

    /// Recursively formats the trace, adding parentheses only when necessary.
    fn format_recursive(trace: &EvaluationTrace, parent_precedence: u8) -> String {
        let current_precedence = trace.precedence();
        let needs_parens = current_precedence < parent_precedence;

        let mut result = String::new();
        if needs_parens {
            result.push('(');
        }

        match trace {
            EvaluationTrace::BinaryOp {
                op, left, right, ..
            } => {
                let left_str = Self::format_recursive(left, current_precedence);

                // Short-circuited operators only show the decisive left side.
                if !matches!(**right, EvaluationTrace::NotEvaluated) {
                    // Right operands bind one level tighter so `a - (b - c)` keeps its parens.
                    let right_str = Self::format_recursive(right, current_precedence + 1);
                    result.push_str(&format!("{} {} {}", left_str, op.symbol(), right_str));
                } else {
                    result.push_str(&left_str);
                }
            }
            EvaluationTrace::Call { name, args, .. } => {
                let rendered: Vec<String> = args
                    .iter()
                    .filter(|arg| !matches!(arg, EvaluationTrace::NotEvaluated))
                    .map(|arg| Self::format_recursive(arg, 0))
                    .collect();
                result.push_str(&format!("{}({})", name, rendered.join(", ")));
            }
            EvaluationTrace::Negate { child, .. } => {
                let child_str = Self::format_recursive(child, current_precedence);
                result.push_str(&format!("-{}", child_str));
            }
            EvaluationTrace::Leaf {
                source,
                value,
                is_input,
            } => {
                if *is_input {
                    result.push_str(&format!("{} (was {})", source, value));
                } else {
                    result.push_str(source);
                }
            }
            EvaluationTrace::NotEvaluated => {}
        }

        if needs_parens {
            result.push(')');
        }
        result
    }
}
