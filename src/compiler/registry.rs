use crate::ast::{BinaryOperator, Expression, Function};
use ahash::AHashMap;

/// How an operation is rendered in the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorFormat {
    /// Parenthesized binary infix, e.g. `(a + b)`.
    Infix(BinaryOperator),
    /// Function-call syntax, e.g. `POWER(a, b)`.
    Function(Function),
}

/// One entry of the operation registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    pub id: String,
    /// Display label used in diagnostics, e.g. "IF".
    pub label: String,
    /// Number of input ports that must be connected.
    pub arity: usize,
    /// Variadic operations consume every connected port, not just `arity` of them.
    pub variadic: bool,
    pub format: OperatorFormat,
}

impl OperationSpec {
    /// Formats the operator over its compiled inputs, given in port order.
    pub fn build(&self, mut args: Vec<Expression>) -> Expression {
        match self.format {
            OperatorFormat::Infix(op) if args.len() == 2 => {
                let right = args.pop().unwrap_or_else(|| Expression::number(0.0));
                let left = args.pop().unwrap_or_else(|| Expression::number(0.0));
                Expression::binary(op, left, right)
            }
            // Arity is checked before formatting; this only guards custom entries
            // that declare an infix format with the wrong arity.
            OperatorFormat::Infix(_) => Expression::Unknown {
                operator: self.id.clone(),
                args,
            },
            OperatorFormat::Function(function) => Expression::call(function, args),
        }
    }
}

/// Master macro to define the standard operations and their registration.
macro_rules! define_operations {
    (
        infix: $( ($in_id:expr, $in_label:expr, $in_op:ident) ),* $(,)? ;
        function: $( ($fn_id:expr, $fn_label:expr, $func:ident, $fn_arity:expr) ),* $(,)? ;
        variadic: $( ($var_id:expr, $var_label:expr, $var_fn:ident, $var_arity:expr) ),* $(,)?
    ) => {
        fn standard_operations() -> Vec<OperationSpec> {
            vec![
                $( OperationSpec {
                    id: $in_id.to_string(),
                    label: $in_label.to_string(),
                    arity: 2,
                    variadic: false,
                    format: OperatorFormat::Infix(BinaryOperator::$in_op),
                }, )*
                $( OperationSpec {
                    id: $fn_id.to_string(),
                    label: $fn_label.to_string(),
                    arity: $fn_arity,
                    variadic: false,
                    format: OperatorFormat::Function(Function::$func),
                }, )*
                $( OperationSpec {
                    id: $var_id.to_string(),
                    label: $var_label.to_string(),
                    arity: $var_arity,
                    variadic: true,
                    format: OperatorFormat::Function(Function::$var_fn),
                }, )*
            ]
        }
    };
}

define_operations! {
    infix:
    ("add", "ADD", Add),
    ("subtract", "SUBTRACT", Subtract),
    ("multiply", "MULTIPLY", Multiply),
    ("divide", "DIVIDE", Divide),
    ("greater", "GREATER THAN", Greater),
    ("less", "LESS THAN", Less),
    ("greaterEqual", "GREATER OR EQUAL", GreaterEqual),
    ("lessEqual", "LESS OR EQUAL", LessEqual),
    ("equals", "EQUALS", Equal),
    ("notEqual", "NOT EQUAL", NotEqual),
    ("and", "AND", And),
    ("or", "OR", Or);

    function:
    ("not", "NOT", Not, 1),
    ("abs", "ABS", Abs, 1),
    ("round", "ROUND", Round, 1),
    ("sqrt", "SQRT", Sqrt, 1),
    ("power", "POWER", Power, 2),
    ("mod", "MOD", Mod, 2),
    ("if", "IF", If, 3);

    variadic:
    ("min", "MIN", Min, 2),
    ("max", "MAX", Max, 2)
}

/// An immutable table of supported operators, passed into the compiler.
/// Lookups ignore ASCII case.
#[derive(Debug, Clone)]
pub struct OperationRegistry {
    operations: AHashMap<String, OperationSpec>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl OperationRegistry {
    /// A registry with no operations.
    pub fn empty() -> Self {
        Self {
            operations: AHashMap::new(),
        }
    }

    /// The standard arithmetic, comparison, logical and function operators.
    pub fn standard() -> Self {
        standard_operations()
            .into_iter()
            .fold(Self::empty(), |registry, spec| registry.with_operation(spec))
    }

    pub fn with_operation(mut self, spec: OperationSpec) -> Self {
        self.operations.insert(spec.id.to_ascii_lowercase(), spec);
        self
    }

    /// Makes a canvas-specific operator id resolve to a registered operation.
    /// Unknown targets are ignored.
    pub fn with_alias(mut self, user_id: &str, registered_id: &str) -> Self {
        if let Some(spec) = self.get(registered_id).cloned() {
            self.operations.insert(user_id.to_ascii_lowercase(), spec);
        }
        self
    }

    pub fn get(&self, id: &str) -> Option<&OperationSpec> {
        self.operations.get(&id.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
