use super::Value;
use std::fmt;

/// Keywords, function names and typed-literal markers that cannot be written
/// as bare output references.
const RESERVED_WORDS: [&str; 15] = [
    "AND", "OR", "TRUE", "FALSE", "NOT", "ABS", "ROUND", "SQRT", "POWER", "MOD", "IF", "MIN", "MAX",
    "DATE", "CURRENCY",
];

/// Infix operators of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

impl BinaryOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Greater => ">",
            BinaryOperator::Less => "<",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }

    /// Binding strength used when parsing unparenthesized input and when
    /// rendering audit explanations with minimal parentheses.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal | BinaryOperator::NotEqual => 3,
            BinaryOperator::Greater
            | BinaryOperator::Less
            | BinaryOperator::GreaterEqual
            | BinaryOperator::LessEqual => 4,
            BinaryOperator::Add | BinaryOperator::Subtract => 5,
            BinaryOperator::Multiply | BinaryOperator::Divide => 6,
        }
    }
}

/// Function-call operators of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Not,
    Abs,
    Round,
    Sqrt,
    Power,
    Mod,
    If,
    Min,
    Max,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Not => "NOT",
            Function::Abs => "ABS",
            Function::Round => "ROUND",
            Function::Sqrt => "SQRT",
            Function::Power => "POWER",
            Function::Mod => "MOD",
            Function::If => "IF",
            Function::Min => "MIN",
            Function::Max => "MAX",
        }
    }

    pub fn from_name(name: &str) -> Option<Function> {
        let function = match name.to_ascii_uppercase().as_str() {
            "NOT" => Function::Not,
            "ABS" => Function::Abs,
            "ROUND" => Function::Round,
            "SQRT" => Function::Sqrt,
            "POWER" => Function::Power,
            "MOD" => Function::Mod,
            "IF" => Function::If,
            "MIN" => Function::Min,
            "MAX" => Function::Max,
            _ => return None,
        };
        Some(function)
    }

    /// Accepted argument counts as `(min, max)`; `None` means variadic.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::Not | Function::Abs | Function::Round | Function::Sqrt => (1, Some(1)),
            Function::Power | Function::Mod => (2, Some(2)),
            Function::If => (3, Some(3)),
            Function::Min | Function::Max => (1, None),
        }
    }
}

/// A reference to an extracted document field, rendered as `[Input:<name>#<id>]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub name: String,
    pub id: String,
}

/// The Abstract Syntax Tree of a compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Call {
        function: Function,
        args: Vec<Expression>,
    },
    Negate(Box<Expression>),

    // Leaf nodes
    Literal(Value),
    Input(FieldRef),
    /// A bare symbol: another output's name or a constant name.
    Reference(String),

    /// An operator id the registry does not know. Renders as a placeholder
    /// that the expression parser rejects.
    Unknown {
        operator: String,
        args: Vec<Expression>,
    },
}

impl Expression {
    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: Function, args: Vec<Expression>) -> Self {
        Expression::Call { function, args }
    }

    pub fn input(name: impl Into<String>, id: impl Into<String>) -> Self {
        Expression::Input(FieldRef {
            name: name.into(),
            id: id.into(),
        })
    }

    pub fn number(n: f64) -> Self {
        Expression::Literal(Value::Number(n))
    }

    /// Gets the names of all fields the expression reads.
    pub fn get_required_fields<'a>(&'a self, fields: &mut Vec<&'a str>) {
        self.walk(&mut |expr| {
            if let Expression::Input(field) = expr {
                if !fields.contains(&field.name.as_str()) {
                    fields.push(field.name.as_str());
                }
            }
        });
    }

    /// Gets every field reference the expression reads, in first-use order.
    pub fn get_input_refs<'a>(&'a self, refs: &mut Vec<&'a FieldRef>) {
        self.walk(&mut |expr| {
            if let Expression::Input(field) = expr {
                if !refs.contains(&field) {
                    refs.push(field);
                }
            }
        });
    }

    /// Gets every bare symbol (output or constant name) the expression reads.
    pub fn get_references<'a>(&'a self, references: &mut Vec<&'a str>) {
        self.walk(&mut |expr| {
            if let Expression::Reference(name) = expr {
                if !references.contains(&name.as_str()) {
                    references.push(name.as_str());
                }
            }
        });
    }

    /// Pre-order traversal over the expression and all of its children.
    fn walk<'a, F: FnMut(&'a Expression)>(&'a self, visit: &mut F) {
        visit(self);
        match self {
            Expression::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expression::Call { args, .. } | Expression::Unknown { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expression::Negate(inner) => inner.walk(visit),
            Expression::Literal(_) | Expression::Input(_) | Expression::Reference(_) => {}
        }
    }
}

/// Whether a symbol can be written without braces.
pub fn is_bare_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !RESERVED_WORDS
            .iter()
            .any(|word| word.eq_ignore_ascii_case(name))
}

/// Renders the canonical, persisted expression string.
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Expression::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expression::Negate(inner) => write!(f, "-{}", inner),
            Expression::Literal(value) => write_literal(f, value),
            Expression::Input(field) => {
                write!(f, "[Input:{}#{}]", escape_input(&field.name), escape_input(&field.id))
            }
            Expression::Reference(name) => {
                if is_bare_symbol(name) {
                    write!(f, "{}", name)
                } else {
                    write!(f, "{{{}}}", name)
                }
            }
            Expression::Unknown { operator, args } => {
                write!(f, "#UNKNOWN:{}(", operator)?;
                write_args(f, args)?;
                write!(f, ")")
            }
        }
    }
}

/// Dates and currency amounts keep their type through `DATE("...")` and
/// `CURRENCY(...)`; every other literal is written bare.
fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Date(_) => write!(f, "DATE({})", value),
        Value::Currency(_) => write!(f, "CURRENCY({})", value),
        _ => write!(f, "{}", value),
    }
}

/// Escapes the characters that would end an `[Input:...]` reference early.
fn escape_input(part: &str) -> String {
    part.replace('\\', "\\\\").replace(']', "\\]")
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    Ok(())
}

/// A wrapper to display an expression as an indented tree.
/// Useful when explaining a formula to its author.
pub struct TreeDisplay<'a> {
    pub expr: &'a Expression,
}

impl<'a> fmt::Display for TreeDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_as_tree(self.expr, f, "", true)
    }
}

impl<'a> TreeDisplay<'a> {
    fn fmt_as_tree(
        &self,
        expr: &Expression,
        f: &mut fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> fmt::Result {
        let node_marker = if is_last { "└── " } else { "├── " };
        write!(f, "{}{}", prefix, node_marker)?;

        let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "│   " });

        match expr {
            Expression::Binary { op, left, right } => {
                writeln!(f, "{}", op.symbol())?;
                self.fmt_as_tree(left, f, &child_prefix, false)?;
                self.fmt_as_tree(right, f, &child_prefix, true)?;
            }
            Expression::Call { function, args } => {
                writeln!(f, "{}", function.name())?;
                self.fmt_children(args, f, &child_prefix)?;
            }
            Expression::Unknown { operator, args } => {
                writeln!(f, "<unknown operator '{}'>", operator)?;
                self.fmt_children(args, f, &child_prefix)?;
            }
            Expression::Negate(inner) => {
                writeln!(f, "negate")?;
                self.fmt_as_tree(inner, f, &child_prefix, true)?;
            }
            Expression::Literal(v) => writeln!(f, "Literal: {}", v)?,
            Expression::Input(field) => writeln!(f, "Input: {} (#{})", field.name, field.id)?,
            Expression::Reference(name) => writeln!(f, "Reference: {}", name)?,
        }
        Ok(())
    }

    fn fmt_children(
        &self,
        args: &[Expression],
        f: &mut fmt::Formatter<'_>,
        prefix: &str,
    ) -> fmt::Result {
        for (i, arg) in args.iter().enumerate() {
            self.fmt_as_tree(arg, f, prefix, i + 1 == args.len())?;
        }
        Ok(())
    }
}
