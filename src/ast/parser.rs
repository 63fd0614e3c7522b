use super::lexer::{Spanned, Token, tokenize};
use super::value::parse_date;
use super::{BinaryOperator, Expression, FieldRef, Function, Value};
use crate::error::ExpressionParseError;

/// Parses a persisted expression string back into an [`Expression`].
///
/// The grammar accepts the canonical, fully parenthesized form produced by the
/// compiler and also unparenthesized input using conventional precedence:
/// `OR` < `AND` < `= <>` < `> < >= <=` < `+ -` < `* /` < unary minus.
/// `DATE("2024-01-31")` and `CURRENCY(12.5)` read back as typed literals.
pub fn parse_expression(source: &str) -> Result<Expression, ExpressionParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_binary(1)?;
    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some((position, token)) => Err(ExpressionParseError::UnexpectedToken {
            position: *position,
            found: token.to_string(),
            expected: "end of expression".to_string(),
        }),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, wanted: Token, description: &str) -> Result<(), ExpressionParseError> {
        match self.advance() {
            Some((_, token)) if token == wanted => Ok(()),
            Some((position, token)) => Err(ExpressionParseError::UnexpectedToken {
                position,
                found: token.to_string(),
                expected: description.to_string(),
            }),
            None => Err(ExpressionParseError::UnexpectedEnd(description.to_string())),
        }
    }

    fn peek_operator(&self) -> Option<BinaryOperator> {
        let op = match self.peek()? {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
            Token::Star => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
            Token::Greater => BinaryOperator::Greater,
            Token::Less => BinaryOperator::Less,
            Token::GreaterEqual => BinaryOperator::GreaterEqual,
            Token::LessEqual => BinaryOperator::LessEqual,
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::Symbol(s) if s.eq_ignore_ascii_case("AND") => BinaryOperator::And,
            Token::Symbol(s) if s.eq_ignore_ascii_case("OR") => BinaryOperator::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over left-associative binary operators.
    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expression, ExpressionParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek_operator() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.parse_binary(op.precedence() + 1)?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ExpressionParseError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            if let Some(Token::Number(n)) = self.peek() {
                let n = *n;
                self.pos += 1;
                return Ok(Expression::Literal(Value::Number(-n)));
            }
            let inner = self.parse_unary()?;
            return Ok(Expression::Negate(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ExpressionParseError> {
        let (position, token) = self
            .advance()
            .ok_or_else(|| ExpressionParseError::UnexpectedEnd("an operand".to_string()))?;

        match token {
            Token::Number(n) => Ok(Expression::Literal(Value::Number(n))),
            Token::Text(s) => Ok(Expression::Literal(Value::Text(s))),
            Token::Input { name, id } => Ok(Expression::Input(FieldRef { name, id })),
            Token::BracedSymbol(name) => Ok(Expression::Reference(name)),
            Token::LParen => {
                let inner = self.parse_binary(1)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Symbol(name) => {
                if self.peek() == Some(&Token::LParen) && is_typed_literal(&name) {
                    self.pos += 1;
                    return self.parse_typed_literal(&name, position);
                }
                if self.peek() == Some(&Token::LParen) {
                    let function = Function::from_name(&name)
                        .ok_or_else(|| ExpressionParseError::UnknownFunction(name.clone()))?;
                    self.pos += 1;
                    let args = self.parse_arguments()?;
                    return Ok(Expression::Call { function, args });
                }
                match name.to_ascii_uppercase().as_str() {
                    "TRUE" => Ok(Expression::Literal(Value::Bool(true))),
                    "FALSE" => Ok(Expression::Literal(Value::Bool(false))),
                    _ => Ok(Expression::Reference(name)),
                }
            }
            other => Err(ExpressionParseError::UnexpectedToken {
                position,
                found: other.to_string(),
                expected: "an operand".to_string(),
            }),
        }
    }

    /// Parses the argument of `DATE("YYYY-MM-DD")` or `CURRENCY(<number>)`
    /// into a single typed literal.
    fn parse_typed_literal(&mut self, marker: &str, position: usize) -> Result<Expression, ExpressionParseError> {
        let args = self.parse_arguments()?;
        let value = match (marker.to_ascii_uppercase().as_str(), args.as_slice()) {
            ("DATE", [Expression::Literal(Value::Text(s))]) => parse_date(s).map(Value::Date),
            ("CURRENCY", [Expression::Literal(Value::Number(n))]) => Some(Value::Currency(*n)),
            _ => None,
        };
        value
            .map(Expression::Literal)
            .ok_or_else(|| ExpressionParseError::UnexpectedToken {
                position,
                found: marker.to_string(),
                expected: "DATE(\"YYYY-MM-DD\") or CURRENCY(<number>) with a single literal".to_string(),
            })
    }

    /// Parses a comma-separated argument list after the opening parenthesis.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ExpressionParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_binary(1)?);
            match self.advance() {
                Some((_, Token::Comma)) => continue,
                Some((_, Token::RParen)) => return Ok(args),
                Some((position, token)) => {
                    return Err(ExpressionParseError::UnexpectedToken {
                        position,
                        found: token.to_string(),
                        expected: "',' or ')'".to_string(),
                    });
                }
                None => return Err(ExpressionParseError::UnexpectedEnd("')'".to_string())),
            }
        }
    }
}

fn is_typed_literal(name: &str) -> bool {
    name.eq_ignore_ascii_case("DATE") || name.eq_ignore_ascii_case("CURRENCY")
}
