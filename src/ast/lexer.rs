use crate::error::ExpressionParseError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Text(String),
    Input { name: String, id: String },
    Symbol(String),
    /// A `{...}` braced symbol; never a keyword or function name.
    BracedSymbol(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Text(s) => write!(f, "\"{}\"", s),
            Token::Input { name, id } => write!(f, "[Input:{}#{}]", name, id),
            Token::Symbol(s) => write!(f, "{}", s),
            Token::BracedSymbol(s) => write!(f, "{{{}}}", s),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Greater => write!(f, ">"),
            Token::Less => write!(f, "<"),
            Token::GreaterEqual => write!(f, ">="),
            Token::LessEqual => write!(f, "<="),
            Token::Equal => write!(f, "="),
            Token::NotEqual => write!(f, "<>"),
        }
    }
}

/// A token together with the character offset where it starts.
pub(crate) type Spanned = (usize, Token);

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        let start = pos;
        let token = match c {
            c if c.is_whitespace() => {
                pos += 1;
                continue;
            }
            '(' => single(&mut pos, Token::LParen),
            ')' => single(&mut pos, Token::RParen),
            ',' => single(&mut pos, Token::Comma),
            '+' => single(&mut pos, Token::Plus),
            '-' => single(&mut pos, Token::Minus),
            '*' => single(&mut pos, Token::Star),
            '/' => single(&mut pos, Token::Slash),
            '=' => single(&mut pos, Token::Equal),
            '>' => match chars.get(pos + 1) {
                Some('=') => double(&mut pos, Token::GreaterEqual),
                _ => single(&mut pos, Token::Greater),
            },
            '<' => match chars.get(pos + 1) {
                Some('=') => double(&mut pos, Token::LessEqual),
                Some('>') => double(&mut pos, Token::NotEqual),
                _ => single(&mut pos, Token::Less),
            },
            '[' => lex_input(&chars, &mut pos)?,
            '{' => {
                let body = read_until(&chars, pos + 1, '}').ok_or(
                    ExpressionParseError::Unterminated {
                        what: "braced symbol",
                        position: start,
                    },
                )?;
                pos += body.chars().count() + 2;
                Token::BracedSymbol(body)
            }
            '"' => lex_text(&chars, &mut pos)?,
            c if c.is_ascii_digit() || c == '.' => lex_number(&chars, &mut pos)?,
            c if c.is_alphabetic() || c == '_' => {
                while pos < chars.len()
                    && (chars[pos].is_alphanumeric() || chars[pos] == '_' || chars[pos] == '.')
                {
                    pos += 1;
                }
                Token::Symbol(chars[start..pos].iter().collect())
            }
            other => {
                return Err(ExpressionParseError::UnexpectedCharacter {
                    position: pos,
                    found: other,
                });
            }
        };
        tokens.push((start, token));
    }
    Ok(tokens)
}

fn single(pos: &mut usize, token: Token) -> Token {
    *pos += 1;
    token
}

fn double(pos: &mut usize, token: Token) -> Token {
    *pos += 2;
    token
}

fn read_until(chars: &[char], from: usize, end: char) -> Option<String> {
    let offset = chars.get(from..)?.iter().position(|&c| c == end)?;
    Some(chars[from..from + offset].iter().collect())
}

/// Lexes `[Input:<name>#<id>]`. The id follows the last `#`, so field names
/// may themselves contain `#`. Inside the brackets `\]` and `\\` are escapes.
fn lex_input(chars: &[char], pos: &mut usize) -> Result<Token, ExpressionParseError> {
    let start = *pos;
    let mut body = String::new();
    *pos += 1;
    loop {
        let Some(&c) = chars.get(*pos) else {
            return Err(ExpressionParseError::Unterminated {
                what: "input reference",
                position: start,
            });
        };
        *pos += 1;
        match c {
            ']' => break,
            '\\' => {
                if let Some(&escaped) = chars.get(*pos) {
                    body.push(escaped);
                    *pos += 1;
                }
            }
            other => body.push(other),
        }
    }

    let rest = body
        .strip_prefix("Input:")
        .ok_or_else(|| ExpressionParseError::UnexpectedToken {
            position: start,
            found: format!("[{}]", body),
            expected: "an [Input:<name>#<id>] reference".to_string(),
        })?;
    let (name, id) = rest.rsplit_once('#').unwrap_or((rest, ""));
    Ok(Token::Input {
        name: name.to_string(),
        id: id.to_string(),
    })
}

fn lex_text(chars: &[char], pos: &mut usize) -> Result<Token, ExpressionParseError> {
    let start = *pos;
    let mut text = String::new();
    *pos += 1;
    while let Some(&c) = chars.get(*pos) {
        *pos += 1;
        match c {
            '"' => return Ok(Token::Text(text)),
            '\\' => {
                if let Some(&escaped) = chars.get(*pos) {
                    text.push(escaped);
                    *pos += 1;
                }
            }
            other => text.push(other),
        }
    }
    Err(ExpressionParseError::Unterminated {
        what: "text literal",
        position: start,
    })
}

fn lex_number(chars: &[char], pos: &mut usize) -> Result<Token, ExpressionParseError> {
    let start = *pos;
    while *pos < chars.len() && (chars[*pos].is_ascii_digit() || chars[*pos] == '.') {
        *pos += 1;
    }
    // Exponent, as produced by f64 formatting of very large or small literals.
    if matches!(chars.get(*pos), Some('e' | 'E')) {
        let mut look = *pos + 1;
        if matches!(chars.get(look), Some('+' | '-')) {
            look += 1;
        }
        if chars.get(look).is_some_and(|c| c.is_ascii_digit()) {
            *pos = look;
            while *pos < chars.len() && chars[*pos].is_ascii_digit() {
                *pos += 1;
            }
        }
    }
    let literal: String = chars[start..*pos].iter().collect();
    literal
        .parse::<f64>()
        .map(Token::Number)
        .map_err(|_| ExpressionParseError::InvalidNumber(literal))
}
