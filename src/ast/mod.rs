pub mod expression;
mod lexer;
pub mod parser;
pub mod trace;
pub mod value;

pub use expression::*;
pub use parser::parse_expression;
pub use trace::*;
pub use value::*;
