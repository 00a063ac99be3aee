//! Lexer, literal/AST types, and symbol tables for the Flow language
//! (spec components B "Lexer" and C "AST & Symbols").

pub mod ast;
mod error;
mod lexer;
mod literal;
mod number_units;
pub mod optable;
pub mod symbol;
mod token;

pub use error::LexError;
pub use lexer::Lexer;
pub use literal::{Cidr, LiteralType, LiteralValue};
pub use number_units::unit_multiplier;
pub use token::{Keyword, Operator, Token, TokenKind};
