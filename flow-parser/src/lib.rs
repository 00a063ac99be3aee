//! Recursive-descent parser for the Flow language (spec component D): the
//! operator/cast typing tables live in `flow_syntax::optable`, builtin
//! overload resolution lives in [`resolve`], and [`parser::Parser`] ties
//! both to the grammar to produce a fully typed `flow_syntax::ast::Unit`.

mod error;
mod parser;
pub mod resolve;

pub use error::{Error, ParseError, TypeError};
pub use parser::{Parser, Prelude};
