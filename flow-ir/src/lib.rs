//! Three-address intermediate representation for Flow handlers, and the
//! builder that lowers a type-checked `flow_syntax::ast::Unit` into it (spec
//! component E "IR & Builder").

mod builder;
mod constant;
mod error;
mod handler;
mod ids;
mod opcode;
mod program;

pub use builder::Builder;
pub use constant::{ConstRef, ConstantPool};
pub use error::BuildError;
pub use handler::{BasicBlock, Handler, Instruction, Terminator};
pub use ids::{BlockId, ValueId, VarSlot};
pub use opcode::{Opcode, Relation};
pub use program::Program;
