//! Target-code generator (spec component G, spec §4.5): lowers a
//! `flow_ir::Program` into a linear instruction stream per handler, and
//! resolves native calls against a host's registry at link time.

mod compile;
mod link;
mod opcode;
mod program;

pub use compile::{compile_handler, CodeInstr, CompiledHandler};
pub use link::{link, LinkError, NativeSignature};
pub use opcode::CodeOp;
pub use program::Program;
