//! Executes a linked [`Program`](flow_codegen::Program) (spec component H
//! "Runtime (Runner)" and component I "Native Builtin Registry").
//!
//! A host embeds this crate by: building a [`HostRegistry`] of its native
//! builtins, handing `registry.prelude()` to `flow_parser::Parser` before
//! parsing, resolving the registry against the parsed `Unit`
//! (`HostRegistry::resolve`), linking the compiled `Program` into a
//! [`LinkedProgram`], and finally driving one [`Runner`] per request.

mod error;
mod linked;
mod params;
mod registry;
mod runner;
mod value;

pub use error::RuntimeError;
pub use linked::{LinkError, LinkedProgram};
pub use params::Params;
pub use registry::{HostRegistry, NativeFunction, NativeHandler, ResolvedRegistry, ReturnBuiltin, ReturnOutcome, Verifier, VerifierArgs};
pub use runner::{Runner, RunnerState};
pub use value::Value;
