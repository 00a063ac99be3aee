//! Per-request state for `x0d` (spec component J "Request Context") and the
//! concrete `return(status, override)` policy that plugs into
//! [`flow_runtime::Runner`] (spec §4.6 "Internal redirects").
//!
//! A host builds one [`Context`] per accepted HTTP request, alongside one
//! `flow_runtime::Runner` built from the server's `LinkedProgram<Context>`,
//! and drives `runner.run_main(&mut context)` until the response completes.

mod context;
mod physical_file;
mod request;
mod response;
mod return_builtin;

pub use context::Context;
pub use physical_file::PhysicalFile;
pub use request::RequestView;
pub use response::ResponseWriter;
pub use return_builtin::X0ReturnBuiltin;
