//! The concrete context type `x0d`'s [`flow_runtime::Runner`] is driven
//! with. Wraps [`x0_context::Context`] (component J, request-scoped state)
//! together with a handle onto the [`ServerConfig`] setup builtins write
//! into (spec §1 "a 'setup' handler runs once at boot to materialize
//! server state") — `x0_context::Context` can't carry that field itself
//! since `ServerConfig` is an `x0d`-level accumulator, not part of
//! component J's own spec-defined fields.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use flow_runtime::{ReturnBuiltin, ReturnOutcome, RuntimeError};
use x0_context::{Context, X0ReturnBuiltin};

use crate::server_config::ServerConfig;

/// One request's (or one `setup` replay's) worth of state threaded through
/// the `Runner` as its `C` type parameter.
pub struct HostContext {
    pub ctx: Context,
    /// Shared with every other `HostContext` built on the same worker
    /// (`Rc::clone`, not a deep copy) so setup builtins replayed on a
    /// worker and the requests that worker later serves see the same
    /// accumulator.
    pub config: Rc<RefCell<ServerConfig>>,
}

impl HostContext {
    pub fn new(ctx: Context, config: Rc<RefCell<ServerConfig>>) -> Self {
        Self { ctx, config }
    }
}

/// Adapts `x0_context::X0ReturnBuiltin` (which implements
/// `ReturnBuiltin<x0_context::Context>`) to `ReturnBuiltin<HostContext>` by
/// delegating into the wrapped field — `flow_runtime::Runner<C>` only ever
/// sees one `C`, and that has to be `HostContext`, not the bare
/// `x0_context::Context`, once setup-only builtins need a place to write.
#[derive(Default)]
pub struct HostReturnBuiltin(X0ReturnBuiltin);

impl HostReturnBuiltin {
    pub fn new() -> Self {
        Self(X0ReturnBuiltin::new())
    }
}

#[async_trait(?Send)]
impl ReturnBuiltin<HostContext> for HostReturnBuiltin {
    async fn finish(&self, status: i64, override_status: i64, ctx: &mut HostContext) -> Result<ReturnOutcome, RuntimeError> {
        self.0.finish(status, override_status, &mut ctx.ctx).await
    }
}
