use flow_ir::Handler;

/// One canonicalization/optimization pass over a single handler's CFG (spec
/// §4.4 "Pass manager"). Passes never see the `Program`'s constant pool or
/// other handlers: each one only rewrites the blocks/instructions/
/// terminators of the handler it's given.
pub trait Pass {
    /// Name used in `tracing` diagnostics and by tests.
    fn name(&self) -> &'static str;

    /// Apply the pass to `handler` in place. Returns `true` if anything
    /// changed, so [`crate::PassManager`] knows whether another fixed-point
    /// round is worth running.
    fn run(&self, handler: &mut Handler) -> bool;
}
