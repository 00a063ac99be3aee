/// A fresh value produced by one instruction within a single handler. IDs
/// are handler-local (not global to the program), mirroring the
/// per-function numbering of a classic three-address IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// A basic block within a handler's CFG. Block 0 is always the handler's
/// entry block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

/// Where a `Load`/`Store` opcode's variable lives (spec §3 "Symbols":
/// global scope vs. one local scope per handler). Resolved once at IR-build
/// time from the symbol's declaring scope, so the runtime never has to walk
/// a scope chain per access: a request-scoped `Runner` owns `Local` slots,
/// while `Global` slots are materialized once by running `setup` and shared
/// read-only across every subsequent `main` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarSlot {
    Global(flow_syntax::symbol::SymbolId),
    Local(flow_syntax::symbol::SymbolId),
}

impl VarSlot {
    pub fn symbol(self) -> flow_syntax::symbol::SymbolId {
        match self {
            VarSlot::Global(s) | VarSlot::Local(s) => s,
        }
    }
}
