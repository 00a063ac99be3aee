use flow_syntax::symbol::SymbolId;

use crate::constant::ConstantPool;
use crate::handler::Handler;

/// Owns every handler compiled from one `flow_syntax::ast::Unit` plus their
/// shared, deduplicated constant pools (spec §3 "Program owns constant
/// pools ... and a list of Handlers").
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub constants: ConstantPool,
    pub handlers: Vec<Handler>,
    /// Top-level `var` symbols, in declaration order, whose initializers
    /// the builder materialized into `setup`'s prologue (see
    /// `builder::Builder`, and DESIGN.md "global variable materialization").
    pub globals: Vec<SymbolId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn find_handler_mut(&mut self, name: &str) -> Option<&mut Handler> {
        self.handlers.iter_mut().find(|h| h.name == name)
    }

    pub fn is_global(&self, symbol: SymbolId) -> bool {
        self.globals.contains(&symbol)
    }
}
