use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use flow_codegen::Program;
use flow_ir::ValueId;
use flow_syntax::symbol::SymbolId;

use crate::registry::{NativeFunction, NativeHandler, ResolvedRegistry, ReturnBuiltin};

/// Errors from [`LinkedProgram::link`]: either `flow_codegen::link`'s own
/// failures, or a regex constant whose source text doesn't compile (the
/// lexer accepts any `/…/` body; only at link time do we know it will ever
/// actually be evaluated).
#[derive(Debug, Clone)]
pub enum LinkError {
    Codegen(flow_codegen::LinkError),
    InvalidRegex { pattern: String, message: String },
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Codegen(e) => write!(f, "{e}"),
            LinkError::InvalidRegex { pattern, message } => write!(f, "invalid regex /{pattern}/: {message}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// A [`Program`] plus everything resolved at link time: per-handler
/// register-file sizes, precompiled regex constants, and the native-call
/// dispatch tables (spec §4.5 "Program (linked)": "a resolved native-call
/// table").
pub struct LinkedProgram<C> {
    pub program: Program,
    pub(crate) register_counts: Vec<u32>,
    pub(crate) regexes: Vec<Rc<regex::Regex>>,
    pub(crate) functions: HashMap<SymbolId, Arc<dyn NativeFunction<C>>>,
    pub(crate) handlers: HashMap<SymbolId, Arc<dyn NativeHandler<C>>>,
    pub(crate) return_builtin: Arc<dyn ReturnBuiltin<C>>,
}

impl<C> LinkedProgram<C> {
    pub fn link(program: Program, resolved: &ResolvedRegistry<C>, return_builtin: Arc<dyn ReturnBuiltin<C>>, allow_experimental: bool) -> Result<Self, Vec<LinkError>> {
        flow_codegen::link(&program, &resolved.signatures, allow_experimental).map_err(|errs| errs.into_iter().map(LinkError::Codegen).collect::<Vec<_>>())?;

        let mut regex_errors = Vec::new();
        let regexes = program
            .constants
            .regexes()
            .iter()
            .filter_map(|pattern| match regex::Regex::new(pattern) {
                Ok(r) => Some(Rc::new(r)),
                Err(e) => {
                    regex_errors.push(LinkError::InvalidRegex { pattern: pattern.clone(), message: e.to_string() });
                    None
                }
            })
            .collect();
        if !regex_errors.is_empty() {
            return Err(regex_errors);
        }

        let register_counts = program.handlers.iter().map(register_count).collect();

        Ok(Self {
            program,
            register_counts,
            regexes,
            functions: resolved.functions.clone(),
            handlers: resolved.handlers.clone(),
            return_builtin,
        })
    }

    pub fn find_handler_index(&self, name: &str) -> Option<usize> {
        self.program.handlers.iter().position(|h| h.name == name)
    }

    pub fn find_handler_index_by_symbol(&self, symbol: SymbolId) -> Option<usize> {
        self.program.handlers.iter().position(|h| h.symbol == symbol)
    }
}

// `Arc<dyn NativeFunction<C>>`/`Arc<dyn NativeHandler<C>>` are individually
// `Clone`; `HashMap::clone` needs the value type to be `Clone`, which it is.
impl<C> Clone for LinkedProgram<C> {
    fn clone(&self) -> Self {
        Self {
            program: self.program.clone(),
            register_counts: self.register_counts.clone(),
            regexes: self.regexes.clone(),
            functions: self.functions.clone(),
            handlers: self.handlers.clone(),
            return_builtin: self.return_builtin.clone(),
        }
    }
}

/// Highest `ValueId` result/operand referenced anywhere in `handler`'s code,
/// plus one — the number of registers a call frame needs. `flow_codegen`
/// doesn't carry this itself (register allocation was never more than
/// "every SSA value gets its own slot"), so it's derived once, here, at
/// link time rather than on every call.
fn register_count(handler: &flow_codegen::CompiledHandler) -> u32 {
    let mut max = 0i64;
    for instr in &handler.code {
        if let Some(ValueId(id)) = instr.result {
            max = max.max(id as i64 + 1);
        }
        for ValueId(id) in &instr.operands {
            max = max.max(*id as i64 + 1);
        }
    }
    max.max(0) as u32
}
