use flow_ir::ConstantPool;
use flow_syntax::symbol::SymbolId;

use crate::compile::{compile_handler, CompiledHandler};
use crate::opcode::CodeOp;

/// A fully target-code-generated unit (spec §4.5 "Program"): the same
/// deduplicated constant pools `flow_ir::Program` built, plus every
/// handler flattened to a linear instruction stream.
#[derive(Debug, Clone)]
pub struct Program {
    pub constants: ConstantPool,
    pub globals: Vec<SymbolId>,
    pub handlers: Vec<CompiledHandler>,
}

impl Program {
    pub fn compile(ir: flow_ir::Program) -> Self {
        let handlers = ir.handlers.iter().map(compile_handler).collect();
        Self { constants: ir.constants, globals: ir.globals, handlers }
    }

    pub fn find_handler(&self, name: &str) -> Option<&CompiledHandler> {
        self.handlers.iter().find(|h| h.name == name)
    }

    pub fn find_handler_by_symbol(&self, symbol: SymbolId) -> Option<&CompiledHandler> {
        self.handlers.iter().find(|h| h.symbol == symbol)
    }

    /// Debug-only textual disassembly (spec §4.5 "dump() (debug)"),
    /// exposed behind `--dump-tc` by `x0d`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for handler in &self.handlers {
            out.push_str(&format!("handler {} ({} instructions)\n", handler.name, handler.code.len()));
            for (idx, instr) in handler.code.iter().enumerate() {
                match instr.op {
                    CodeOp::Instr(opcode) => {
                        out.push_str(&format!("  {idx:04}: {:?} <- {opcode:?} {:?}\n", instr.result, instr.operands));
                    }
                    CodeOp::Jump(target) => out.push_str(&format!("  {idx:04}: jump {target}\n")),
                    CodeOp::JumpIfFalse(target) => out.push_str(&format!("  {idx:04}: jump_if_false {:?}, {target}\n", instr.operands[0])),
                    CodeOp::Ret => out.push_str(&format!("  {idx:04}: ret {:?}\n", instr.operands[0])),
                    CodeOp::RetCall => out.push_str(&format!("  {idx:04}: ret_call {:?}, {:?}\n", instr.operands[0], instr.operands[1])),
                }
            }
        }
        out
    }
}
