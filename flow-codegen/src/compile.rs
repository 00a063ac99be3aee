use flow_ir::{Handler, Terminator, ValueId};
use flow_syntax::symbol::SymbolId;

use crate::opcode::CodeOp;

/// One linearized instruction: the same (result, opcode-like, operands)
/// shape `flow_ir::Instruction` uses, generalized to also cover the jump
/// terminators `CodeOp` adds.
#[derive(Debug, Clone)]
pub struct CodeInstr {
    pub result: Option<ValueId>,
    pub op: CodeOp,
    pub operands: Vec<ValueId>,
}

/// One handler compiled to a flat instruction stream (spec §4.5's
/// "Program" per-handler unit).
#[derive(Debug, Clone)]
pub struct CompiledHandler {
    pub name: String,
    pub symbol: SymbolId,
    pub code: Vec<CodeInstr>,
}

/// Flattens one `flow_ir::Handler`'s basic blocks into a single instruction
/// stream, in block order, replacing each terminator with explicit jumps:
/// - `Branch(b)` becomes one `Jump` to `b`'s first instruction.
/// - `CondBranch` becomes a `JumpIfFalse` to the else arm immediately
///   followed by an unconditional `Jump` to the then arm — never relying on
///   block layout order for fallthrough, so later reordering passes over
///   the linear stream (none exist yet, but `flow-runtime`'s dispatch loop
///   assumes this) can't silently break control flow.
/// - `Return`/`ReturnCall` become `Ret`/`RetCall`, unchanged in meaning.
///
/// An unterminated block (only possible if something bypassed
/// `flow_ir::Builder`) contributes no terminator instruction; the dispatch
/// loop falling off the end of such a stream is a `flow-runtime` bug to
/// catch at link time, not something codegen can detect without the whole
/// program.
pub fn compile_handler(handler: &Handler) -> CompiledHandler {
    let slot_count = |terminator: &Option<Terminator>| -> u32 {
        match terminator {
            Some(Terminator::CondBranch { .. }) => 2,
            Some(Terminator::Branch(_)) | Some(Terminator::Return(_)) | Some(Terminator::ReturnCall { .. }) => 1,
            None => 0,
        }
    };

    let mut offsets = vec![0u32; handler.blocks.len()];
    let mut cursor = 0u32;
    for (idx, block) in handler.blocks.iter().enumerate() {
        offsets[idx] = cursor;
        cursor += block.instructions.len() as u32;
        cursor += slot_count(&block.terminator);
    }

    let mut code = Vec::with_capacity(cursor as usize);
    for block in &handler.blocks {
        for instr in &block.instructions {
            code.push(CodeInstr { result: instr.result, op: CodeOp::Instr(instr.opcode), operands: instr.operands.clone() });
        }
        match block.terminator {
            Some(Terminator::Branch(target)) => {
                code.push(CodeInstr { result: None, op: CodeOp::Jump(offsets[target.0 as usize]), operands: vec![] });
            }
            Some(Terminator::CondBranch { cond, then_block, else_block }) => {
                code.push(CodeInstr { result: None, op: CodeOp::JumpIfFalse(offsets[else_block.0 as usize]), operands: vec![cond] });
                code.push(CodeInstr { result: None, op: CodeOp::Jump(offsets[then_block.0 as usize]), operands: vec![] });
            }
            Some(Terminator::Return(v)) => {
                code.push(CodeInstr { result: None, op: CodeOp::Ret, operands: vec![v] });
            }
            Some(Terminator::ReturnCall { status, override_status }) => {
                code.push(CodeInstr { result: None, op: CodeOp::RetCall, operands: vec![status, override_status] });
            }
            None => {}
        }
    }

    CompiledHandler { name: handler.name.clone(), symbol: handler.symbol, code }
}

#[cfg(test)]
mod tests {
    use flow_diagnostics::SourceMap;
    use flow_ir::Builder;
    use flow_parser::{Parser, Prelude};
    use flow_syntax::ast::Unit;
    use flow_syntax::symbol::{BuiltinSignature, Param, SymbolKind};
    use flow_syntax::LiteralType;

    use super::*;

    fn echo_prelude() -> Prelude {
        vec![(
            "echo".to_string(),
            SymbolKind::BuiltinHandler { candidates: vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }] },
        )]
    }

    fn build(src: &str) -> flow_ir::Program {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::with_prelude(map, id, echo_prelude()).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        Builder::new(unit).build().unwrap()
    }

    #[test]
    fn cond_branch_lowers_to_jumpiffalse_then_jump_pair() {
        let program = build(r#"handler main { if (1 == 1) { echo "a"; } else { echo "b"; } };"#);
        let main = program.find_handler("main").unwrap();
        let compiled = compile_handler(main);
        let first_jump = compiled.code.iter().position(|i| matches!(i.op, CodeOp::JumpIfFalse(_))).unwrap();
        assert!(matches!(compiled.code[first_jump + 1].op, CodeOp::Jump(_)));
    }

    #[test]
    fn every_jump_target_is_in_bounds() {
        let program = build(r#"handler main { match "GET" { "GET", "HEAD": echo "a"; else: echo "b"; } };"#);
        let main = program.find_handler("main").unwrap();
        let compiled = compile_handler(main);
        for instr in &compiled.code {
            match instr.op {
                CodeOp::Jump(target) | CodeOp::JumpIfFalse(target) => assert!((target as usize) < compiled.code.len()),
                _ => {}
            }
        }
    }

    #[test]
    fn handler_call_short_circuit_still_has_a_ret_for_the_done_path() {
        let program = build(r#"handler main { echo "hi"; };"#);
        let main = program.find_handler("main").unwrap();
        let compiled = compile_handler(main);
        assert!(compiled.code.iter().any(|i| matches!(i.op, CodeOp::Ret)));
    }
}
