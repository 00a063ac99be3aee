use flow_ir::Opcode;

/// One slot in a [`crate::CompiledHandler`]'s linear instruction stream
/// (spec §4.5 "one fixed-width opcode per instruction and operand slots
/// referring into constant pools or local value indices"). Straight-line
/// work reuses `flow_ir::Opcode` as-is — constant-pool references and
/// variable slots are already exactly the operand shape the spec
/// describes; codegen's own job is replacing CFG edges (`flow_ir`'s
/// `Terminator`, which points at other blocks) with absolute jump targets
/// into this same stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOp {
    Instr(Opcode),
    /// Unconditional jump to an absolute instruction index.
    Jump(u32),
    /// Jump to an absolute instruction index if the one `ValueId` operand
    /// is false; otherwise fall through to the next instruction (always
    /// itself another `Jump`, emitted right after — see
    /// `crate::compile::compile_handler`).
    JumpIfFalse(u32),
    /// Return the one `ValueId` operand as the handler's "handled" result.
    Ret,
    /// `return(status, override)` (spec §4.6): never falls through.
    RetCall,
}
