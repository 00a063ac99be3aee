use flow_syntax::symbol::SymbolId;

use crate::ids::{BlockId, ValueId};
use crate::opcode::Opcode;

/// One instruction: an opcode plus the value operands it consumes. Operand
/// *kinds* that are fixed per opcode (which constant pool, which variable)
/// live inside the `Opcode` itself (spec §3 IR invariant: "every
/// instruction's operand kinds match its opcode's signature"); `operands`
/// holds only the variable SSA-value operands (e.g. the two sides of an
/// `NAdd`, or the single value stored by a `Store`).
#[derive(Debug, Clone)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub opcode: Opcode,
    pub operands: Vec<ValueId>,
}

impl Instruction {
    pub fn new(result: Option<ValueId>, opcode: Opcode, operands: Vec<ValueId>) -> Self {
        Self { result, opcode, operands }
    }
}

/// A basic block's terminator (spec §3 IR invariant: "every block has
/// exactly one terminator"). `ReturnCall` models the special `return(status,
/// override)` builtin handler call, which spec §4.4's final patch pass
/// guarantees every `main` path ends in (spec §4.6): it never returns
/// control to its block, so it is a terminator rather than a regular
/// `InvokeHandler` instruction followed by `Return`.
#[derive(Debug, Clone, Copy)]
pub enum Terminator {
    Branch(BlockId),
    CondBranch { cond: ValueId, then_block: BlockId, else_block: BlockId },
    Return(ValueId),
    ReturnCall { status: ValueId, override_status: ValueId },
}

/// One node in a handler's CFG. Instructions execute in order; the
/// terminator decides successor control flow.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn is_terminated(&self) -> bool {
        self.terminator.is_some()
    }

    /// The blocks this block can transfer control to directly, for
    /// reachability analysis (spec §4.4 "unused-block elimination").
    pub fn successors(&self) -> Vec<BlockId> {
        match self.terminator {
            Some(Terminator::Branch(b)) => vec![b],
            Some(Terminator::CondBranch { then_block, else_block, .. }) => vec![then_block, else_block],
            Some(Terminator::Return(_)) | Some(Terminator::ReturnCall { .. }) | None => Vec::new(),
        }
    }
}

/// One compiled handler: a CFG of basic blocks, block 0 always the entry
/// (spec §3: "Block 0 is always the handler's entry block" per the crate's
/// own convention carried from `ids::BlockId`'s doc comment).
#[derive(Debug, Clone)]
pub struct Handler {
    pub name: String,
    pub symbol: SymbolId,
    pub blocks: Vec<BasicBlock>,
    next_value: u32,
}

impl Handler {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn new(name: impl Into<String>, symbol: SymbolId) -> Self {
        Self { name: name.into(), symbol, blocks: vec![BasicBlock::default()], next_value: 0 }
    }

    pub fn alloc_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::default());
        id
    }

    pub fn alloc_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn push(&mut self, block: BlockId, instr: Instruction) {
        self.block_mut(block).instructions.push(instr);
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        debug_assert!(!self.block(block).is_terminated(), "block already terminated");
        self.block_mut(block).terminator = Some(terminator);
    }

    /// Blocks reachable from the entry block, in discovery order (spec §4.4
    /// mandatory pass uses this set to drop everything else).
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut seen = vec![false; self.blocks.len()];
        let mut order = Vec::new();
        let mut stack = vec![Self::ENTRY];
        seen[Self::ENTRY.0 as usize] = true;
        while let Some(id) = stack.pop() {
            order.push(id);
            for succ in self.block(id).successors() {
                if !seen[succ.0 as usize] {
                    seen[succ.0 as usize] = true;
                    stack.push(succ);
                }
            }
        }
        order
    }
}
