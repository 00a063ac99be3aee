use std::collections::{HashMap, HashSet};

use flow_ir::{Handler, Opcode, Terminator, ValueId, VarSlot};

use crate::pass::Pass;

/// Local instruction-level cleanup within each handler (spec §4.4 "Optional
/// at level >=1: instruction elimination — constant-folding, algebraic
/// identities, dead store/load removal, redundant compare removal").
///
/// Three sub-passes run in sequence, each block-local in its *discovery*
/// (no phi-nodes, no dominance analysis) but handler-wide in its *rewrite*:
/// a `ValueId` is a register that can be read from any block in the
/// handler, so eliminating the instruction that produced one means every
/// reference to it anywhere in the handler must be repointed, not just the
/// ones in the block where the duplicate was found.
///
/// Arithmetic and string constant folding are left to `flow-runtime`: this
/// pass only has `&mut Handler`, not the program's constant pool, so it can
/// fold Boolean algebra (whose operands are self-contained `LoadBool`
/// opcodes) but not Number/String constants, which would need to mint new
/// pool entries.
pub struct InstructionElimination;

impl Pass for InstructionElimination {
    fn name(&self) -> &'static str {
        "instruction-elimination"
    }

    fn run(&self, handler: &mut Handler) -> bool {
        let mut changed = fold_booleans(handler);

        let mut replace = HashMap::new();
        if eliminate_redundant(handler, &mut replace) {
            changed = true;
        }
        if forward_stores(handler, &mut replace) {
            changed = true;
        }
        if !replace.is_empty() {
            apply_replacements(handler, &replace);
        }
        changed
    }
}

/// Folds Boolean operators whose operands are known `LoadBool` constants
/// within the same block, rewriting the instruction into the equivalent
/// `LoadBool` in place (the result `ValueId` is kept stable, so no use
/// needs rewriting).
fn fold_booleans(handler: &mut Handler) -> bool {
    let mut changed = false;
    for block in handler.blocks.iter_mut() {
        let mut known: HashMap<ValueId, bool> = HashMap::new();
        for instr in block.instructions.iter_mut() {
            if let Opcode::LoadBool(v) = instr.opcode {
                if let Some(result) = instr.result {
                    known.insert(result, v);
                }
                continue;
            }

            let lhs = instr.operands.first().and_then(|v| known.get(v)).copied();
            let rhs = instr.operands.get(1).and_then(|v| known.get(v)).copied();
            let folded = match (instr.opcode, lhs, rhs) {
                (Opcode::BAnd, Some(a), Some(b)) => Some(a && b),
                (Opcode::BOr, Some(a), Some(b)) => Some(a || b),
                (Opcode::BXor, Some(a), Some(b)) => Some(a ^ b),
                (Opcode::BCmpEq, Some(a), Some(b)) => Some(a == b),
                (Opcode::BCmpNe, Some(a), Some(b)) => Some(a != b),
                (Opcode::BNot, Some(a), _) => Some(!a),
                _ => None,
            };

            if let Some(v) = folded {
                instr.opcode = Opcode::LoadBool(v);
                instr.operands.clear();
                if let Some(result) = instr.result {
                    known.insert(result, v);
                }
                changed = true;
            } else if let Some(result) = instr.result {
                known.remove(&result);
            }
        }
    }
    changed
}

/// True for opcodes whose result depends only on their operands, never on
/// mutable state or side effects — safe to deduplicate.
fn is_pure(opcode: &Opcode) -> bool {
    !matches!(opcode, Opcode::Load(_) | Opcode::Store(_) | Opcode::CallFunction(_) | Opcode::InvokeHandler(_) | Opcode::CallHandler(_))
}

/// Removes a pure instruction that recomputes the exact (opcode, operands)
/// pair an earlier instruction in the same block already produced,
/// recording `result -> first_result` so every use of the duplicate,
/// anywhere in the handler, can be repointed to the original.
fn eliminate_redundant(handler: &mut Handler, replace: &mut HashMap<ValueId, ValueId>) -> bool {
    let mut changed = false;
    for block in handler.blocks.iter_mut() {
        let mut seen: Vec<(Opcode, Vec<ValueId>, ValueId)> = Vec::new();
        let mut dead = HashSet::new();
        for (idx, instr) in block.instructions.iter().enumerate() {
            if !is_pure(&instr.opcode) {
                continue;
            }
            let Some(result) = instr.result else { continue };
            match seen.iter().find(|(op, ops, _)| *op == instr.opcode && *ops == instr.operands) {
                Some((_, _, first_result)) => {
                    replace.insert(result, *first_result);
                    dead.insert(idx);
                }
                None => seen.push((instr.opcode, instr.operands.clone(), result)),
            }
        }
        if !dead.is_empty() {
            let mut i = 0;
            block.instructions.retain(|_| {
                let keep = !dead.contains(&i);
                i += 1;
                keep
            });
            changed = true;
        }
    }
    changed
}

/// Store-to-load forwarding and dead consecutive-store elimination, one
/// block at a time. Forwarding state resets at every block boundary: a
/// `Load` is only folded away when a prior `Store` to the same slot is
/// visible earlier in the *same* block, which is always correct (never
/// assumes a cross-block value without re-deriving it) even though it
/// misses some cross-block opportunities.
fn forward_stores(handler: &mut Handler, replace: &mut HashMap<ValueId, ValueId>) -> bool {
    let mut changed = false;
    for block in handler.blocks.iter_mut() {
        let mut forward: HashMap<VarSlot, ValueId> = HashMap::new();
        let mut last_store_idx: HashMap<VarSlot, usize> = HashMap::new();
        let mut dead = HashSet::new();

        for (idx, instr) in block.instructions.iter().enumerate() {
            match instr.opcode {
                Opcode::Load(slot) => {
                    if let Some(&value) = forward.get(&slot) {
                        if let Some(result) = instr.result {
                            replace.insert(result, value);
                        }
                        dead.insert(idx);
                    }
                    // A load consumes the pending store: the store it read
                    // is no longer a dead write even if another store to
                    // the same slot follows.
                    last_store_idx.remove(&slot);
                }
                Opcode::Store(slot) => {
                    if let Some(prev_idx) = last_store_idx.get(&slot) {
                        dead.insert(*prev_idx);
                    }
                    let value = instr.operands[0];
                    forward.insert(slot, value);
                    last_store_idx.insert(slot, idx);
                }
                Opcode::CallFunction(_) | Opcode::InvokeHandler(_) | Opcode::CallHandler(_) => {
                    // Calls may read/write `VarSlot::Global` slots opaquely.
                    forward.clear();
                    last_store_idx.clear();
                }
                _ => {}
            }
        }

        if !dead.is_empty() {
            let mut i = 0;
            block.instructions.retain(|_| {
                let keep = !dead.contains(&i);
                i += 1;
                keep
            });
            changed = true;
        }
    }
    changed
}

fn resolve(mut id: ValueId, replace: &HashMap<ValueId, ValueId>) -> ValueId {
    let mut seen = HashSet::new();
    while let Some(&next) = replace.get(&id) {
        if !seen.insert(id) {
            break;
        }
        id = next;
    }
    id
}

fn apply_replacements(handler: &mut Handler, replace: &HashMap<ValueId, ValueId>) {
    for block in handler.blocks.iter_mut() {
        for instr in block.instructions.iter_mut() {
            for operand in instr.operands.iter_mut() {
                *operand = resolve(*operand, replace);
            }
        }
        match &mut block.terminator {
            Some(Terminator::CondBranch { cond, .. }) => *cond = resolve(*cond, replace),
            Some(Terminator::Return(v)) => *v = resolve(*v, replace),
            Some(Terminator::ReturnCall { status, override_status }) => {
                *status = resolve(*status, replace);
                *override_status = resolve(*override_status, replace);
            }
            Some(Terminator::Branch(_)) | None => {}
        }
    }
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
    fn folds_constant_boolean_and() {
        let mut program = build(r#"handler main { if (1 == 1) { echo "a"; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        // `1 == 1` lowers to an NCmpZero over a folded subtraction, not a
        // Boolean op directly, so graft a literal BAnd of two LoadBools to
        // exercise the fold in isolation.
        let a = main.alloc_value();
        let b = main.alloc_value();
        let r = main.alloc_value();
        main.block_mut(Handler::ENTRY).instructions.insert(0, flow_ir::Instruction::new(Some(a), Opcode::LoadBool(true), vec![]));
        main.block_mut(Handler::ENTRY).instructions.insert(1, flow_ir::Instruction::new(Some(b), Opcode::LoadBool(false), vec![]));
        main.block_mut(Handler::ENTRY).instructions.insert(2, flow_ir::Instruction::new(Some(r), Opcode::BAnd, vec![a, b]));

        assert!(fold_booleans(main));
        let folded = main.block(Handler::ENTRY).instructions[2].opcode;
        assert!(matches!(folded, Opcode::LoadBool(false)));
    }

    #[test]
    fn duplicate_pure_instruction_is_deduped_and_uses_rewritten() {
        let mut program = build(r#"handler main { var x = 1 + 1; var y = 1 + 1; };"#);
        let main = program.find_handler_mut("main").unwrap();
        let before = main.block(Handler::ENTRY).instructions.len();

        let mut replace = HashMap::new();
        let changed = eliminate_redundant(main, &mut replace);

        assert!(changed);
        assert!(!replace.is_empty());
        assert!(main.block(Handler::ENTRY).instructions.len() < before);
    }

    #[test]
    fn store_immediately_followed_by_load_forwards_without_reload() {
        let mut program = build(r#"handler main { var x = 1; var y = x; };"#);
        let main = program.find_handler_mut("main").unwrap();

        let mut replace = HashMap::new();
        let changed = forward_stores(main, &mut replace);

        assert!(changed);
        let remaining_loads = main.block(Handler::ENTRY).instructions.iter().filter(|i| matches!(i.opcode, Opcode::Load(_))).count();
        assert_eq!(remaining_loads, 0);
    }

    #[test]
    fn store_read_then_overwritten_keeps_the_first_store() {
        let mut program = build(r#"handler main { var x = 1; var y = x; x = 2; };"#);
        let main = program.find_handler_mut("main").unwrap();
        let stores_before = main.block(Handler::ENTRY).instructions.iter().filter(|i| matches!(i.opcode, Opcode::Store(_))).count();

        let mut replace = HashMap::new();
        forward_stores(main, &mut replace);

        let stores_after = main.block(Handler::ENTRY).instructions.iter().filter(|i| matches!(i.opcode, Opcode::Store(_))).count();
        // the read of `x` between the two stores means neither store is dead.
        assert_eq!(stores_after, stores_before);
    }
}
