use std::collections::{HashMap, HashSet};

use flow_ir::{BlockId, Handler, Terminator};

use crate::pass::Pass;

/// Redirects every branch that targets an empty block (no instructions,
/// terminator `Branch(next)`) straight to `next` instead (spec §4.4
/// "Optional at level >=1: empty-block elimination"). The empty block
/// itself is left in place, unterminated-if-unreferenced, for
/// [`crate::unused_block::UnusedBlockElimination`] to drop.
pub struct EmptyBlockElimination;

impl Pass for EmptyBlockElimination {
    fn name(&self) -> &'static str {
        "empty-block-elimination"
    }

    fn run(&self, handler: &mut Handler) -> bool {
        let mut redirect: HashMap<BlockId, BlockId> = HashMap::new();
        for (idx, block) in handler.blocks.iter().enumerate() {
            let id = BlockId(idx as u32);
            if id == Handler::ENTRY || !block.instructions.is_empty() {
                continue;
            }
            if let Some(Terminator::Branch(target)) = block.terminator {
                if target != id {
                    redirect.insert(id, target);
                }
            }
        }
        if redirect.is_empty() {
            return false;
        }

        let mut changed = false;
        for block in handler.blocks.iter_mut() {
            let Some(term) = &mut block.terminator else { continue };
            match term {
                Terminator::Branch(target) => {
                    let resolved = resolve(*target, &redirect);
                    if resolved != *target {
                        *target = resolved;
                        changed = true;
                    }
                }
                Terminator::CondBranch { then_block, else_block, .. } => {
                    let rt = resolve(*then_block, &redirect);
                    let re = resolve(*else_block, &redirect);
                    if rt != *then_block {
                        *then_block = rt;
                        changed = true;
                    }
                    if re != *else_block {
                        *else_block = re;
                        changed = true;
                    }
                }
                Terminator::Return(_) | Terminator::ReturnCall { .. } => {}
            }
        }
        changed
    }
}

/// Follows a chain of empty-block redirects to its final target, guarding
/// against a cycle of nothing-but-empty-blocks (which would otherwise loop
/// forever; such a handler can never terminate anyway).
fn resolve(mut id: BlockId, redirect: &HashMap<BlockId, BlockId>) -> BlockId {
    let mut seen = HashSet::new();
    while let Some(&next) = redirect.get(&id) {
        if !seen.insert(id) {
            break;
        }
        id = next;
    }
    id
}

#[cfg(test)]
mod tests {
    use flow_diagnostics::SourceMap;
    use flow_ir::Builder;
    use flow_parser::Parser;
    use flow_syntax::ast::Unit;

    use super::*;

    fn build(src: &str) -> flow_ir::Program {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::new(map, id).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        Builder::new(unit).build().unwrap()
    }

    #[test]
    fn redirects_condbranch_arm_past_an_empty_else_block() {
        // the `else` arm of an `if` with no else-branch is an empty block
        // that just branches straight to `join`.
        let mut program = build(r#"handler main { if (1 == 1) { var x = 1; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        let original_else = match main.block(Handler::ENTRY).terminator.unwrap() {
            Terminator::CondBranch { else_block, .. } => else_block,
            other => panic!("expected CondBranch, got {other:?}"),
        };

        let changed = EmptyBlockElimination.run(main);

        assert!(changed);
        match main.block(Handler::ENTRY).terminator.unwrap() {
            Terminator::CondBranch { else_block, .. } => assert_ne!(else_block, original_else),
            other => panic!("expected CondBranch, got {other:?}"),
        }
    }

    #[test]
    fn handler_with_no_empty_blocks_is_unchanged() {
        let mut program = build(r#"handler main { var x = 1; };"#);
        let main = program.find_handler_mut("main").unwrap();
        assert!(!EmptyBlockElimination.run(main));
    }
}
