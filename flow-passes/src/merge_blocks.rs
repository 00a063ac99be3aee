use flow_ir::{BlockId, Handler, Terminator};

use crate::pass::Pass;

/// Folds a block into its sole successor when that successor has no other
/// predecessor (spec §4.4 "Optional at level >=1: merge-adjacent-blocks").
/// The folded-away block is left empty and unterminated; it's no longer
/// reachable, so [`crate::unused_block::UnusedBlockElimination`] (which
/// [`crate::PassManager`] always reruns after this one) removes it.
pub struct MergeAdjacentBlocks;

impl Pass for MergeAdjacentBlocks {
    fn name(&self) -> &'static str {
        "merge-adjacent-blocks"
    }

    fn run(&self, handler: &mut Handler) -> bool {
        let mut changed = false;
        loop {
            let mut pred_count = vec![0u32; handler.blocks.len()];
            for block in &handler.blocks {
                for succ in block.successors() {
                    pred_count[succ.0 as usize] += 1;
                }
            }

            let mut merged_this_round = false;
            for idx in 0..handler.blocks.len() {
                let block_id = BlockId(idx as u32);
                let target = match handler.block(block_id).terminator {
                    Some(Terminator::Branch(target)) if target != block_id => Some(target),
                    _ => None,
                };
                let Some(target) = target else { continue };
                if pred_count[target.0 as usize] != 1 {
                    continue;
                }

                let mut tail_instructions = handler.block(target).instructions.clone();
                let tail_terminator = handler.block(target).terminator;
                handler.block_mut(block_id).instructions.append(&mut tail_instructions);
                handler.block_mut(block_id).terminator = tail_terminator;
                handler.block_mut(target).instructions.clear();
                handler.block_mut(target).terminator = None;

                merged_this_round = true;
                changed = true;
            }
            if !merged_this_round {
                break;
            }
        }
        changed
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
    fn collapses_the_single_branch_arm_into_its_join_block() {
        // the `then` arm's tail block (the `echo` short-circuit's
        // `continue` block) has exactly one predecessor and ends in a
        // plain Branch to `join`, so it folds into `join`.
        let mut program = build(r#"handler main { if (1 == 1) { echo "a"; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        let reachable_before = main.reachable_blocks().len();

        let changed = MergeAdjacentBlocks.run(main);

        assert!(changed);
        assert!(main.reachable_blocks().len() < reachable_before);
    }

    #[test]
    fn branch_to_a_block_with_two_predecessors_is_left_alone() {
        let mut program = build(r#"handler main { if (1 == 1) { echo "a"; } else { echo "b"; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        // the join block after an if/else has two predecessors by
        // construction, so merging must not fire on it.
        assert!(!MergeAdjacentBlocks.run(main));
    }
}
