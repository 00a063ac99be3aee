use std::collections::HashMap;

use flow_ir::{BlockId, Handler, Terminator};

use crate::pass::Pass;

/// Drops every block unreachable from the entry block and renumbers the
/// survivors contiguously from 0 (spec §4.4 "Mandatory: unused-block
/// elimination"). Always runs first in [`crate::PassManager`], since the
/// optional passes below all assume blocks they touch are live.
pub struct UnusedBlockElimination;

impl Pass for UnusedBlockElimination {
    fn name(&self) -> &'static str {
        "unused-block-elimination"
    }

    fn run(&self, handler: &mut Handler) -> bool {
        let mut reachable = handler.reachable_blocks();
        if reachable.len() == handler.blocks.len() {
            return false;
        }
        reachable.sort_by_key(|b| b.0);

        let remap: HashMap<BlockId, BlockId> =
            reachable.iter().enumerate().map(|(new_idx, &old_id)| (old_id, BlockId(new_idx as u32))).collect();

        let mut new_blocks = Vec::with_capacity(reachable.len());
        for old_id in &reachable {
            let mut block = handler.block(*old_id).clone();
            remap_terminator(&mut block.terminator, &remap);
            new_blocks.push(block);
        }
        let removed = handler.blocks.len() - new_blocks.len();
        handler.blocks = new_blocks;
        tracing::debug!(handler = %handler.name, removed, "unused-block-elimination dropped unreachable blocks");
        true
    }
}

fn remap_terminator(terminator: &mut Option<Terminator>, remap: &HashMap<BlockId, BlockId>) {
    let Some(t) = terminator else { return };
    match t {
        Terminator::Branch(target) => *target = remap[target],
        Terminator::CondBranch { then_block, else_block, .. } => {
            *then_block = remap[then_block];
            *else_block = remap[else_block];
        }
        Terminator::Return(_) | Terminator::ReturnCall { .. } => {}
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
    fn drops_block_with_no_path_from_entry() {
        let mut program = build(r#"handler main { if (1 == 1) { var x = 1; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        // manufacture a genuinely dead block: one with no predecessor at all.
        let dead = main.alloc_block();
        main.set_terminator(dead, Terminator::Return(main.alloc_value()));
        let before = main.blocks.len();

        let changed = UnusedBlockElimination.run(main);

        assert!(changed);
        assert!(main.blocks.len() < before);
        assert!(main.blocks.iter().all(|b| b.is_terminated()));
    }

    #[test]
    fn fully_reachable_handler_is_unchanged() {
        let mut program = build(r#"handler main { echo "hi"; };"#);
        let main = program.find_handler_mut("main").unwrap();
        assert!(!UnusedBlockElimination.run(main));
    }
}
