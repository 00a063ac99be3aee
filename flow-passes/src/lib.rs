//! Canonicalization and optimization passes over a `flow_ir::Program` (spec
//! component F "Pass manager", spec §4.4). [`PassManager`] drives the fixed
//! pipeline spec §4.4 describes: a mandatory unused-block elimination, three
//! optional passes run to a fixed point when the optimization level is at
//! least 1, and a final patch applied once to `main`.

mod empty_block;
mod instruction_elimination;
mod merge_blocks;
mod pass;
mod patch;
mod unused_block;

pub use empty_block::EmptyBlockElimination;
pub use instruction_elimination::InstructionElimination;
pub use merge_blocks::MergeAdjacentBlocks;
pub use pass::Pass;
pub use patch::patch_main_returns;
pub use unused_block::UnusedBlockElimination;

use flow_ir::{Handler, Program};

/// Runs every handler in `program` through the spec §4.4 pipeline, then
/// patches `main`'s fallthrough returns once, at the end.
#[derive(Debug, Clone, Copy)]
pub struct PassManager {
    level: u8,
}

impl PassManager {
    /// `level` is the optimization level: `0` runs only the mandatory
    /// unused-block elimination; `>=1` also runs the three optional passes
    /// to a fixed point (each round re-running unused-block elimination,
    /// since the others can strand blocks).
    pub fn new(level: u8) -> Self {
        Self { level }
    }

    pub fn run(&self, program: &mut Program) {
        for handler in &mut program.handlers {
            self.run_handler(handler);
        }
        if patch_main_returns(program) {
            tracing::debug!("patch-main-returns rewrote at least one fallthrough return in main");
        }
    }

    fn run_handler(&self, handler: &mut Handler) {
        let unused = UnusedBlockElimination;
        trace_run(handler, &unused);
        if self.level == 0 {
            return;
        }

        let merge = MergeAdjacentBlocks;
        let empty = EmptyBlockElimination;
        let instructions = InstructionElimination;
        loop {
            let mut changed = false;
            changed |= trace_run(handler, &merge);
            changed |= trace_run(handler, &empty);
            changed |= trace_run(handler, &instructions);
            changed |= trace_run(handler, &unused);
            if !changed {
                break;
            }
        }
    }
}

fn trace_run(handler: &mut Handler, pass: &dyn Pass) -> bool {
    let changed = pass.run(handler);
    if changed {
        tracing::debug!(handler = %handler.name, pass = pass.name(), "pass changed handler");
    }
    changed
}

#[cfg(test)]
mod tests {
    use flow_diagnostics::SourceMap;
    use flow_ir::{Builder, Terminator};
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
    fn level_zero_only_drops_unreachable_blocks() {
        let mut program = build(r#"handler main { if (1 == 1) { echo "a"; } else { echo "b"; } };"#);
        let main = program.find_handler_mut("main").unwrap();
        let dead = main.alloc_block();
        main.set_terminator(dead, Terminator::Return(main.alloc_value()));
        let before = main.blocks.len();

        PassManager::new(0).run(&mut program);

        let main = program.find_handler("main").unwrap();
        assert!(main.blocks.len() < before);
    }

    #[test]
    fn level_one_leaves_every_block_in_main_terminated_by_return_call() {
        let mut program = build(r#"handler main { if (1 == 1) { echo "a"; } };"#);

        PassManager::new(1).run(&mut program);

        let main = program.find_handler("main").unwrap();
        for block in &main.blocks {
            assert!(matches!(block.terminator, Some(Terminator::ReturnCall { .. }) | Some(Terminator::Branch(_)) | Some(Terminator::CondBranch { .. })));
        }
    }

    // Spec §8 scenario 6: applying the mandatory-plus-optional pass set a
    // second time changes nothing, since every pass's own loop only runs
    // until its round reports no change and `patch_main_returns` is
    // idempotent against a main whose fallthroughs are already patched.
    #[test]
    fn running_the_pass_pipeline_twice_is_a_no_op() {
        let mut program = build(
            r#"
            handler main {
                if (1 == 1) {
                    echo "a";
                } else {
                    if (2 == 2) {
                        echo "b";
                    }
                }
            };
        "#,
        );

        PassManager::new(1).run(&mut program);
        let once = format!("{:?}", program.find_handler("main").unwrap());

        PassManager::new(1).run(&mut program);
        let twice = format!("{:?}", program.find_handler("main").unwrap());

        assert_eq!(once, twice, "a second pass run must leave an already-canonical handler unchanged");
    }
}
