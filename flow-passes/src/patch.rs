use flow_ir::{BlockId, Instruction, Opcode, Program, Terminator};

/// spec §4.4's final patch: after every other pass has run, any path
/// through `main` that falls off the end via a plain `Return` — rather
/// than an explicit `return(status, override)` call — is rewritten to
/// behave as `return(404, 0)`. This isn't a [`crate::Pass`]: it needs the
/// program's constant pool (to mint the 404/0 constants), not just the one
/// handler, so it's a standalone step [`crate::PassManager::run`] applies
/// once to `main` after the per-handler pipeline.
pub fn patch_main_returns(program: &mut Program) -> bool {
    let Some(main_idx) = program.handlers.iter().position(|h| h.name == "main") else {
        return false;
    };

    let targets: Vec<BlockId> = {
        let main = &program.handlers[main_idx];
        main.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| matches!(b.terminator, Some(Terminator::Return(_))))
            .map(|(idx, _)| BlockId(idx as u32))
            .collect()
    };
    if targets.is_empty() {
        return false;
    }

    let status_const = program.constants.number(404);
    let override_const = program.constants.number(0);
    let main = &mut program.handlers[main_idx];
    for block_id in targets {
        let status = main.alloc_value();
        main.push(block_id, Instruction::new(Some(status), Opcode::LoadConst(status_const), Vec::new()));
        let override_status = main.alloc_value();
        main.push(block_id, Instruction::new(Some(override_status), Opcode::LoadConst(override_const), Vec::new()));
        main.block_mut(block_id).terminator = Some(Terminator::ReturnCall { status, override_status });
    }
    true
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
    fn fallthrough_return_becomes_return_call_404() {
        let mut program = build(r#"handler main { echo "hi"; };"#);

        let changed = patch_main_returns(&mut program);

        assert!(changed);
        let main = program.find_handler("main").unwrap();
        assert!(main.blocks.iter().all(|b| !matches!(b.terminator, Some(Terminator::Return(_)))));
        assert_eq!(program.constants.get_number(0), 404);
        assert_eq!(program.constants.get_number(1), 0);
    }

    #[test]
    fn handler_with_no_main_is_untouched() {
        let mut program = build(r#"handler setup { };"#);
        assert!(!patch_main_returns(&mut program));
    }
}
