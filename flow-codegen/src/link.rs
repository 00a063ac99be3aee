use flow_ir::Opcode;
use flow_syntax::symbol::SymbolId;

use crate::opcode::CodeOp;
use crate::program::Program;

/// One native builtin the host (`flow-runtime::HostRegistry`, normally)
/// makes available to link against. Kept minimal and crate-local rather
/// than depending on `flow-runtime` directly, since `flow-runtime` depends
/// on `flow-codegen::Program` to run — a real registry is adapted into a
/// `Vec<NativeSignature>` at the call site (see `flow::compile`).
#[derive(Debug, Clone)]
pub struct NativeSignature {
    pub symbol: SymbolId,
    pub name: String,
    pub experimental: bool,
}

/// Errors `link` can report (spec §7 `LinkError`).
#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// spec §4.5: "missing `setup` is fatal at link."
    MissingSetup,
    UnresolvedNative { name: String },
    ExperimentalWithoutOptIn { name: String },
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::MissingSetup => write!(f, "program has no 'setup' handler"),
            LinkError::UnresolvedNative { name } => write!(f, "unresolved native call '{name}'"),
            LinkError::ExperimentalWithoutOptIn { name } => {
                write!(f, "'{name}' is experimental and was not opted into")
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// Resolves every native call (`CallFunction`/`InvokeHandler`) against
/// `available` and every user handler call (`CallHandler`) against the
/// program's own handler list (spec §4.5 "link(host, diagnostics)").
/// Collects every failure rather than stopping at the first, matching the
/// diagnostics-report style the rest of the pipeline uses.
pub fn link(program: &Program, available: &[NativeSignature], allow_experimental: bool) -> Result<(), Vec<LinkError>> {
    let mut errors = Vec::new();

    if program.find_handler("setup").is_none() {
        errors.push(LinkError::MissingSetup);
    }

    for handler in &program.handlers {
        for instr in &handler.code {
            let CodeOp::Instr(opcode) = instr.op else { continue };
            match opcode {
                Opcode::CallFunction(sym) | Opcode::InvokeHandler(sym) => match available.iter().find(|s| s.symbol == sym) {
                    None => errors.push(LinkError::UnresolvedNative { name: format!("{sym:?}") }),
                    Some(sig) if sig.experimental && !allow_experimental => {
                        errors.push(LinkError::ExperimentalWithoutOptIn { name: sig.name.clone() })
                    }
                    Some(_) => {}
                },
                Opcode::CallHandler(sym) => {
                    if program.find_handler_by_symbol(sym).is_none() {
                        errors.push(LinkError::UnresolvedNative { name: format!("{sym:?}") });
                    }
                }
                _ => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
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

    fn compile(src: &str) -> Program {
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::with_prelude(map, id, echo_prelude()).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        Program::compile(Builder::new(unit).build().unwrap())
    }

    fn echo_symbol(program: &Program) -> SymbolId {
        program
            .handlers
            .iter()
            .flat_map(|h| &h.code)
            .find_map(|i| match i.op {
                CodeOp::Instr(Opcode::InvokeHandler(sym)) => Some(sym),
                _ => None,
            })
            .expect("program invokes echo")
    }

    #[test]
    fn missing_setup_is_reported() {
        let program = compile(r#"handler main { echo "hi"; };"#);
        let echo = echo_symbol(&program);
        let available = vec![NativeSignature { symbol: echo, name: "echo".into(), experimental: false }];
        let err = link(&program, &available, false).unwrap_err();
        assert!(err.contains(&LinkError::MissingSetup));
    }

    #[test]
    fn unresolved_native_is_reported() {
        let program = compile(r#"handler setup { }; handler main { echo "hi"; };"#);
        let err = link(&program, &[], false).unwrap_err();
        assert!(err.iter().any(|e| matches!(e, LinkError::UnresolvedNative { .. })));
    }

    #[test]
    fn experimental_without_opt_in_is_reported() {
        let program = compile(r#"handler setup { }; handler main { echo "hi"; };"#);
        let echo = echo_symbol(&program);
        let available = vec![NativeSignature { symbol: echo, name: "echo".into(), experimental: true }];
        let err = link(&program, &available, false).unwrap_err();
        assert!(err.iter().any(|e| matches!(e, LinkError::ExperimentalWithoutOptIn { .. })));
        assert!(link(&program, &available, true).is_ok());
    }
}
