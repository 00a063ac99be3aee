//! Facade tying the whole Flow pipeline together (spec §4: lexer -> parser
//! -> IR builder -> pass manager -> codegen -> link) so a host only has to
//! depend on this crate, not every pipeline stage individually.
//!
//! A host builds a [`flow_runtime::HostRegistry`], registers its native
//! builtins (including `declare_return_builtin`), and calls [`compile`]
//! once per Flow source (spec §6: "compiled once at startup, re-run on
//! SIGHUP/reload"). The result is a [`flow_runtime::LinkedProgram`] ready
//! for one [`flow_runtime::Runner`] per request.

use std::sync::Arc;

use flow_diagnostics::{DiagnosticsReport, SourceId, SourceMap};
use flow_ir::Builder;
use flow_passes::PassManager;
use flow_runtime::{HostRegistry, LinkedProgram, ReturnBuiltin};

pub use flow_codegen::Program as CompiledProgram;
pub use flow_diagnostics;
pub use flow_ir::{BuildError, Program as IrProgram};
pub use flow_parser::{Error as ParseError, Parser, Prelude};
pub use flow_runtime::{self, LinkError, NativeFunction, NativeHandler, Params, ResolvedRegistry, ReturnOutcome, RuntimeError, Runner, RunnerState, Value, Verifier, VerifierArgs};
pub use flow_syntax::ast::Unit;

/// Knobs for one [`compile`] call (spec §6 CLI: `-O0`..`-O3`,
/// `--allow-experimental`-style opt-in for builtins marked
/// [`HostRegistry::experimental`]).
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub optimization_level: u8,
    pub allow_experimental: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { optimization_level: 1, allow_experimental: false }
    }
}

/// Anything that can stop [`compile`] before it produces a
/// [`LinkedProgram`]. Each stage's own error type is carried verbatim so a
/// host can still render stage-specific detail (spans, symbol names).
#[derive(Debug)]
pub enum CompileError {
    Parse(ParseError),
    /// The parser's own diagnostics report carried at least one
    /// `Severity::Error` entry, even though parsing itself didn't hard-fail
    /// (spec §7: "any error aborts startup").
    Diagnostics(DiagnosticsReport),
    Build(BuildError),
    Link(Vec<LinkError>),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Parse(e) => write!(f, "{e}"),
            CompileError::Diagnostics(report) => {
                write!(f, "{} diagnostic error(s)", report.iter().filter(|d| d.severity == flow_diagnostics::Severity::Error).count())
            }
            CompileError::Build(e) => write!(f, "{e}"),
            CompileError::Link(errs) => {
                let joined = errs.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
                write!(f, "{joined}")
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<BuildError> for CompileError {
    fn from(e: BuildError) -> Self {
        CompileError::Build(e)
    }
}

/// A successfully compiled and linked program, plus any non-fatal
/// diagnostics (warnings/notes) collected along the way — a host typically
/// logs these rather than discarding them.
pub struct Compiled<C> {
    pub linked: LinkedProgram<C>,
    pub unit: Unit,
    pub diagnostics: DiagnosticsReport,
}

/// Runs `root` (and its transitive `import`s, resolved through `sources`)
/// through the full pipeline: parse + type-check, build IR, run the
/// optimization passes, flatten to bytecode, then link against `registry`
/// and `return_builtin`.
///
/// `registry` must already have every native builtin the source can call
/// registered (spec component I) — `compile` reads `registry.prelude()`
/// before parsing and `registry.resolve(&unit)` after.
pub fn compile<C: 'static>(
    sources: &SourceMap,
    root: SourceId,
    registry: &HostRegistry<C>,
    return_builtin: Arc<dyn ReturnBuiltin<C>>,
    options: CompileOptions,
) -> Result<Compiled<C>, CompileError> {
    let (unit, diagnostics) = Parser::with_prelude(sources, root, registry.prelude())?.parse()?;
    if diagnostics.has_errors() {
        return Err(CompileError::Diagnostics(diagnostics));
    }

    let mut ir = Builder::new(&unit).build()?;
    PassManager::new(options.optimization_level).run(&mut ir);
    let program = CompiledProgram::compile(ir);

    let resolved = registry.resolve(&unit);
    let linked = LinkedProgram::link(program, &resolved, return_builtin, options.allow_experimental).map_err(CompileError::Link)?;

    Ok(Compiled { linked, unit, diagnostics })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use flow_syntax::symbol::{BuiltinSignature, Param};
    use flow_syntax::LiteralType;

    use super::*;

    struct Ctx {
        echoed: Vec<String>,
    }

    struct Echo;

    #[async_trait(?Send)]
    impl NativeHandler<Ctx> for Echo {
        async fn call(&self, params: Params<'_>, ctx: &mut Ctx) -> Result<bool, RuntimeError> {
            ctx.echoed.push(params.get_string(0).to_string());
            Ok(true)
        }
    }

    struct Finish;

    #[async_trait(?Send)]
    impl ReturnBuiltin<Ctx> for Finish {
        async fn finish(&self, _status: i64, _override_status: i64, _ctx: &mut Ctx) -> Result<ReturnOutcome, RuntimeError> {
            Ok(ReturnOutcome::Done)
        }
    }

    fn registry() -> HostRegistry<Ctx> {
        let mut registry = HostRegistry::new();
        registry.handler("echo", vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }], Echo);
        registry.declare_return_builtin();
        registry
    }

    #[tokio::test]
    async fn compiles_links_and_runs_a_minimal_program() {
        let mut sources = SourceMap::new();
        let root = sources.add_inline("<test>", r#"handler setup { }; handler main { echo "hi"; return(200, 0); };"#.to_string());

        let registry = registry();
        let compiled = compile(&sources, root, &registry, Arc::new(Finish), CompileOptions::default()).expect("compiles");
        assert!(!compiled.diagnostics.has_errors());

        let mut ctx = Ctx { echoed: Vec::new() };
        let runner = Runner::new(&compiled.linked);
        runner.run_setup(&mut ctx).await.expect("setup runs");
        runner.run_main(&mut ctx).await.expect("main runs");

        assert_eq!(ctx.echoed, vec!["hi".to_string()]);
    }

    #[test]
    fn a_type_error_is_reported_without_reaching_link() {
        let mut sources = SourceMap::new();
        let root = sources.add_inline("<test>", r#"handler setup { }; handler main { echo 1; };"#.to_string());

        let registry = registry();
        let err = compile(&sources, root, &registry, Arc::new(Finish), CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn a_call_to_an_unregistered_builtin_fails_to_parse() {
        let mut sources = SourceMap::new();
        let root = sources.add_inline("<test>", r#"handler setup { }; handler main { echo "hi"; };"#.to_string());

        // An empty registry never declares `echo`/`return` in the prelude,
        // so the parser's own symbol resolution rejects the call before
        // `compile` ever reaches the link stage.
        let empty = HostRegistry::<Ctx>::new();
        let err = compile(&sources, root, &empty, Arc::new(Finish), CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
