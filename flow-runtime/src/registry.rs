use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use flow_syntax::ast::Unit;
use flow_syntax::symbol::{BuiltinSignature, LookupMode, Param, SymbolId, SymbolKind};
use flow_syntax::{LiteralType, LiteralValue};

use crate::error::RuntimeError;
use crate::params::Params;
use crate::value::Value;

/// A native function builtin: callable from an expression position, always
/// produces a [`Value`] (spec §4.6 "Host-registered builtin surface").
/// `?Send` because a `Runner` lives entirely on one worker's `LocalSet`
/// (spec §5) — its continuations never need to move across threads.
#[async_trait(?Send)]
pub trait NativeFunction<C>: Send + Sync {
    async fn call(&self, params: Params<'_>, ctx: &mut C) -> Result<Value, RuntimeError>;
}

/// A native handler builtin: a statement whose "return value" is the
/// handled/unhandled boolean (spec §3 "BuiltinHandler").
#[async_trait(?Send)]
pub trait NativeHandler<C>: Send + Sync {
    async fn call(&self, params: Params<'_>, ctx: &mut C) -> Result<bool, RuntimeError>;
}

/// The dedicated no-return `return(status, override)` builtin (spec §4.6
/// "Internal redirects"). Kept as its own trait rather than a
/// [`NativeHandler`] entry: its result isn't a handled boolean, it's a
/// decision about whether the `Runner` should re-enter `main` (see
/// `crate::runner::Runner`), which only the host (`x0-context`) can make
/// since only it owns the error-page map and redirect counter.
#[async_trait(?Send)]
pub trait ReturnBuiltin<C>: Send + Sync {
    async fn finish(&self, status: i64, override_status: i64, ctx: &mut C) -> Result<ReturnOutcome, RuntimeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnOutcome {
    /// The response is finalized (or a redirect-limit body was synthesized);
    /// the calling handler invocation returns `true`.
    Done,
    /// The host rewrote the request path and wants `main` re-run from its
    /// entry block (spec §4.6: "re-enters `main` from its entry block").
    InternalRedirect,
}

/// One constant-argument slot as seen by an IR-time [`Verifier`]: `Some`
/// when the call-site argument was itself a constant-pool load, `None`
/// otherwise (spec §4.6: "inspects constant operands").
pub type VerifierArgs<'a> = &'a [Option<LiteralValue>];

/// An IR-time verifier (spec §4.6): may replace a call whose arguments are
/// all/partially constant with a literal result — e.g. resolving
/// `sys.env("X")` to a constant string at link time when `"X"` is a literal.
pub type Verifier = Arc<dyn Fn(VerifierArgs<'_>) -> Option<LiteralValue> + Send + Sync>;

/// Never actually dispatched — see [`HostRegistry::declare_return_builtin`].
struct ReturnPlaceholder;

#[async_trait(?Send)]
impl<C> NativeHandler<C> for ReturnPlaceholder {
    async fn call(&self, _params: Params<'_>, _ctx: &mut C) -> Result<bool, RuntimeError> {
        unreachable!("'return' calls are lowered to Terminator::ReturnCall at IR-build time and never reach native-handler dispatch")
    }
}

enum NativeKind<C> {
    Function(Arc<dyn NativeFunction<C>>),
    Handler(Arc<dyn NativeHandler<C>>),
}

struct Entry<C> {
    name: String,
    candidates: Vec<BuiltinSignature>,
    experimental: bool,
    kind: NativeKind<C>,
    verifier: Option<Verifier>,
}

/// Host-side builtin registry (spec component I "Native Builtin Registry").
/// A module registers its builtins by name before the Flow source is
/// parsed (`prelude()` feeds `flow_parser::Parser`); after parsing,
/// `resolve()` binds each registered name to the `SymbolId` the parser
/// assigned it, ready for `flow_codegen::link` and `crate::Runner`.
pub struct HostRegistry<C> {
    entries: Vec<Entry<C>>,
}

impl<C> Default for HostRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> HostRegistry<C> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn function(&mut self, name: impl Into<String>, candidates: Vec<BuiltinSignature>, f: impl NativeFunction<C> + 'static) -> &mut Self {
        self.entries.push(Entry { name: name.into(), candidates, experimental: false, kind: NativeKind::Function(Arc::new(f)), verifier: None });
        self
    }

    pub fn handler(&mut self, name: impl Into<String>, candidates: Vec<BuiltinSignature>, h: impl NativeHandler<C> + 'static) -> &mut Self {
        self.entries.push(Entry { name: name.into(), candidates, experimental: false, kind: NativeKind::Handler(Arc::new(h)), verifier: None });
        self
    }

    /// Declares the `return(status, override)` symbol (spec §4.6) so
    /// `flow_parser::Parser` resolves it, without giving it a callable
    /// native-handler body: `flow_ir::Builder` special-cases any 2-argument
    /// call to a symbol named `return` into `Terminator::ReturnCall` before
    /// codegen ever sees it, so the real behavior is whatever
    /// `ReturnBuiltin` impl is passed to `LinkedProgram::link` — this just
    /// reserves the name and its arity for the type checker.
    pub fn declare_return_builtin(&mut self) -> &mut Self
    where
        C: 'static,
    {
        self.handler(
            "return",
            vec![BuiltinSignature {
                params: vec![Param::required(LiteralType::Number), Param::required(LiteralType::Number)],
                return_type: LiteralType::Void,
            }],
            ReturnPlaceholder,
        )
    }

    /// Marks the most recently registered builtin experimental (spec §4.5
    /// "unresolved or experimental-without-opt-in calls are reported").
    pub fn experimental(&mut self) -> &mut Self {
        self.entries.last_mut().expect("experimental() called before any registration").experimental = true;
        self
    }

    /// Attaches an IR-time verifier to the most recently registered builtin.
    pub fn with_verifier(&mut self, verifier: Verifier) -> &mut Self {
        self.entries.last_mut().expect("with_verifier() called before any registration").verifier = Some(verifier);
        self
    }

    /// The `(name, SymbolKind)` list `flow_parser::Parser::with_prelude`
    /// needs to seed the global scope before parsing a Flow source.
    pub fn prelude(&self) -> flow_parser::Prelude {
        self.entries
            .iter()
            .map(|e| {
                let kind = match &e.kind {
                    NativeKind::Function(_) => SymbolKind::BuiltinFunction { candidates: e.candidates.clone() },
                    NativeKind::Handler(_) => SymbolKind::BuiltinHandler { candidates: e.candidates.clone() },
                };
                (e.name.clone(), kind)
            })
            .collect()
    }

    /// Binds every registered name to the `SymbolId` the parser assigned it
    /// in `unit`'s global scope. A registered name the unit never imported
    /// (so it was never declared in scope) is silently dropped — only
    /// names the program actually references need a resolved entry.
    pub fn resolve(&self, unit: &Unit) -> ResolvedRegistry<C> {
        let scope = unit.global_scope();
        let mut signatures = Vec::new();
        let mut functions = HashMap::new();
        let mut handlers = HashMap::new();
        let mut verifiers = HashMap::new();
        for entry in &self.entries {
            let Some(sym) = unit.symbols.lookup(scope, &entry.name, LookupMode::SelfOnly) else { continue };
            signatures.push(flow_codegen::NativeSignature { symbol: sym, name: entry.name.clone(), experimental: entry.experimental });
            match &entry.kind {
                NativeKind::Function(f) => {
                    functions.insert(sym, f.clone());
                }
                NativeKind::Handler(h) => {
                    handlers.insert(sym, h.clone());
                }
            }
            if let Some(v) = &entry.verifier {
                verifiers.insert(sym, v.clone());
            }
        }
        ResolvedRegistry { signatures, functions, handlers, verifiers }
    }
}

/// The registry resolved against one parsed `Unit`, ready for
/// `flow_codegen::link` and `crate::LinkedProgram::link`.
pub struct ResolvedRegistry<C> {
    pub signatures: Vec<flow_codegen::NativeSignature>,
    pub functions: HashMap<SymbolId, Arc<dyn NativeFunction<C>>>,
    pub handlers: HashMap<SymbolId, Arc<dyn NativeHandler<C>>>,
    pub verifiers: HashMap<SymbolId, Verifier>,
}
