//! Executes a [`crate::LinkedProgram`] (spec component H "Runtime
//! (Runner)"). One [`Runner`] is created per request and dropped when the
//! request's `Context` is dropped; its `globals` are shared with every
//! other `Runner` built from the same `LinkedProgram` (materialized once by
//! running `setup`).
//!
//! **Suspend/resume, re-expressed as `async`/`.await` (spec design note
//! "Coroutine-like handlers").** The spec's C++ original models suspension
//! as an explicit instruction-pointer + continuation-slot state machine so
//! that cancellation is trivial and destruction is deterministic, and
//! explicitly steers away from stackful coroutines. Rust's `async fn`
//! compiles to exactly that: an explicit state machine capturing the
//! resume point, with `Drop` on the half-finished future running
//! deterministically and cancelling it. So a native builtin "suspending" is
//! just `.await`ing its own I/O (an upstream HTTP call, a timer): the
//! `Runner`'s dispatch loop below is itself one `async fn`, and dropping a
//! `Runner` (or the future returned by `run_main`) cancels whatever native
//! call it was waiting on, for free. This is a restatement of the spec's
//! own architecture, not a deviation from it.
//!
//! Workers are single-threaded and cooperative (spec §5): each worker OS
//! thread runs its own `tokio::task::LocalSet`, so `Runner`'s registers
//! (`crate::Value`, built on `Rc`) never need to be `Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use flow_codegen::CodeOp;
use flow_ir::{ConstRef, Opcode, Relation};
use flow_syntax::symbol::SymbolId;
use flow_syntax::LiteralType;

use crate::error::RuntimeError;
use crate::linked::LinkedProgram;
use crate::params::Params;
use crate::registry::ReturnOutcome;
use crate::value::Value;

type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Per-request execution state over one [`LinkedProgram`] (spec §3 "Request
/// Context ... owns ... runner instance for this request").
pub struct Runner<'p, C> {
    linked: &'p LinkedProgram<C>,
    globals: Rc<RefCell<HashMap<SymbolId, Value>>>,
}

/// Spec §4.6 "State ∈ {Ready, Running, Suspended, Done}." Exposed for
/// introspection/tests; the dispatch loop below doesn't need to consult it
/// since `async`/`.await` already encodes suspension in the future's own
/// state (see module doc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Ready,
    Running,
    Suspended,
    Done,
}

impl<'p, C> Runner<'p, C> {
    pub fn new(linked: &'p LinkedProgram<C>) -> Self {
        Self { linked, globals: Rc::new(RefCell::new(HashMap::new())) }
    }

    /// Runs `setup` once at boot (spec §1 "a 'setup' handler runs once at
    /// boot to materialize server state"); global `var` initializers were
    /// lowered into its prologue by `flow_ir::Builder`, so this is also
    /// what populates `self.globals`.
    pub async fn run_setup(&self, ctx: &mut C) -> Result<bool, RuntimeError> {
        self.run_handler("setup", ctx).await
    }

    /// Runs `main` for one request.
    pub async fn run_main(&self, ctx: &mut C) -> Result<bool, RuntimeError> {
        self.run_handler("main", ctx).await
    }

    pub fn run_handler<'a>(&'a self, name: &'a str, ctx: &'a mut C) -> LocalFuture<'a, Result<bool, RuntimeError>> {
        Box::pin(async move {
            let idx = self
                .linked
                .find_handler_index(name)
                .unwrap_or_else(|| panic!("linked program has no '{name}' handler (link() should have rejected this)"));
            self.run_handler_idx(idx, ctx).await
        })
    }

    fn run_handler_idx<'a>(&'a self, idx: usize, ctx: &'a mut C) -> LocalFuture<'a, Result<bool, RuntimeError>> {
        Box::pin(async move {
            let compiled = &self.linked.program.handlers[idx];
            let register_count = self.linked.register_counts[idx] as usize;
            let mut registers: Vec<Option<Value>> = vec![None; register_count];
            let mut locals: HashMap<SymbolId, Value> = HashMap::new();
            let mut regex_groups: Vec<Option<String>> = Vec::new();
            let mut pc: usize = 0;

            loop {
                let instr = &compiled.code[pc];
                match instr.op {
                    CodeOp::Jump(target) => {
                        pc = target as usize;
                        continue;
                    }
                    CodeOp::JumpIfFalse(target) => {
                        let cond = reg(&registers, instr.operands[0]).as_bool();
                        pc = if cond { pc + 1 } else { target as usize };
                        continue;
                    }
                    CodeOp::Ret => {
                        let handled = reg(&registers, instr.operands[0]).as_bool();
                        return Ok(handled);
                    }
                    CodeOp::RetCall => {
                        let status = reg(&registers, instr.operands[0]).as_number();
                        let override_status = reg(&registers, instr.operands[1]).as_number();
                        match self.linked.return_builtin.finish(status, override_status, ctx).await? {
                            ReturnOutcome::Done => return Ok(true),
                            ReturnOutcome::InternalRedirect => {
                                let main_idx = self
                                    .linked
                                    .find_handler_index("main")
                                    .expect("link() guarantees a 'main' handler exists for an internal redirect to re-enter");
                                return self.run_handler_idx(main_idx, ctx).await;
                            }
                        }
                    }
                    CodeOp::Instr(opcode) => {
                        let value = self
                            .eval(opcode, &instr.operands, &registers, &mut locals, &mut regex_groups, ctx)
                            .await?;
                        if let Some(result) = instr.result {
                            set_reg(&mut registers, result, value);
                        }
                        pc += 1;
                    }
                }
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn eval(
        &self,
        opcode: Opcode,
        operands: &[flow_ir::ValueId],
        registers: &[Option<Value>],
        locals: &mut HashMap<SymbolId, Value>,
        regex_groups: &mut Vec<Option<String>>,
        ctx: &mut C,
    ) -> Result<Value, RuntimeError> {
        let op = |i: usize| reg(registers, operands[i]);

        Ok(match opcode {
            Opcode::LoadConst(cref) => self.load_const(cref),
            Opcode::LoadBool(b) => Value::Bool(b),
            Opcode::LoadHandlerRef(sym) => {
                let idx = self.linked.find_handler_index_by_symbol(sym).unwrap_or(0);
                Value::Handler(idx as u32)
            }
            Opcode::Load(slot) => match slot {
                flow_ir::VarSlot::Global(sym) => self.globals.borrow().get(&sym).cloned().unwrap_or(Value::Void),
                flow_ir::VarSlot::Local(sym) => locals.get(&sym).cloned().unwrap_or(Value::Void),
            },
            Opcode::Store(slot) => {
                let value = op(0).clone();
                match slot {
                    flow_ir::VarSlot::Global(sym) => {
                        self.globals.borrow_mut().insert(sym, value);
                    }
                    flow_ir::VarSlot::Local(sym) => {
                        locals.insert(sym, value);
                    }
                }
                Value::Void
            }

            Opcode::NAdd => Value::Number(op(0).as_number().saturating_add(op(1).as_number())),
            Opcode::NSub => Value::Number(op(0).as_number().saturating_sub(op(1).as_number())),
            Opcode::NMul => Value::Number(op(0).as_number().saturating_mul(op(1).as_number())),
            Opcode::NDiv => {
                let rhs = op(1).as_number();
                if rhs == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::Number(op(0).as_number().saturating_div(rhs))
            }
            Opcode::NRem => {
                let rhs = op(1).as_number();
                if rhs == 0 {
                    return Err(RuntimeError::DivisionByZero);
                }
                Value::Number(op(0).as_number().wrapping_rem(rhs))
            }
            Opcode::NPow => Value::Number(n_pow(op(0).as_number(), op(1).as_number())),
            Opcode::NShl => {
                let shift = (op(1).as_number() as u32) & 63;
                Value::Number(((op(0).as_number() as u64) << shift) as i64)
            }
            Opcode::NLShr => {
                let shift = (op(1).as_number() as u32) & 63;
                Value::Number(((op(0).as_number() as u64) >> shift) as i64)
            }
            Opcode::NNeg => Value::Number(op(0).as_number().checked_neg().unwrap_or(i64::MAX)),
            Opcode::NNot => Value::Number(!op(0).as_number()),
            Opcode::NCmpZero(rel) => Value::Bool(apply_relation(rel, op(0).as_number(), 0)),

            Opcode::BAnd => Value::Bool(op(0).as_bool() && op(1).as_bool()),
            Opcode::BOr => Value::Bool(op(0).as_bool() || op(1).as_bool()),
            Opcode::BXor => Value::Bool(op(0).as_bool() ^ op(1).as_bool()),
            Opcode::BNot => Value::Bool(!op(0).as_bool()),
            Opcode::BCmpEq => Value::Bool(op(0).as_bool() == op(1).as_bool()),
            Opcode::BCmpNe => Value::Bool(op(0).as_bool() != op(1).as_bool()),

            Opcode::SCat => {
                let mut s = String::with_capacity(op(0).as_str().len() + op(1).as_str().len());
                s.push_str(op(0).as_str());
                s.push_str(op(1).as_str());
                Value::String(Rc::from(s))
            }
            Opcode::SLen => Value::Number(op(0).as_str().len() as i64),
            Opcode::SIsEmpty => Value::Bool(op(0).as_str().is_empty()),
            Opcode::SCmp(rel) => {
                let lhs = op(0).as_str().to_ascii_lowercase();
                let rhs = op(1).as_str().to_ascii_lowercase();
                Value::Bool(apply_relation(rel, lhs.as_str(), rhs.as_str()))
            }
            Opcode::SHeadMatch => Value::Bool(op(0).as_str().starts_with(op(1).as_str())),
            Opcode::STailMatch => Value::Bool(op(0).as_str().ends_with(op(1).as_str())),
            Opcode::SRegexMatch => {
                let subject = op(0).as_str().to_string();
                let pattern = op(1).as_regex();
                let matched = match pattern.captures(&subject) {
                    Some(caps) => {
                        *regex_groups = (0..caps.len()).map(|i| caps.get(i).map(|m| m.as_str().to_string())).collect();
                        true
                    }
                    None => {
                        regex_groups.clear();
                        false
                    }
                };
                Value::Bool(matched)
            }
            Opcode::SContains => Value::Bool(op(0).as_str().contains(op(1).as_str())),

            Opcode::IpCmpEq => Value::Bool(op(0).as_ip() == op(1).as_ip()),
            Opcode::IpCmpNe => Value::Bool(op(0).as_ip() != op(1).as_ip()),
            Opcode::CidrCmpEq => Value::Bool(op(0).as_cidr() == op(1).as_cidr()),
            Opcode::CidrCmpNe => Value::Bool(op(0).as_cidr() != op(1).as_cidr()),
            Opcode::IpInCidr => Value::Bool(op(1).as_cidr().contains(op(0).as_ip())),

            Opcode::NumberArrayContains => Value::Bool(op(0).as_number_array().contains(&op(1).as_number())),
            Opcode::StringArrayContains => Value::Bool(op(0).as_string_array().iter().any(|s| s == op(1).as_str())),
            Opcode::IpArrayContains => Value::Bool(op(0).as_ip_array().contains(&op(1).as_ip())),
            Opcode::CidrArrayContains => Value::Bool(op(0).as_cidr_array().contains(&op(1).as_cidr())),

            Opcode::ArrayLen => Value::Number(array_len(op(0)) as i64),
            Opcode::ArrayConcat => array_concat(op(0), op(1)),

            Opcode::CastNumberToString => Value::String(Rc::from(op(0).as_number().to_string())),
            Opcode::CastStringToNumber => {
                let s = op(0).as_str();
                s.trim()
                    .parse::<i64>()
                    .map(Value::Number)
                    .map_err(|_| RuntimeError::InvalidCast { from: "string", to: "int", value: s.to_string() })?
            }
            Opcode::CastBoolToString => Value::String(Rc::from(if op(0).as_bool() { "true" } else { "false" })),
            Opcode::CastIpToString => Value::String(Rc::from(op(0).as_ip().to_string())),
            Opcode::CastCidrToString => Value::String(Rc::from(op(0).as_cidr().to_string())),
            Opcode::CastRegexToString => Value::String(Rc::from(op(0).as_regex().as_str())),

            Opcode::CallFunction(sym) => {
                let f = self.linked.functions.get(&sym).unwrap_or_else(|| panic!("unresolved native function at runtime (link() should have caught this)"));
                let values: Vec<Value> = operands.iter().map(|&v| reg(registers, v).clone()).collect();
                f.call(Params::new(&values, regex_groups), ctx).await?
            }
            Opcode::InvokeHandler(sym) => {
                let h = self.linked.handlers.get(&sym).unwrap_or_else(|| panic!("unresolved native handler at runtime (link() should have caught this)"));
                let values: Vec<Value> = operands.iter().map(|&v| reg(registers, v).clone()).collect();
                Value::Bool(h.call(Params::new(&values, regex_groups), ctx).await?)
            }
            Opcode::CallHandler(sym) => {
                let idx = self
                    .linked
                    .find_handler_index_by_symbol(sym)
                    .unwrap_or_else(|| panic!("unresolved user handler call at runtime (link() should have caught this)"));
                Value::Bool(self.run_handler_idx(idx, ctx).await?)
            }
        })
    }

    fn load_const(&self, cref: ConstRef) -> Value {
        let pool = &self.linked.program.constants;
        match cref {
            ConstRef::Number(idx) => Value::Number(pool.get_number(idx)),
            ConstRef::Str(idx) => Value::String(Rc::from(pool.get_string(idx))),
            ConstRef::Ip(idx) => Value::Ip(pool.get_ip(idx)),
            ConstRef::Cidr(idx) => Value::Cidr(pool.get_cidr(idx)),
            ConstRef::Regex(idx) => Value::Regex(self.linked.regexes[idx as usize].clone()),
            ConstRef::NumberArray(idx) => Value::NumberArray(Rc::from(pool.get_number_array(idx))),
            ConstRef::StringArray(idx) => Value::StringArray(Rc::from(pool.get_string_array(idx))),
            ConstRef::IpArray(idx) => Value::IpArray(Rc::from(pool.get_ip_array(idx))),
            ConstRef::CidrArray(idx) => Value::CidrArray(Rc::from(pool.get_cidr_array(idx))),
            ConstRef::EmptyArray(elem) => match elem {
                LiteralType::Number => Value::NumberArray(Rc::from(Vec::new())),
                LiteralType::String => Value::StringArray(Rc::from(Vec::new())),
                LiteralType::IpAddress => Value::IpArray(Rc::from(Vec::new())),
                LiteralType::Cidr => Value::CidrArray(Rc::from(Vec::new())),
                other => unreachable!("no array representation for element type {other}"),
            },
        }
    }
}

fn reg(registers: &[Option<Value>], id: flow_ir::ValueId) -> &Value {
    registers[id.0 as usize].as_ref().unwrap_or_else(|| panic!("register {} read before it was written", id.0))
}

fn set_reg(registers: &mut [Option<Value>], id: flow_ir::ValueId, value: Value) {
    registers[id.0 as usize] = Some(value);
}

fn apply_relation<T: PartialOrd + PartialEq>(rel: Relation, lhs: T, rhs: T) -> bool {
    match rel {
        Relation::Eq => lhs == rhs,
        Relation::Ne => lhs != rhs,
        Relation::Lt => lhs < rhs,
        Relation::Le => lhs <= rhs,
        Relation::Gt => lhs > rhs,
        Relation::Ge => lhs >= rhs,
    }
}

/// `base ** exp` over `i64` (spec §9 Open Question 1, resolved as v2/
/// FlowMachine register-machine semantics): `checked_pow`, falling back to
/// `i64::MAX`/`i64::MIN` by sign on overflow rather than wrapping or
/// panicking. A negative exponent has no integer result and no separate
/// real-number type to promote to, so it's defined as `0`.
fn n_pow(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return 0;
    }
    let exp = exp.min(u32::MAX as i64) as u32;
    match base.checked_pow(exp) {
        Some(v) => v,
        None if base < 0 && exp % 2 == 1 => i64::MIN,
        None => i64::MAX,
    }
}

fn array_len(value: &Value) -> usize {
    match value {
        Value::NumberArray(a) => a.len(),
        Value::StringArray(a) => a.len(),
        Value::IpArray(a) => a.len(),
        Value::CidrArray(a) => a.len(),
        other => unreachable!("ArrayLen over non-array register {:?}", other.kind()),
    }
}

fn array_concat(lhs: &Value, rhs: &Value) -> Value {
    match (lhs, rhs) {
        (Value::NumberArray(a), Value::NumberArray(b)) => Value::NumberArray(Rc::from([a.as_ref(), b.as_ref()].concat())),
        (Value::StringArray(a), Value::StringArray(b)) => Value::StringArray(Rc::from([a.as_ref(), b.as_ref()].concat())),
        (Value::IpArray(a), Value::IpArray(b)) => Value::IpArray(Rc::from([a.as_ref(), b.as_ref()].concat())),
        (Value::CidrArray(a), Value::CidrArray(b)) => Value::CidrArray(Rc::from([a.as_ref(), b.as_ref()].concat())),
        (a, b) => unreachable!("ArrayConcat over mismatched array kinds {:?}/{:?}", a.kind(), b.kind()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use flow_diagnostics::SourceMap;
    use flow_ir::Builder;
    use flow_parser::{Parser, Prelude};
    use flow_syntax::ast::Unit;
    use flow_syntax::symbol::{BuiltinSignature, Param};
    use flow_syntax::LiteralType;

    use super::*;
    use crate::registry::HostRegistry;
    use crate::{LinkedProgram, NativeFunction, NativeHandler, Params, ReturnBuiltin, ReturnOutcome, RuntimeError};

    #[derive(Default)]
    struct TestCtx {
        echoed: Vec<String>,
        finished: Option<(i64, i64)>,
        redirected_once: bool,
    }

    struct Echo;
    #[async_trait(?Send)]
    impl NativeHandler<TestCtx> for Echo {
        async fn call(&self, params: Params<'_>, ctx: &mut TestCtx) -> Result<bool, RuntimeError> {
            ctx.echoed.push(params.get_string(0).to_string());
            Ok(true)
        }
    }

    struct Upper;
    #[async_trait(?Send)]
    impl NativeFunction<TestCtx> for Upper {
        async fn call(&self, params: Params<'_>, _ctx: &mut TestCtx) -> Result<Value, RuntimeError> {
            Ok(Value::String(Rc::from(params.get_string(0).to_ascii_uppercase())))
        }
    }

    /// Finishes the request on the first `return()`, but asks for exactly
    /// one internal redirect back into `main` if it hasn't redirected yet —
    /// exercises `Runner`'s `ReturnOutcome::InternalRedirect` re-entry path.
    struct RedirectOnce;
    #[async_trait(?Send)]
    impl ReturnBuiltin<TestCtx> for RedirectOnce {
        async fn finish(&self, status: i64, override_status: i64, ctx: &mut TestCtx) -> Result<ReturnOutcome, RuntimeError> {
            if ctx.redirected_once {
                ctx.finished = Some((status, override_status));
                Ok(ReturnOutcome::Done)
            } else {
                ctx.redirected_once = true;
                Ok(ReturnOutcome::InternalRedirect)
            }
        }
    }

    fn registry() -> HostRegistry<TestCtx> {
        let mut r = HostRegistry::new();
        r.handler("echo", vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::Void }], Echo);
        r.function("upper", vec![BuiltinSignature { params: vec![Param::required(LiteralType::String)], return_type: LiteralType::String }], Upper);
        r.declare_return_builtin();
        r
    }

    fn link(src: &str) -> LinkedProgram<TestCtx> {
        let registry = registry();
        let mut map = SourceMap::new();
        let id = map.add_inline("<test>", src.to_string());
        let map: &'static SourceMap = Box::leak(Box::new(map));
        let (unit, _) = Parser::with_prelude(map, id, registry.prelude()).unwrap().parse().unwrap();
        let unit: &'static Unit = Box::leak(Box::new(unit));
        let ir = Builder::new(unit).build().unwrap();
        let program = flow_codegen::Program::compile(ir);
        let resolved = registry.resolve(unit);
        LinkedProgram::link(program, &resolved, Arc::new(RedirectOnce), false).unwrap()
    }

    fn prelude_sanity_check() -> Prelude {
        registry().prelude()
    }

    #[test]
    fn return_is_reserved_as_a_two_arg_builtin_handler() {
        assert!(prelude_sanity_check().iter().any(|(name, _)| name == "return"));
    }

    #[tokio::test]
    async fn runs_setup_then_main_and_dispatches_native_calls() {
        let linked = link(r#"handler setup { }; handler main { echo upper("hi"); return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        let handled = runner.run_main(&mut ctx).await.unwrap();
        assert!(handled);
        assert_eq!(ctx.echoed, vec!["HI".to_string()]);
        assert_eq!(ctx.finished, Some((200, 0)));
    }

    #[tokio::test]
    async fn internal_redirect_re_enters_main_from_its_entry_block() {
        let linked = link(r#"handler setup { }; handler main { echo "once"; return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        let handled = runner.run_main(&mut ctx).await.unwrap();
        assert!(handled);
        // main ran twice: once before the redirect, once after.
        assert_eq!(ctx.echoed, vec!["once".to_string(), "once".to_string()]);
        assert_eq!(ctx.finished, Some((200, 0)));
    }

    #[tokio::test]
    async fn globals_from_setup_are_visible_in_main() {
        let linked = link(r#"var greeting = "hi there"; handler setup { }; handler main { echo greeting; return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        runner.run_main(&mut ctx).await.unwrap();
        assert_eq!(ctx.echoed, vec!["hi there".to_string()]);
    }

    #[tokio::test]
    async fn arithmetic_and_comparison_opcodes_evaluate() {
        let linked = link(r#"handler setup { }; handler main { if (1 + 2 * 3 == 7) { echo "math-ok"; } return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        runner.run_main(&mut ctx).await.unwrap();
        assert_eq!(ctx.echoed, vec!["math-ok".to_string()]);
    }

    #[tokio::test]
    async fn string_head_match_and_concatenation_evaluate() {
        let linked = link(r#"handler setup { }; handler main { if ("/static/app.js" =^ "/static/") { echo "static" + " hit"; } return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        runner.run_main(&mut ctx).await.unwrap();
        assert_eq!(ctx.echoed, vec!["static hit".to_string()]);
    }

    #[tokio::test]
    async fn division_by_zero_is_a_runtime_error() {
        let linked = link(r#"handler setup { }; handler main { x = 1 / 0; echo "unreachable"; return(200, 0); };"#);
        let runner = Runner::new(&linked);
        let mut ctx = TestCtx::default();
        runner.run_setup(&mut ctx).await.unwrap();
        let err = runner.run_main(&mut ctx).await.unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero);
    }
}
